//! ragctl - Inspect reply extraction and thread trees from the command line

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use mailrag::{
    ExtractionStrategy, FetchedMessage, InMemoryDocumentSink, InMemoryThreadStore, MessageId,
    MimeMessageId, RagConfig, ReplyIndexHandler, SqliteThreadStore, ThreadId, ThreadStore,
    date_header, normalize_message,
};

#[derive(Parser, Debug)]
#[command(
    name = "ragctl",
    about = "Reply extraction and thread tree tooling for mail indexes"
)]
struct Args {
    /// Extraction strategy (`fragments` or `line-pattern`); overrides config.
    #[arg(long, global = true)]
    strategy: Option<ExtractionStrategy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the reply extracted from an .eml file, a plain body, or stdin (`-`).
    Extract {
        input: String,
    },
    /// Build the thread tree of every .eml file in a directory.
    Thread {
        dir: PathBuf,

        /// SQLite database to save the tree and mappings into.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Thread ID to use (defaults to the directory name).
        #[arg(long)]
        thread: Option<String>,
    },
    /// Print a stored branch and whether it is fully deleted.
    Branch {
        /// SQLite database (defaults to the configured database).
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        thread: String,

        /// Message-ID of any message on the branch.
        #[arg(long)]
        message: String,
    },
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        warn!("Failed to initialize config directory: {}", e);
    }

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut settings = match RagConfig::load() {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Failed to load config, using defaults: {:#}", e);
            RagConfig::default()
        }
    };
    if let Some(strategy) = args.strategy {
        settings.strategy = strategy;
    }

    match args.command {
        Command::Extract { input } => extract(&settings, &input),
        Command::Thread { dir, db, thread } => build_thread(&settings, &dir, db, thread),
        Command::Branch { db, thread, message } => show_branch(&settings, db, &thread, &message),
    }
}

fn extract(settings: &RagConfig, input: &str) -> Result<()> {
    let raw = if input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read(input).with_context(|| format!("Failed to read {}", input))?
    };

    let body = if looks_like_message(&raw) {
        let message = normalize_message(
            &raw,
            MessageId::new(input),
            ThreadId::new(input),
            Utc::now(),
        )?;
        message.body_text.unwrap_or_default()
    } else {
        String::from_utf8_lossy(&raw).into_owned()
    };

    println!("{}", settings.strategy.extractor().extract_reply(&body));
    Ok(())
}

fn build_thread(
    settings: &RagConfig,
    dir: &Path,
    db: Option<PathBuf>,
    thread: Option<String>,
) -> Result<()> {
    let thread_id = ThreadId::new(thread.unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "thread".to_string())
    }));

    let messages = load_messages(dir, &thread_id)?;
    info!(
        "Loaded {} messages from {} into thread {}",
        messages.len(),
        dir.display(),
        thread_id
    );

    let store: Arc<dyn ThreadStore> = match db {
        Some(path) => Arc::new(SqliteThreadStore::new(&path)?),
        None => Arc::new(InMemoryThreadStore::new()),
    };
    let sink = Arc::new(InMemoryDocumentSink::new());
    let handler = ReplyIndexHandler::new(store, settings.strategy.extractor(), sink.clone());

    let tree = handler.rebuild_thread(&thread_id, &messages)?;

    println!("thread {} ({} messages)", thread_id, tree.len());
    for (i, branch) in tree.branches().iter().enumerate() {
        let deleted = branch
            .first()
            .is_some_and(|start| tree.is_branch_deleted(start));
        println!(
            "branch {}{}:",
            i + 1,
            if deleted { " [deleted]" } else { "" }
        );
        for id in branch {
            let content = sink
                .get(&thread_id, id.as_str())
                .map(|d| d.content)
                .unwrap_or_default();
            println!("  <{}> {}", id, first_line(&content));
        }
    }

    Ok(())
}

fn show_branch(
    settings: &RagConfig,
    db: Option<PathBuf>,
    thread: &str,
    message: &str,
) -> Result<()> {
    let Some(path) = db.or_else(|| settings.database_path.clone()) else {
        bail!("No database given and no default database path available");
    };
    let store = SqliteThreadStore::new(&path)?;

    let thread_id = ThreadId::new(thread);
    let Some(tree) = store.load_tree(&thread_id)? else {
        bail!("No tree stored for thread {}", thread_id);
    };

    let id = MimeMessageId::parse(message)
        .with_context(|| format!("Invalid Message-ID: {}", message))?;
    let branch = tree.branch_of(&id);
    if branch.is_empty() {
        bail!("Message <{}> is not part of thread {}", id, thread_id);
    }

    println!(
        "branch of <{}> in thread {}{}:",
        id,
        thread_id,
        if tree.is_branch_deleted(&id) {
            " [deleted]"
        } else {
            ""
        }
    );
    for node in &branch {
        let marker = if tree.is_marked_deleted(node) { "x" } else { " " };
        println!("  [{}] <{}>", marker, node);
    }

    Ok(())
}

/// Normalize every .eml file in `dir`, sorted by file name
fn load_messages(dir: &Path, thread_id: &ThreadId) -> Result<Vec<FetchedMessage>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("eml")))
        .collect();
    paths.sort();

    let mut messages = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let message_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let internal_date = match date_header(&raw) {
            Some(date) => date,
            None => modified_time(&path)?,
        };

        let message_id = MessageId::new(message_id);
        match normalize_message(&raw, message_id, thread_id.clone(), internal_date) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }

    Ok(messages)
}

fn modified_time(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Whether the input starts with a header block rather than body text
fn looks_like_message(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(first) = text.lines().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    match first.split_once(':') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
