//! Raw RFC 5322 message normalization
//!
//! Turns raw message bytes into a [`FetchedMessage`]: headers are kept in
//! order and the body is reduced to plain text.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{ParsedMail, parse_mail};
use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::{FetchedMessage, Header, MessageId, ThreadId};

static SCRIPT_STYLE_REGEX: OnceLock<Regex> = OnceLock::new();
static BLOCKQUOTE_REGEX: OnceLock<Regex> = OnceLock::new();
static BLOCK_BREAK_REGEX: OnceLock<Regex> = OnceLock::new();
static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN_REGEX: OnceLock<Regex> = OnceLock::new();

/// Private-use markers standing in for `<blockquote>` boundaries until the
/// tags are stripped
const QUOTE_OPEN: &str = "\u{E000}";
const QUOTE_CLOSE: &str = "\u{E001}";

/// Normalize a raw message into a [`FetchedMessage`]
///
/// Fails only when the MIME structure cannot be parsed. A message without a
/// usable text part gets `body_text: None`.
pub fn normalize_message(
    raw: &[u8],
    message_id: MessageId,
    thread_id: ThreadId,
    internal_date: DateTime<Utc>,
) -> Result<FetchedMessage> {
    let parsed = parse_mail(raw)
        .with_context(|| format!("Failed to parse MIME message {}", message_id))?;

    let headers: Vec<Header> = parsed
        .headers
        .iter()
        .map(|h| Header::new(h.get_key(), h.get_value()))
        .collect();

    let body_text = extract_text_body(&parsed)
        .or_else(|| extract_html_body(&parsed).map(|html| html_to_text(&html)));

    Ok(FetchedMessage::builder(message_id, thread_id)
        .headers(headers)
        .internal_date(internal_date)
        .body_text(body_text)
        .build())
}

/// Date from the `Date` header of a raw message, if present and valid
pub fn date_header(raw: &[u8]) -> Option<DateTime<Utc>> {
    let parsed = parse_mail(raw).ok()?;
    let value = parsed
        .headers
        .iter()
        .find(|h| h.get_key_ref().eq_ignore_ascii_case("Date"))?
        .get_value();
    let timestamp = mailparse::dateparse(&value).ok()?;
    Utc.timestamp_opt(timestamp, 0).single()
}

/// True when the part is explicitly an attachment
fn is_attachment(mail: &ParsedMail<'_>) -> bool {
    mail.headers.iter().any(|h| {
        h.get_key_ref().eq_ignore_ascii_case("Content-Disposition")
            && h.get_value().to_ascii_lowercase().starts_with("attachment")
    })
}

/// First text/plain leaf, depth first
fn extract_text_body(mail: &ParsedMail<'_>) -> Option<String> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") && !is_attachment(mail) {
            return mail.get_body().ok();
        }
        return None;
    }

    mail.subparts.iter().find_map(extract_text_body)
}

/// First text/html leaf, depth first
fn extract_html_body(mail: &ParsedMail<'_>) -> Option<String> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") && !is_attachment(mail) {
            return mail.get_body().ok();
        }
        return None;
    }

    mail.subparts.iter().find_map(extract_html_body)
}

/// Reduce HTML to readable text
///
/// Scripts and styles are dropped, block-level boundaries become newlines,
/// remaining tags are removed and common entities decoded. Lines inside a
/// `<blockquote>` get one `> ` per nesting level.
pub fn html_to_text(html: &str) -> String {
    let script_style = SCRIPT_STYLE_REGEX.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(?:script|style|head)\s*>")
            .expect("Invalid script/style regex")
    });
    let blockquote = BLOCKQUOTE_REGEX.get_or_init(|| {
        Regex::new(r"(?i)<(/?)blockquote\b[^>]*>").expect("Invalid blockquote regex")
    });
    let block_break = BLOCK_BREAK_REGEX.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|pre|table)\s*>")
            .expect("Invalid block break regex")
    });
    let tag = TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));
    let blank_run = BLANK_RUN_REGEX.get_or_init(|| {
        Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("Invalid blank run regex")
    });

    let text = html.replace("\r\n", "\n");
    let text = script_style.replace_all(&text, "");
    let text = blockquote.replace_all(&text, |caps: &Captures| {
        let marker = if caps[1].is_empty() {
            QUOTE_OPEN
        } else {
            QUOTE_CLOSE
        };
        format!("\n{}\n", marker)
    });
    let text = block_break.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");
    let text = decode_html_entities(&text);

    let text = quote_lines(&text).join("\n");
    blank_run.replace_all(&text, "\n\n").trim().to_string()
}

/// Drop the blockquote markers and prefix the lines between them with `> `
fn quote_lines(text: &str) -> Vec<String> {
    let mut depth = 0usize;
    let mut lines = Vec::new();

    for line in text.lines() {
        match line.trim() {
            QUOTE_OPEN => depth += 1,
            QUOTE_CLOSE => depth = depth.saturating_sub(1),
            "" => lines.push(String::new()),
            _ if depth == 0 => lines.push(line.trim_end().to_string()),
            content => lines.push(format!("{}{}", "> ".repeat(depth), content)),
        }
    }

    lines
}

/// Decode the HTML entities common in mail bodies
///
/// `&amp;` goes last so that `&amp;lt;` decodes to `&lt;` rather than `<`.
fn decode_html_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
