//! Fragment-based reply extraction
//!
//! The body is scanned from the last line to the first. New content sits at
//! the top and quotes and signatures pile up at the bottom, so walking
//! backwards lets a single pass group contiguous runs of the same kind of
//! line into fragments. Everything found before the first real piece of text
//! (that is, below it in the message) is hidden.
//!
//! The first reply header ("On ... wrote:", "From:", "De :", ...) opens the
//! quoted history even when the client did not `>`-prefix it, so it and every
//! line below it count as quoted.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::line_pattern::is_history_header;
use super::{ReplyExtractor, normalize_line_endings};

static SIGNATURE_REGEX: OnceLock<Regex> = OnceLock::new();
static DELIMITER_REGEX: OnceLock<Regex> = OnceLock::new();
static QUOTE_HEADER_REGEX: OnceLock<Regex> = OnceLock::new();
static MULTI_LINE_HEADER_REGEX: OnceLock<Regex> = OnceLock::new();
static UNDERSCORE_RULE_REGEX: OnceLock<Regex> = OnceLock::new();

/// RFC 3676 signature separator
const SIGNATURE_SEPARATOR: &str = "-- ";

/// Lines that open a signature block
///
/// - `--`, `__`, em/en dash lead-ins and `-Name` sign-offs
/// - mobile client footers ("Sent from my iPhone", "Envoyé de mon iPad")
fn signature_regex() -> &'static Regex {
    SIGNATURE_REGEX.get_or_init(|| {
        Regex::new(
            r"^\s*(?:--|__|\x{2014}|\x{2013}|-\w)|^(?:Sent from my|Envoyé de mon|Envoyé depuis mon)\s+\S.{0,40}$",
        )
        .expect("Invalid signature regex")
    })
}

/// A bare signature delimiter line ("-- ", "__", a run of dashes)
fn delimiter_regex() -> &'static Regex {
    DELIMITER_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:-{2,}|_{2,}|[\x{2014}\x{2013}]+)\s*$")
            .expect("Invalid delimiter regex")
    })
}

/// "On <date>, <name> wrote:" and "Le <date>, <name> a écrit :"
fn quote_header_regex() -> &'static Regex {
    QUOTE_HEADER_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:On\s.+wrote:|Le\s.+a\s+écrit\s*:)\s*$")
            .expect("Invalid quote header regex")
    })
}

/// A reply header that a client wrapped over up to four lines
fn multi_line_header_regex() -> &'static Regex {
    MULTI_LINE_HEADER_REGEX.get_or_init(|| {
        Regex::new(r"(?m)^(?:On|Le)\s[^\n]*(?:\n[^\n]*){0,3}?(?:wrote:|a\s+écrit\s*:)[ \t]*$")
            .expect("Invalid multi-line header regex")
    })
}

/// A line of underscores directly below a line of text
fn underscore_rule_regex() -> &'static Regex {
    UNDERSCORE_RULE_REGEX.get_or_init(|| {
        Regex::new(r"(?m)([^\n])\n(_{8,}[ \t]*)$").expect("Invalid underscore rule regex")
    })
}

/// A contiguous run of lines sharing the same classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    content: String,
    quoted: bool,
    signature: bool,
    hidden: bool,
}

impl Fragment {
    /// Lines of the fragment, top to bottom
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the fragment is a `>`-quoted block (with its reply header)
    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn is_signature(&self) -> bool {
        self.signature
    }

    /// Whether the fragment sits below the visible reply and is dropped
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// An email body split into fragments
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    fragments: Vec<Fragment>,
}

impl EmailMessage {
    /// Split a plaintext body into fragments
    pub fn read(body: &str) -> Self {
        let text = prepare(body);
        let lines: Vec<&str> = text.split('\n').collect();
        let history_start = lines
            .iter()
            .position(|line| is_history_header(line))
            .unwrap_or(lines.len());

        let mut scanner = Scanner::default();
        for (i, line) in lines.iter().enumerate().rev() {
            scanner.scan_line(line, i >= history_start);
        }

        Self {
            fragments: scanner.finish(),
        }
    }

    /// Fragments in top-to-bottom order
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Text of the fragments that are neither hidden nor quoted
    pub fn visible_text(&self) -> String {
        self.fragments
            .iter()
            .filter(|f| !f.hidden && !f.quoted)
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

/// [`ReplyExtractor`] backed by [`EmailMessage`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentExtractor;

impl ReplyExtractor for FragmentExtractor {
    fn extract_reply(&self, body: &str) -> String {
        if body.trim().is_empty() {
            return String::new();
        }
        EmailMessage::read(body).visible_text()
    }
}

/// Normalize line endings and rewrite constructs that a line scanner would
/// otherwise split wrongly
fn prepare(body: &str) -> String {
    let text = normalize_line_endings(body);

    let text = multi_line_header_regex().replace_all(&text, |caps: &Captures| {
        let header = &caps[0];
        let wraps_cleanly = header.lines().skip(1).all(|line| {
            let line = line.trim_start();
            !line.is_empty() && !line.starts_with('>')
        });
        if header.contains('\n') && wraps_cleanly {
            header.replace('\n', " ")
        } else {
            header.to_string()
        }
    });

    // Replies written directly above an underscore rule need a blank line
    // between the two so the rule opens its own fragment
    underscore_rule_regex()
        .replace_all(&text, "${1}\n\n${2}")
        .into_owned()
}

/// Fragment being accumulated; lines are stored bottom-to-top
struct PendingFragment {
    quoted: bool,
    signature: bool,
    lines: Vec<String>,
}

#[derive(Default)]
struct Scanner {
    fragments: Vec<Fragment>,
    current: Option<PendingFragment>,
    found_visible: bool,
}

impl Scanner {
    fn scan_line(&mut self, raw: &str, in_history: bool) {
        let is_signature_line = signature_regex().is_match(raw);
        // Keep the trailing space of "-- "
        let line = if is_signature_line {
            raw
        } else {
            raw.trim_end()
        };

        let is_quoted = in_history || line.trim_start().starts_with('>');
        let is_quote_header = quote_header_regex().is_match(line);
        let is_empty = line.is_empty();

        // A blank line above a signature-looking line closes the signature.
        // The "-- " separator closes it even without the blank line.
        let closes_signature = is_empty
            || self
                .current
                .as_ref()
                .and_then(|f| f.lines.last())
                .is_some_and(|last| last == SIGNATURE_SEPARATOR);
        if closes_signature {
            self.close_signature();
        }

        let continues = match &self.current {
            Some(fragment) => {
                fragment.quoted == is_quoted
                    || (fragment.quoted && (is_quote_header || is_empty))
            }
            None => false,
        };

        if continues {
            if let Some(fragment) = self.current.as_mut() {
                fragment.lines.push(line.to_string());
            }
        } else {
            self.finish_fragment();
            self.current = Some(PendingFragment {
                quoted: is_quoted,
                signature: false,
                lines: vec![line.to_string()],
            });
        }
    }

    /// Mark the current fragment as a signature if its top line looks like one
    fn close_signature(&mut self) {
        let Some(fragment) = self.current.as_mut() else {
            return;
        };
        if fragment
            .lines
            .last()
            .is_some_and(|last| signature_regex().is_match(last))
        {
            fragment.signature = true;
            self.finish_fragment();
        }
    }

    fn finish_fragment(&mut self) {
        let Some(pending) = self.current.take() else {
            return;
        };

        let content = pending
            .lines
            .iter()
            .rev()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut hidden = false;
        if !self.found_visible {
            if pending.quoted || pending.signature || content.trim().is_empty() {
                hidden = true;
            } else {
                self.found_visible = true;
            }
        }

        self.fragments.push(Fragment {
            content,
            quoted: pending.quoted,
            signature: pending.signature,
            hidden,
        });
    }

    /// Close the last fragment and return all fragments top to bottom
    fn finish(mut self) -> Vec<Fragment> {
        // The top of the body bounds a signature the way a blank line does,
        // but only for fragments made of nothing but signature lines
        if let Some(fragment) = self.current.as_mut() {
            let top_is_delimiter = fragment
                .lines
                .last()
                .is_some_and(|last| delimiter_regex().is_match(last));
            let all_signature = fragment
                .lines
                .iter()
                .all(|l| l.trim().is_empty() || signature_regex().is_match(l));
            if !fragment.quoted && (top_is_delimiter || all_signature) {
                fragment.signature = true;
            }
        }
        self.finish_fragment();

        self.fragments.reverse();
        self.fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(body: &str) -> String {
        FragmentExtractor.extract_reply(body)
    }

    #[test]
    fn test_strips_quote_and_header() {
        let body = "Hi\nOn Mon, Jan 1, 2024, X wrote:\n> old content";
        assert_eq!(extract(body), "Hi");
    }

    #[test]
    fn test_signature_only_body_is_empty() {
        assert_eq!(extract("-- \nSent from my iPhone"), "");
        assert_eq!(extract("Sent from my iPhone"), "");
    }

    #[test]
    fn test_strips_mobile_footer() {
        let body = "Sounds good, see you then.\n\nSent from my iPhone";
        assert_eq!(extract(body), "Sounds good, see you then.");
    }

    #[test]
    fn test_strips_delimited_signature() {
        let body = "Thanks for the update.\n\n-- \nJane Doe\nACME Corp";
        assert_eq!(extract(body), "Thanks for the update.");

        // RFC 3676 delimiter without a blank line above it
        let body = "Thanks.\n-- \nJane";
        assert_eq!(extract(body), "Thanks.");
    }

    #[test]
    fn test_clean_body_is_idempotent() {
        let body = "Hello team,\n\nThe build is green again.\nShip it.\n";
        let once = extract(body);
        assert_eq!(once, "Hello team,\n\nThe build is green again.\nShip it.");
        assert_eq!(extract(&once), once);
    }

    #[test]
    fn test_crlf_body() {
        let body = "Yes.\r\n\r\nOn Tue, Feb 6, 2024 at 9:12 AM, Bob wrote:\r\n> Can you?\r\n";
        assert_eq!(extract(body), "Yes.");
    }

    #[test]
    fn test_wrapped_reply_header() {
        let body = "Thanks!\n\nOn Mon, Jan 1, 2024 at 10:00 AM, Alice Example <alice@example.com>\nwrote:\n> old\n> older";
        let message = EmailMessage::read(body);
        assert_eq!(message.visible_text(), "Thanks!");

        let quoted = message
            .fragments()
            .iter()
            .find(|f| f.is_quoted())
            .unwrap();
        assert!(quoted.content().trim_start().starts_with(
            "On Mon, Jan 1, 2024 at 10:00 AM, Alice Example <alice@example.com> wrote:"
        ));
    }

    #[test]
    fn test_french_reply_header() {
        let body = "Merci !\n\nLe lun. 1 janv. 2024 à 10:00, Jean <jean@example.fr> a écrit :\n> Bonjour";
        assert_eq!(extract(body), "Merci !");
    }

    #[test]
    fn test_outlook_separator() {
        let body = "Sounds good\n________________________________\nFrom: Bob\nSent: Monday\nSubject: plan\n\nOriginal text";
        assert_eq!(extract(body), "Sounds good");
    }

    #[test]
    fn test_header_block_without_rule() {
        let body = "Sounds good\n\nFrom: Bob <bob@x.com>\nSent: Monday\nSubject: plan\n\nOriginal text from Bob";
        assert_eq!(extract(body), "Sounds good");

        let body = "Voici le fichier.\nDe : Paul <paul@example.fr>\nObjet : Rapport\n\nTexte";
        assert_eq!(extract(body), "Voici le fichier.");
    }

    #[test]
    fn test_unquoted_attribution_hides_history() {
        let body = "Thanks\n\nOn Mon, Jan 1, 2024, X wrote:\nold content not quoted";
        let message = EmailMessage::read(body);
        assert_eq!(message.visible_text(), "Thanks");

        let history = message.fragments().last().unwrap();
        assert!(history.is_quoted());
        assert!(history.content().contains("old content not quoted"));
    }

    #[test]
    fn test_underlined_heading_keeps_body() {
        let body = "Status update\n-------------\nThe numbers are up this week.";
        assert_eq!(extract(body), body);

        let body = "First point.\n--------\nSecond point.";
        assert_eq!(extract(body), body);
    }

    #[test]
    fn test_inline_replies_keep_answers() {
        let body = "> question one?\nanswer one\n> question two?\nanswer two";
        assert_eq!(extract(body), "answer one\nanswer two");
    }

    #[test]
    fn test_fully_quoted_body_is_empty() {
        assert_eq!(extract("> a\n> b\n"), "");
    }

    #[test]
    fn test_fragment_flags() {
        let body = "Reply text\n\nOn Mon, Jan 1, 2024, X wrote:\n> quoted\n\n-- \nsig";
        let message = EmailMessage::read(body);
        let fragments = message.fragments();

        assert_eq!(fragments.first().unwrap().content().trim(), "Reply text");
        assert!(!fragments.first().unwrap().is_hidden());
        assert!(fragments.iter().any(|f| f.is_quoted() && f.is_hidden()));
        assert!(fragments.iter().any(|f| f.is_signature() && f.is_hidden()));
        assert_eq!(message.visible_text(), "Reply text");
    }

    #[test]
    fn test_leading_dash_text_is_not_a_signature() {
        let body = "--force is broken on main\nPlease take a look";
        assert_eq!(extract(body), body);
    }

    #[test]
    fn test_garbage_input_does_not_panic() {
        let inputs = ["\u{0}\u{1}>>>", ">", "On wrote:", "\n\n\n", "é\r\r\n>\r"];
        for input in inputs {
            let _ = extract(input);
        }
    }
}
