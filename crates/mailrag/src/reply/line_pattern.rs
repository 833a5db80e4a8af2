//! Line-pattern reply extraction
//!
//! Keeps everything above the first line that looks like the start of quoted
//! history: a `>` quote, an attribution line, or a forwarded-header block.

use regex::Regex;
use std::sync::OnceLock;

use super::{ReplyExtractor, normalize_line_endings};

static HISTORY_HEADER_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns marking a header line that introduces quoted history
///
/// English and French variants, with or without a trailing `<email>`.
fn history_header_patterns() -> &'static [Regex] {
    HISTORY_HEADER_PATTERNS.get_or_init(|| {
        [
            // On Mon, Jan 1, 2024 at 10:00, Alice <alice@example.com> wrote:
            r"^\s*On\s.+wrote:\s*$",
            // Le lun. 1 janv. 2024 à 10:00, Jean <jean@example.fr> a écrit :
            r"^\s*Le\s.+a\s+écrit\s*:\s*$",
            // Attribution wrapped before "wrote:" / "a écrit :"
            r"^\s*(?:On|Le)\s.+<[^<>\s]+@[^<>\s]+>\s*,?\s*$",
            // De : / From: / Objet : / Subject: / Envoyé : / Sent: header blocks
            r"(?i)^\s*\*?(?:De|From|Objet|Subject|Envoyé|Sent)\s?:\*?\s+\S",
            // -----Original Message----- / -------- Message d'origine --------
            r"(?i)^\s*-{2,}\s*(?:Original Message|Message d'origine|Forwarded message|Message transféré)\s*-{2,}\s*$",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid reply cutoff regex"))
        .collect()
    })
}

/// Whether the line is an attribution, header block line or separator that
/// opens quoted history
pub(super) fn is_history_header(line: &str) -> bool {
    history_header_patterns().iter().any(|re| re.is_match(line))
}

/// Splits a body at the start of its quoted history
pub struct EmailParser;

impl EmailParser {
    /// Index of the first line that starts quoted history, if any
    pub fn cutoff_line(lines: &[&str]) -> Option<usize> {
        lines
            .iter()
            .position(|line| line.trim_start().starts_with('>') || is_history_header(line))
    }

    /// Lines above the cutoff, without leading or trailing blank lines
    pub fn parse_reply(body: &str) -> String {
        let text = normalize_line_endings(body);
        let lines: Vec<&str> = text.split('\n').collect();

        let end = Self::cutoff_line(&lines).unwrap_or(lines.len());
        let kept = &lines[..end];

        let Some(first) = kept.iter().position(|l| !l.trim().is_empty()) else {
            return String::new();
        };
        let last = kept
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .unwrap_or(first);

        kept[first..=last].join("\n")
    }
}

/// [`ReplyExtractor`] backed by [`EmailParser`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinePatternExtractor;

impl ReplyExtractor for LinePatternExtractor {
    fn extract_reply(&self, body: &str) -> String {
        EmailParser::parse_reply(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(body: &str) -> String {
        LinePatternExtractor.extract_reply(body)
    }

    #[test]
    fn test_stops_at_attribution() {
        let body = "\n\nSure, Friday works.\n\nOn Mon, Jan 1, 2024, X wrote:\n> old content";
        assert_eq!(extract(body), "Sure, Friday works.");
    }

    #[test]
    fn test_stops_at_first_quote() {
        let body = "Answer\n> quoted\nmore text below the quote";
        assert_eq!(extract(body), "Answer");
    }

    #[test]
    fn test_stops_at_french_attribution() {
        let body = "D'accord.\nLe 3 févr. 2024 à 08:15, Marie <marie@example.fr> a écrit :\n> Salut";
        assert_eq!(extract(body), "D'accord.");
    }

    #[test]
    fn test_stops_at_wrapped_attribution() {
        let body = "Done.\n\nOn Tue, Feb 6, 2024 at 9:12 AM Bob Smith <bob@example.com>\nwrote:\n> ok?";
        assert_eq!(extract(body), "Done.");
    }

    #[test]
    fn test_stops_at_header_block() {
        let body = "Voici le fichier.\n\nDe : Paul <paul@example.fr>\nEnvoyé : lundi\nObjet : Rapport";
        assert_eq!(extract(body), "Voici le fichier.");

        let body = "See below.\n\n*From:* Ann\n*Subject:* numbers";
        assert_eq!(extract(body), "See below.");
    }

    #[test]
    fn test_stops_at_original_message_separator() {
        let body = "FYI\n\n-----Original Message-----\nFrom: someone";
        assert_eq!(extract(body), "FYI");
    }

    #[test]
    fn test_keeps_inner_blank_lines() {
        let body = "Para one.\n\nPara two.\n\n\n";
        assert_eq!(extract(body), "Para one.\n\nPara two.");
        assert_eq!(extract(&extract(body)), extract(body));
    }

    #[test]
    fn test_body_starting_with_quote_is_empty() {
        assert_eq!(extract("> everything quoted\n> here"), "");
    }

    #[test]
    fn test_sent_from_footer_is_not_a_header() {
        let body = "Ok\nSent from my phone";
        assert_eq!(extract(body), body);
    }

    #[test]
    fn test_history_header_lines() {
        assert!(is_history_header("From: Bob <bob@example.com>"));
        assert!(is_history_header("On Mon, Jan 1, 2024, X wrote:"));
        assert!(is_history_header("-----Original Message-----"));
        assert!(!is_history_header("> quoted"));
        assert!(!is_history_header("Sent from my phone"));
    }

    #[test]
    fn test_cutoff_line_index() {
        let lines = ["a", "b", "From: x", "c"];
        assert_eq!(EmailParser::cutoff_line(&lines), Some(2));
        assert_eq!(EmailParser::cutoff_line(&["a", "b"]), None);
    }
}
