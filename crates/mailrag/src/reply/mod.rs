//! Reply extraction
//!
//! Given the plaintext body of an email, keep only what the sender newly
//! wrote: quoted history, reply headers ("On ... wrote:", "De :", ...) and
//! trailing signatures are dropped.
//!
//! Two strategies share the [`ReplyExtractor`] contract:
//!
//! - [`FragmentExtractor`] splits the body into quoted / signature / visible
//!   fragments by scanning it bottom-to-top (the default)
//! - [`LinePatternExtractor`] cuts the body at the first line that looks like
//!   the start of quoted history
//!
//! Both are stateless, never fail, and return an empty string for blank input.

mod fragment;
mod line_pattern;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use fragment::{EmailMessage, Fragment, FragmentExtractor};
pub use line_pattern::{EmailParser, LinePatternExtractor};

/// Extracts the newly written part of an email body
pub trait ReplyExtractor: Send + Sync {
    /// Return the reply text of `body`, possibly empty
    fn extract_reply(&self, body: &str) -> String;
}

/// Which extraction algorithm to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    /// Bottom-up fragment classification
    #[default]
    Fragments,
    /// Forward scan stopping at the first quote or reply-header line
    LinePattern,
}

impl ExtractionStrategy {
    /// Instantiate the extractor for this strategy
    pub fn extractor(self) -> Box<dyn ReplyExtractor> {
        match self {
            ExtractionStrategy::Fragments => Box::new(FragmentExtractor),
            ExtractionStrategy::LinePattern => Box::new(LinePatternExtractor),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::Fragments => "fragments",
            ExtractionStrategy::LinePattern => "line-pattern",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized strategy names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown extraction strategy '{0}' (expected 'fragments' or 'line-pattern')")]
pub struct UnknownStrategyError(pub String);

impl FromStr for ExtractionStrategy {
    type Err = UnknownStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fragments" | "fragment" => Ok(ExtractionStrategy::Fragments),
            "line-pattern" | "line_pattern" | "lines" => Ok(ExtractionStrategy::LinePattern),
            other => Err(UnknownStrategyError(other.to_string())),
        }
    }
}

/// Extract the reply with the default strategy
pub fn extract_reply(body: &str) -> String {
    FragmentExtractor.extract_reply(body)
}

/// Convert CRLF and lone CR line endings to LF
pub(crate) fn normalize_line_endings(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\r', "\n")
}
