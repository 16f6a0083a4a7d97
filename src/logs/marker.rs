//! Marker tokenizer for installer log lines.
//!
//! The installer prefixes its own messages with `[keptn|<level>] [<timestamp>]`.
//! Lines without such a prefix carry no signal.

use std::sync::OnceLock;

use regex::Regex;

/// Message that marks a stream as successful.
pub const SUCCESS_MESSAGE: &str = "Installation of keptn complete.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Verbose,
    Debug,
    /// Every unrecognized level, including `error` and `quiet`.
    Error,
}

impl Severity {
    fn from_level(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "info" => Severity::Info,
            "verbose" => Severity::Verbose,
            "debug" => Severity::Debug,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub severity: Severity,
    pub message: String,
}

impl Marker {
    pub fn is_success(&self) -> bool {
        self.message == SUCCESS_MESSAGE
    }
}

fn level_pattern() -> &'static Regex {
    static LEVEL: OnceLock<Regex> = OnceLock::new();
    LEVEL.get_or_init(|| Regex::new(r"\[keptn\|([A-Za-z]+)\]").expect("level pattern"))
}

fn prefix_pattern() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"\[keptn\|[a-zA-Z]+\]\s+\[.*\]").expect("prefix pattern"))
}

pub fn parse_marker(line: &str) -> Option<Marker> {
    let level = level_pattern().captures(line)?.get(1)?.as_str();
    let message = prefix_pattern().replace_all(line, "").trim().to_string();
    Some(Marker {
        severity: Severity::from_level(level),
        message,
    })
}
