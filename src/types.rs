use std::path::PathBuf;

use serde::Serialize;

use crate::error::SiftError;
use crate::regex::Span;

/// One input to search, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Stdin,
    File(PathBuf),
}

/// Rendered output and selection count for one input.
#[derive(Debug, Default)]
pub struct FileReport {
    pub path: Option<PathBuf>,
    pub selected: u64,
    pub output: String,
    pub binary: bool,
}

/// Outcome of a whole run. Per-file errors do not stop the run.
#[derive(Debug, Default)]
pub struct Summary {
    pub selected: u64,
    pub errors: Vec<SiftError>,
}

impl Summary {
    /// 0 if any line was selected, otherwise 2 if an input failed, otherwise 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match (self.selected, self.errors.is_empty()) {
            (0, false) => 2,
            (0, true) => 1,
            _ => 0,
        }
    }
}

/// `--json` record for one selected line.
#[derive(Debug, Serialize)]
pub struct LineRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub line_number: u64,
    pub text: &'a str,
    pub matches: Vec<MatchRecord<'a>>,
}

/// One match within a [`LineRecord`]. `groups[0]` is group 1.
#[derive(Debug, Serialize)]
pub struct MatchRecord<'a> {
    pub text: &'a str,
    pub span: Span,
    pub groups: Vec<Option<Span>>,
}
