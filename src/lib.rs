#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,  // byte offsets and line numbers; we target 64-bit
    clippy::cast_sign_loss,            // same
    clippy::module_name_repetitions,   // Rust naming conventions
    clippy::similar_names,             // lo/hi, pc/at in the engine
    clippy::too_many_lines,            // the parser's term dispatch
    clippy::struct_excessive_bools,    // CLI struct derives clap
    clippy::missing_errors_doc,        // error enums document themselves
    clippy::missing_panics_doc,        // same
)]

pub mod error;
pub(crate) mod format;
pub mod regex;
pub mod search;
pub mod types;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use rayon::prelude::*;

pub use error::{MatchError, PatternError, SiftError};
pub use regex::{
    compile_or_validate, is_match, match_with_captures, Captures, Match, Regex, RegexBuilder,
    Span, DEFAULT_STEP_LIMIT,
};
pub use search::{SearchOptions, Searcher};
pub use types::{FileReport, Summary, Target};

/// Everything one invocation needs. `main` builds it from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub pattern: String,
    /// Inputs in order. Empty means stdin, or `.` when recursive.
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    /// File-name globs that recursive search keeps. Empty keeps everything.
    pub include: Vec<String>,
    pub step_limit: usize,
    pub options: SearchOptions,
}

impl Config {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            paths: Vec::new(),
            recursive: false,
            include: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            options: SearchOptions::default(),
        }
    }
}

/// Search every input and write selected lines to `out` in input order.
///
/// Only a bad pattern, a bad glob or a failed write is fatal. Unreadable
/// inputs are collected in [`Summary::errors`] and the run goes on.
pub fn run<R: BufRead, W: Write>(
    config: &Config,
    mut stdin: R,
    out: &mut W,
) -> Result<Summary, SiftError> {
    let regex = RegexBuilder::new()
        .step_limit(config.step_limit)
        .build(&config.pattern)?;
    let include = search::include_set(&config.include)?;

    let paths = if config.paths.is_empty() {
        vec![PathBuf::from(if config.recursive { "." } else { "-" })]
    } else {
        config.paths.clone()
    };
    let (targets, errors) = search::targets(&paths, config.recursive, include.as_ref());

    let mut options = config.options.clone();
    options.with_filename |= config.recursive || targets.len() > 1;
    let searcher = Searcher::new(&regex, &options);

    log::debug!(
        "pattern {:?}: {} targets, {} walk errors",
        regex.as_str(),
        targets.len(),
        errors.len()
    );

    let mut summary = Summary {
        selected: 0,
        errors,
    };

    // Files are searched in parallel and written in input order. Stdin is
    // streamed in place. Quiet runs go one target at a time so they can stop
    // at the first selected line.
    let mut reports = if options.quiet {
        Vec::new()
    } else {
        targets
            .par_iter()
            .map(|target| match target {
                Target::File(path) => Some(searcher.search_file(path)),
                Target::Stdin => None,
            })
            .collect::<Vec<_>>()
    }
    .into_iter();

    for target in &targets {
        let result = match (target, reports.next().flatten()) {
            (_, Some(done)) => done,
            (Target::Stdin, None) => searcher.search_reader(&mut stdin, None, out),
            (Target::File(path), None) => searcher.search_file(path),
        };

        match result {
            Ok(report) => {
                out.write_all(report.output.as_bytes())
                    .map_err(SiftError::Output)?;
                summary.selected += report.selected;
            }
            Err(SiftError::Output(e)) => return Err(SiftError::Output(e)),
            Err(e) => {
                log::warn!("skipping input: {e}");
                summary.errors.push(e);
            }
        }

        if options.quiet && summary.selected > 0 {
            break;
        }
    }

    out.flush().map_err(SiftError::Output)?;
    Ok(summary)
}
