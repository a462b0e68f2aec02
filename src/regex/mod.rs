//! Backtracking regular expressions with captures and backreferences.
//!
//! Supported syntax: literals, `.`, `[...]` / `[^...]` with ranges,
//! `\d \w \s \D \W \S`, `^ $ \b \B`, groups `(...)`, `(?:...)`,
//! lookahead `(?=...)` / `(?!...)`, backreferences `\1`..`\9`, alternation,
//! and the quantifiers `* + ? {m} {m,} {m,n}`, each with a lazy `?` form.
//!
//! Two matching modes share one engine:
//! - [`Regex::is_match`] / [`Regex::captures`] match the *whole* text;
//! - [`Regex::find`] / [`Regex::captures_within`] search for a substring.
//!
//! `^` and `$` are positional assertions in both modes.

pub mod atom;
pub mod captures;
pub mod compile;
pub mod cursor;
pub mod engine;
pub mod parse;

use std::fmt;
use std::ops::Range;

use crate::error::{MatchError, PatternError};

pub use captures::Span;
use compile::Program;
use engine::Engine;

/// Default ceiling on engine steps per call.
pub const DEFAULT_STEP_LIMIT: usize = 10_000_000;

/// A validated, compiled pattern. Compiling twice yields equivalent values;
/// matching never mutates it.
#[derive(Clone)]
pub struct Regex {
    pattern: String,
    program: Program,
    step_limit: usize,
}

/// Configures compilation limits.
#[derive(Debug, Clone)]
pub struct RegexBuilder {
    step_limit: usize,
}

impl Default for RegexBuilder {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

impl RegexBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of engine steps for one match call. Past it the
    /// `try_*` methods return [`MatchError::StepLimitExceeded`] and the plain
    /// methods report no match.
    pub fn step_limit(&mut self, limit: usize) -> &mut Self {
        self.step_limit = limit;
        self
    }

    pub fn build(&self, pattern: &str) -> Result<Regex, PatternError> {
        let ast = parse::parse(pattern)?;
        let program = compile::compile(&ast)?;
        Ok(Regex {
            pattern: pattern.to_string(),
            program,
            step_limit: self.step_limit,
        })
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Regex").field(&self.pattern).finish()
    }
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        RegexBuilder::new().build(pattern)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Number of groups including the implicit whole-match group 0.
    #[must_use]
    pub fn captures_len(&self) -> usize {
        self.program.groups + 1
    }

    /// Does the pattern match the entire text?
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        fail_closed(self.try_is_match(text))
    }

    pub fn try_is_match(&self, text: &str) -> Result<bool, MatchError> {
        Ok(self.try_captures(text)?.is_some())
    }

    /// Whole-text match with group spans.
    #[must_use]
    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        fail_closed(self.try_captures(text))
    }

    pub fn try_captures<'t>(&self, text: &'t str) -> Result<Option<Captures<'t>>, MatchError> {
        log::trace!("whole match {:?} against {} bytes", self.pattern, text.len());
        let spans = Engine::new(&self.program, text, self.step_limit).match_whole()?;
        Ok(spans.map(|spans| Captures { text, spans }))
    }

    /// Leftmost substring match.
    #[must_use]
    pub fn find<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        self.captures_within(text).and_then(|caps| caps.get(0))
    }

    pub fn try_find<'t>(&self, text: &'t str) -> Result<Option<Match<'t>>, MatchError> {
        Ok(self.try_captures_at(text, 0)?.and_then(|caps| caps.get(0)))
    }

    /// Leftmost substring match with group spans.
    #[must_use]
    pub fn captures_within<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        fail_closed(self.try_captures_at(text, 0))
    }

    /// Substring search starting at byte offset `from` (a char boundary).
    /// `^` still refers to offset 0 of `text`.
    pub fn try_captures_at<'t>(
        &self,
        text: &'t str,
        from: usize,
    ) -> Result<Option<Captures<'t>>, MatchError> {
        log::trace!(
            "search {:?} in {} bytes from {from}",
            self.pattern,
            text.len()
        );
        let spans = Engine::new(&self.program, text, self.step_limit).search(from)?;
        Ok(spans.map(|spans| Captures { text, spans }))
    }

    /// Successive non-overlapping substring matches, left to right.
    #[must_use]
    pub fn captures_iter<'r, 't>(&'r self, text: &'t str) -> CaptureMatches<'r, 't> {
        CaptureMatches {
            regex: self,
            text,
            pos: 0,
            last_end: None,
            done: false,
        }
    }

    #[must_use]
    pub fn find_iter<'r, 't>(&'r self, text: &'t str) -> Matches<'r, 't> {
        Matches(self.captures_iter(text))
    }
}

fn fail_closed<T: Default>(result: Result<T, MatchError>) -> T {
    result.unwrap_or_else(|e| {
        log::warn!("{e}; treating as no match");
        T::default()
    })
}

/// A matched span together with the text it indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'t> {
    text: &'t str,
    start: usize,
    end: usize,
}

impl<'t> Match<'t> {
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    #[must_use]
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    #[must_use]
    pub fn as_str(&self) -> &'t str {
        &self.text[self.start..self.end]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Group spans of one successful match. Index 0 is the whole match;
/// groups that did not participate are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captures<'t> {
    text: &'t str,
    spans: Vec<Option<Span>>,
}

impl<'t> Captures<'t> {
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Match<'t>> {
        self.spans.get(i).copied().flatten().map(|s| Match {
            text: self.text,
            start: s.start,
            end: s.end,
        })
    }

    /// Number of groups including group 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn spans(&self) -> &[Option<Span>] {
        &self.spans
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Match<'t>>> + '_ {
        (0..self.spans.len()).map(|i| self.get(i))
    }
}

/// Iterator returned by [`Regex::captures_iter`].
#[derive(Debug)]
pub struct CaptureMatches<'r, 't> {
    regex: &'r Regex,
    text: &'t str,
    pos: usize,
    last_end: Option<usize>,
    done: bool,
}

impl<'t> Iterator for CaptureMatches<'_, 't> {
    type Item = Captures<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.pos <= self.text.len() {
            let caps = fail_closed(self.regex.try_captures_at(self.text, self.pos))?;
            let whole = caps.get(0)?;
            // Skip an empty match right where the previous one ended.
            if whole.is_empty() && self.last_end == Some(whole.end()) {
                match self.text[whole.end()..].chars().next() {
                    Some(c) => self.pos = whole.end() + c.len_utf8(),
                    None => self.done = true,
                }
                continue;
            }
            self.pos = whole.end();
            self.last_end = Some(whole.end());
            if whole.is_empty() {
                match self.text[whole.end()..].chars().next() {
                    Some(c) => self.pos += c.len_utf8(),
                    None => self.done = true,
                }
            }
            return Some(caps);
        }
        None
    }
}

/// Iterator returned by [`Regex::find_iter`].
#[derive(Debug)]
pub struct Matches<'r, 't>(CaptureMatches<'r, 't>);

impl<'t> Iterator for Matches<'_, 't> {
    type Item = Match<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().and_then(|caps| caps.get(0))
    }
}

/// Validate and compile `pattern`. Unbalanced groups or classes, malformed
/// quantifiers and impossible backreferences are rejected here.
pub fn compile_or_validate(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern)
}

/// Whole-text match.
#[must_use]
pub fn is_match(text: &str, pattern: &Regex) -> bool {
    pattern.is_match(text)
}

/// Whole-text match returning `(start, end)` spans, group 0 first.
#[must_use]
pub fn match_with_captures(text: &str, pattern: &Regex) -> Option<Vec<Option<Span>>> {
    pattern.captures(text).map(|caps| caps.spans)
}
