//! Backtracking executor for compiled programs.
//!
//! The search is a depth-first walk over `(pc, text offset)` states driven
//! by an explicit job stack instead of native recursion, so long lines
//! cannot overflow the call stack. Each `Split` pushes its secondary
//! branch; each capture change pushes an undo job. Failure pops jobs until
//! a branch to resume is found, restoring captures on the way.
//!
//! Every state is memoized the first time it is entered. Reaching it again
//! means it either already failed or is an ancestor on the current path
//! (an empty loop), so the revisit fails immediately. The key includes the
//! capture state only when the program has backreferences, since only they
//! make the outcome depend on it. Memo and captures live for one call.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::error::MatchError;

use super::atom::is_word_char;
use super::captures::{CaptureStore, Span, Token};
use super::compile::{Inst, Program};
use super::parse::Assertion;

/// Dense bitsets are used up to this many `(pc, offset)` states.
const DENSE_VISITED_LIMIT: usize = 1 << 24;

/// Capture slots the keyed memo may hold (16 bytes each). Past it the
/// match fails with [`MatchError::MemoLimitExceeded`].
const KEYED_SLOT_BUDGET: usize = 1 << 21;

/// Where `Inst::Match` is allowed to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRule {
    /// Only at the end of the text: whole-line matching.
    TextEnd,
    /// At any offset: substring search and lookahead bodies.
    Anywhere,
}

impl EndRule {
    fn accepts(self, at: usize, len: usize) -> bool {
        match self {
            Self::TextEnd => at == len,
            Self::Anywhere => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Explore { pc: usize, at: usize },
    Restore(Token),
}

enum Visited {
    /// `touched` lists every word that went nonzero, so a reset costs what
    /// the run cost rather than the size of the bitset.
    Dense {
        bits: Vec<u64>,
        stride: usize,
        touched: Vec<usize>,
    },
    Sparse(HashSet<(usize, usize)>),
    Keyed(KeyedMemo),
}

impl Visited {
    fn new(prog: &Program, text_len: usize) -> Self {
        if prog.has_backrefs {
            return Self::Keyed(KeyedMemo::new(KEYED_SLOT_BUDGET));
        }
        let stride = text_len + 1;
        let states = prog.insts.len().saturating_mul(stride);
        if states <= DENSE_VISITED_LIMIT {
            Self::Dense {
                bits: vec![0; states.div_ceil(64)],
                stride,
                touched: Vec::new(),
            }
        } else {
            Self::Sparse(HashSet::new())
        }
    }

    /// Mark the state; `false` if it was already marked.
    fn insert(
        &mut self,
        pc: usize,
        at: usize,
        captures: &CaptureStore,
    ) -> Result<bool, MatchError> {
        match self {
            Self::Dense {
                bits,
                stride,
                touched,
            } => {
                let idx = pc * *stride + at;
                let (word, bit) = (idx / 64, 1u64 << (idx % 64));
                if bits[word] == 0 {
                    touched.push(word);
                }
                let fresh = bits[word] & bit == 0;
                bits[word] |= bit;
                Ok(fresh)
            }
            Self::Sparse(set) => Ok(set.insert((pc, at))),
            Self::Keyed(memo) => memo.insert(pc, at, captures),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Dense { bits, touched, .. } => {
                for word in touched.drain(..) {
                    bits[word] = 0;
                }
            }
            Self::Sparse(set) => set.clear(),
            Self::Keyed(memo) => memo.clear(),
        }
    }
}

/// Memo for programs with backreferences, keyed by `(pc, at)` plus the
/// capture state. Keys are looked up by fingerprint and confirmed against
/// the slots stored in one flat arena, so a lookup never allocates.
struct KeyedMemo {
    index: HashMap<(usize, usize, u64), usize>,
    slots: Vec<Option<usize>>,
    budget: usize,
}

impl KeyedMemo {
    fn new(budget: usize) -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            budget,
        }
    }

    fn insert(
        &mut self,
        pc: usize,
        at: usize,
        captures: &CaptureStore,
    ) -> Result<bool, MatchError> {
        let width = captures.slot_count();
        match self.index.entry((pc, at, captures.fingerprint())) {
            // A fingerprint collision with different slots is left unrecorded.
            Entry::Occupied(entry) => {
                let start = *entry.get();
                Ok(!captures
                    .slots()
                    .eq(self.slots[start..start + width].iter().copied()))
            }
            Entry::Vacant(entry) => {
                if self.slots.len() + width > self.budget {
                    return Err(MatchError::MemoLimitExceeded {
                        slots: self.budget,
                    });
                }
                entry.insert(self.slots.len());
                self.slots.extend(captures.slots());
                Ok(true)
            }
        }
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
    }
}

/// Per-call matcher state. Created for one top-level call and dropped after.
pub struct Engine<'r, 't> {
    prog: &'r Program,
    text: &'t str,
    captures: CaptureStore,
    visited: Visited,
    /// Cleared memos kept for reuse by lookahead bodies, one per nesting level.
    spare: Vec<Visited>,
    stack: Vec<Job>,
    steps: usize,
    step_limit: usize,
}

impl<'r, 't> Engine<'r, 't> {
    pub fn new(prog: &'r Program, text: &'t str, step_limit: usize) -> Self {
        Self {
            prog,
            text,
            captures: CaptureStore::new(prog.groups),
            visited: Visited::new(prog, text.len()),
            spare: Vec::new(),
            stack: Vec::new(),
            steps: 0,
            step_limit,
        }
    }

    /// Whole-text match from offset 0. On success returns the capture spans,
    /// group 0 first.
    pub fn match_whole(&mut self) -> Result<Option<Vec<Option<Span>>>, MatchError> {
        let found = self.run(0, 0, EndRule::TextEnd)?;
        Ok(found.map(|end| self.spans(0, end)))
    }

    /// Leftmost match starting at or after `from`. Start offsets are tried
    /// in order; the memo is shared between them because a state that failed
    /// from one start fails from every start.
    pub fn search(&mut self, from: usize) -> Result<Option<Vec<Option<Span>>>, MatchError> {
        if self.prog.anchored_start && from > 0 {
            return Ok(None);
        }
        let bytes = self.text.as_bytes();
        let mut start = from;
        while start <= self.text.len() {
            if let Some(b) = self.prog.first_byte {
                match memchr::memchr(b, &bytes[start..]) {
                    Some(skip) => start += skip,
                    None => return Ok(None),
                }
            }
            if let Some(end) = self.run(0, start, EndRule::Anywhere)? {
                return Ok(Some(self.spans(start, end)));
            }
            if self.prog.anchored_start {
                break;
            }
            start += self.text[start..].chars().next().map_or(1, char::len_utf8);
        }
        Ok(None)
    }

    fn spans(&self, start: usize, end: usize) -> Vec<Option<Span>> {
        std::iter::once(Some(Span::new(start, end)))
            .chain(self.captures.spans().iter().copied())
            .collect()
    }

    /// Explore from `(pc, at)` until a `Match` accepted by `end` is reached
    /// or every branch pushed by this run has failed. On success the capture
    /// store holds the winning path's groups.
    fn run(&mut self, pc: usize, at: usize, end: EndRule) -> Result<Option<usize>, MatchError> {
        let base = self.stack.len();
        self.stack.push(Job::Explore { pc, at });
        while self.stack.len() > base {
            match self.stack.pop() {
                Some(Job::Restore(token)) => self.captures.rollback(token),
                Some(Job::Explore { pc, at }) => {
                    if let Some(matched) = self.step(pc, at, end)? {
                        self.stack.truncate(base);
                        return Ok(Some(matched));
                    }
                }
                None => break,
            }
        }
        Ok(None)
    }

    /// Follow one thread until it matches or dies.
    fn step(
        &mut self,
        mut pc: usize,
        mut at: usize,
        end: EndRule,
    ) -> Result<Option<usize>, MatchError> {
        let prog = self.prog;
        let text = self.text;
        loop {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(MatchError::StepLimitExceeded {
                    limit: self.step_limit,
                });
            }
            if !self.visited.insert(pc, at, &self.captures)? {
                return Ok(None);
            }
            match &prog.insts[pc] {
                Inst::Match => {
                    return Ok(end.accepts(at, text.len()).then_some(at));
                }
                Inst::Atom(atom) => match text[at..].chars().next() {
                    Some(c) if atom.matches(c) => {
                        at += c.len_utf8();
                        pc += 1;
                    }
                    _ => return Ok(None),
                },
                Inst::Assert(assertion) => {
                    if !self.holds(*assertion, at) {
                        return Ok(None);
                    }
                    pc += 1;
                }
                Inst::Split { primary, secondary } => {
                    self.stack.push(Job::Explore {
                        pc: *secondary,
                        at,
                    });
                    pc = *primary;
                }
                Inst::Jump(target) => pc = *target,
                Inst::GroupStart(group) => {
                    let token = self.captures.open(*group, at);
                    self.stack.push(Job::Restore(token));
                    pc += 1;
                }
                Inst::GroupEnd(group) => {
                    let token = self.captures.close(*group, at);
                    self.stack.push(Job::Restore(token));
                    pc += 1;
                }
                Inst::Backref(group) => {
                    // A group that has not committed on this path never matches.
                    let Some(span) = self.captures.get(*group) else {
                        return Ok(None);
                    };
                    let captured = &text[span.range()];
                    if !text[at..].starts_with(captured) {
                        return Ok(None);
                    }
                    at += captured.len();
                    pc += 1;
                }
                Inst::LookAhead {
                    negated,
                    body,
                    next,
                } => {
                    let token = self.captures.checkpoint();
                    let found = self.lookahead(*body, at)?;
                    match (found, *negated) {
                        (true, false) => {
                            self.stack.push(Job::Restore(token));
                        }
                        (false, true) => {}
                        (true, true) => {
                            self.captures.rollback(token);
                            return Ok(None);
                        }
                        (false, false) => return Ok(None),
                    }
                    pc = *next;
                }
            }
        }
    }

    // Lookahead bodies run with their own memo: the outer memo marks states
    // as dead for the outer search, which says nothing about the body.
    // Inner memos are allocated once per nesting level and cleared after use.
    fn lookahead(&mut self, body: usize, at: usize) -> Result<bool, MatchError> {
        let inner = self
            .spare
            .pop()
            .unwrap_or_else(|| Visited::new(self.prog, self.text.len()));
        let outer = std::mem::replace(&mut self.visited, inner);
        let found = self.run(body, at, EndRule::Anywhere);
        let mut inner = std::mem::replace(&mut self.visited, outer);
        inner.clear();
        self.spare.push(inner);
        Ok(found?.is_some())
    }

    fn holds(&self, assertion: Assertion, at: usize) -> bool {
        match assertion {
            Assertion::Start => at == 0,
            Assertion::End => at == self.text.len(),
            Assertion::WordBoundary => self.at_word_boundary(at),
            Assertion::NotWordBoundary => !self.at_word_boundary(at),
        }
    }

    fn at_word_boundary(&self, at: usize) -> bool {
        let before = self.text[..at].chars().next_back().is_some_and(is_word_char);
        let after = self.text[at..].chars().next().is_some_and(is_word_char);
        before != after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::compile::compile;
    use crate::regex::parse::parse;

    const LIMIT: usize = 1_000_000;

    fn program(pattern: &str) -> Program {
        compile(&parse(pattern).unwrap()).unwrap()
    }

    fn whole(pattern: &str, text: &str) -> Option<Vec<Option<Span>>> {
        let prog = program(pattern);
        Engine::new(&prog, text, LIMIT).match_whole().unwrap()
    }

    fn search(pattern: &str, text: &str) -> Option<Vec<Option<Span>>> {
        let prog = program(pattern);
        Engine::new(&prog, text, LIMIT).search(0).unwrap()
    }

    fn group(spans: &[Option<Span>], i: usize) -> Option<(usize, usize)> {
        spans[i].map(|s| (s.start, s.end))
    }

    #[test]
    fn whole_text_requires_full_consumption() {
        assert!(whole("abc", "abc").is_some());
        assert!(whole("abc", "abcd").is_none());
        assert!(whole("abc", "ab").is_none());
    }

    #[test]
    fn zero_repetitions_at_end_of_text() {
        assert!(whole("a*", "").is_some());
        assert!(whole("ab*c*", "a").is_some());
        assert!(whole("a(bc)*", "a").is_some());
        assert!(whole("a+", "").is_none());
    }

    #[test]
    fn greedy_group_takes_the_most() {
        let spans = whole("(a+)a*", "aaa").unwrap();
        assert_eq!(group(&spans, 1), Some((0, 3)));
    }

    #[test]
    fn lazy_group_takes_the_least() {
        let spans = whole("(a+?)a*", "aaa").unwrap();
        assert_eq!(group(&spans, 1), Some((0, 1)));
    }

    #[test]
    fn greedy_backs_off_for_the_rest() {
        let spans = whole("(a+)(a)b", "aaab").unwrap();
        assert_eq!(group(&spans, 1), Some((0, 2)));
        assert_eq!(group(&spans, 2), Some((2, 3)));
    }

    #[test]
    fn failed_branch_retracts_its_captures() {
        let spans = whole("(?:(a)x|(a)y)", "ay").unwrap();
        assert_eq!(group(&spans, 1), None);
        assert_eq!(group(&spans, 2), Some((0, 1)));
    }

    #[test]
    fn repeated_group_keeps_last_iteration() {
        let spans = whole("(ab)*", "ababab").unwrap();
        assert_eq!(group(&spans, 1), Some((4, 6)));
    }

    #[test]
    fn backreference_to_uncommitted_group_fails() {
        assert!(whole(r"\1(a)", "aa").is_none());
        assert!(whole(r"(a)|b\1", "b").is_none());
    }

    #[test]
    fn empty_loops_terminate() {
        assert!(whole("(a*)*", "b").is_none());
        assert!(whole("(a*)*b", "aab").is_some());
        assert!(whole(r"(a*)*\1", "aa").is_some());
        assert!(whole("(|a)+", "aaa").is_some());
    }

    #[test]
    fn search_reports_leftmost_span() {
        let spans = search("b+", "aabbbc").unwrap();
        assert_eq!(group(&spans, 0), Some((2, 5)));
        assert!(search("z", "aabbbc").is_none());
    }

    #[test]
    fn search_uses_byte_offsets_for_multibyte_text() {
        let spans = search("é+", "caféé!").unwrap();
        assert_eq!(group(&spans, 0), Some((3, 7)));
    }

    #[test]
    fn anchored_search_only_tries_offset_zero() {
        assert!(search("^b", "ab").is_none());
        assert!(search("^a", "ab").is_some());
        let prog = program("^a");
        assert!(Engine::new(&prog, "aa", LIMIT).search(1).unwrap().is_none());
    }

    #[test]
    fn lookahead_is_zero_width() {
        let spans = search(r"hello(?=\sworld)", "hello world").unwrap();
        assert_eq!(group(&spans, 0), Some((0, 5)));
        assert!(search(r"hello(?!\sworld)", "hello world").is_none());
        assert!(search(r"hello(?!\sworld)", "hello universe").is_some());
    }

    #[test]
    fn positive_lookahead_keeps_captures() {
        let spans = search(r"(?=(\d+))\d", "x123").unwrap();
        assert_eq!(group(&spans, 1), Some((1, 4)));
    }

    #[test]
    fn word_boundaries() {
        assert!(search(r"\bcat\b", "a cat sat").is_some());
        assert!(search(r"\bcat\b", "concatenate").is_none());
        assert!(search(r"hello\Bworld", "helloworld").is_some());
    }

    #[test]
    fn exponential_pattern_is_memoized() {
        let n = 30;
        let pattern = format!("{}{}", "a?".repeat(n), "a".repeat(n));
        let text = "a".repeat(n);
        assert!(whole(&pattern, &text).is_some());
        assert!(whole(&pattern, &"a".repeat(n - 1)).is_none());
    }

    #[test]
    fn search_shares_one_step_budget_across_starts() {
        // One step per start offset: no single start gets near the limit.
        let prog = program("[ab]c");
        assert_eq!(prog.first_byte, None);
        let text = "x".repeat(1_000);
        let result = Engine::new(&prog, &text, 100).search(0);
        assert_eq!(result, Err(MatchError::StepLimitExceeded { limit: 100 }));
        let short = "x".repeat(50);
        assert_eq!(Engine::new(&prog, &short, 100).search(0), Ok(None));
    }

    #[test]
    fn keyed_memo_stays_within_budget() {
        let prog = program(r"(a*)*\1b");
        let text = "a".repeat(200);
        let mut engine = Engine::new(&prog, &text, LIMIT);
        engine.visited = Visited::Keyed(KeyedMemo::new(300));
        assert_eq!(
            engine.match_whole(),
            Err(MatchError::MemoLimitExceeded { slots: 300 })
        );
        assert!(engine.steps < LIMIT);
        match &engine.visited {
            Visited::Keyed(memo) => {
                assert!(memo.slots.len() <= 300);
                assert_eq!(memo.slots.len(), memo.index.len() * 3);
            }
            _ => panic!("expected a keyed memo"),
        }
    }

    #[test]
    fn keyed_memo_within_budget_still_matches() {
        let prog = program(r"(a+)b\1");
        let mut engine = Engine::new(&prog, "aabaa", LIMIT);
        engine.visited = Visited::Keyed(KeyedMemo::new(300));
        let spans = engine.match_whole().unwrap().unwrap();
        assert_eq!(group(&spans, 1), Some((0, 2)));
    }

    #[test]
    fn lookahead_memo_is_reused() {
        let prog = program("(?:(?!x).)*");
        let text = "a".repeat(10_000);
        let mut engine = Engine::new(&prog, &text, LIMIT);
        assert!(engine.match_whole().unwrap().is_some());
        assert_eq!(engine.spare.len(), 1);
        match &engine.spare[0] {
            Visited::Dense { bits, touched, .. } => {
                assert!(touched.is_empty());
                assert!(bits.iter().all(|&w| w == 0));
            }
            _ => panic!("expected a dense memo"),
        }
    }

    #[test]
    fn nested_lookaheads_get_their_own_memos() {
        let spans = search("(?=a(?!b))a", "abac").unwrap();
        assert_eq!(group(&spans, 0), Some((2, 3)));
    }

    #[test]
    fn step_limit_fails_closed() {
        let prog = program(r"(a*)*\1b");
        let text = "a".repeat(200);
        let result = Engine::new(&prog, &text, 1_000).match_whole();
        assert_eq!(result, Err(MatchError::StepLimitExceeded { limit: 1_000 }));
    }
}
