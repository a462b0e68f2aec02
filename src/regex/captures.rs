use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Range;

use serde::Serialize;

/// Half-open byte span `[start, end)` into the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Position in the undo log. Rolling back to a token retracts every
/// change made after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(usize);

#[derive(Debug, Clone, Copy)]
enum Undo {
    Open { group: usize, prev: Option<usize> },
    Commit { group: usize, prev: Option<Span> },
}

/// Committed group spans plus the pending start of every group currently
/// being matched. Changes go through an undo log so backtracking can
/// retract them in LIFO order.
///
/// Groups are numbered from 1 by the position of their opening parenthesis;
/// group 0 (the whole match) is not stored here.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    opens: Vec<Option<usize>>,
    spans: Vec<Option<Span>>,
    log: Vec<Undo>,
}

impl CaptureStore {
    #[must_use]
    pub fn new(groups: usize) -> Self {
        Self {
            opens: vec![None; groups],
            spans: vec![None; groups],
            log: Vec::new(),
        }
    }

    #[must_use]
    pub fn groups(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn checkpoint(&self) -> Token {
        Token(self.log.len())
    }

    /// Record where `group` started on the current path.
    pub fn open(&mut self, group: usize, at: usize) -> Token {
        let token = self.checkpoint();
        let slot = &mut self.opens[group - 1];
        self.log.push(Undo::Open { group, prev: *slot });
        *slot = Some(at);
        token
    }

    /// Commit `group` as ending at `at`. A group that was never opened
    /// on this path leaves the store untouched.
    pub fn close(&mut self, group: usize, at: usize) -> Token {
        let token = self.checkpoint();
        if let Some(start) = self.opens[group - 1] {
            self.commit(group, Span::new(start, at));
        }
        token
    }

    pub fn commit(&mut self, group: usize, span: Span) -> Token {
        let token = self.checkpoint();
        let slot = &mut self.spans[group - 1];
        self.log.push(Undo::Commit { group, prev: *slot });
        *slot = Some(span);
        token
    }

    pub fn rollback(&mut self, token: Token) {
        while self.log.len() > token.0 {
            match self.log.pop() {
                Some(Undo::Open { group, prev }) => self.opens[group - 1] = prev,
                Some(Undo::Commit { group, prev }) => self.spans[group - 1] = prev,
                None => break,
            }
        }
    }

    /// The span committed for 1-based `group`, or `None` if that group has
    /// not matched on the current path.
    #[must_use]
    pub fn get(&self, group: usize) -> Option<Span> {
        group
            .checked_sub(1)
            .and_then(|i| self.spans.get(i))
            .copied()
            .flatten()
    }

    /// Committed spans; index `i` holds group `i + 1`.
    #[must_use]
    pub fn spans(&self) -> &[Option<Span>] {
        &self.spans
    }

    /// Number of values yielded by [`Self::slots`].
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.opens.len() * 3
    }

    /// Flat view of the whole capture state: pending starts, then committed
    /// `(start, end)` pairs. Two stores with equal slots behave identically.
    pub fn slots(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.opens.iter().copied().chain(
            self.spans
                .iter()
                .flat_map(|s| [s.map(|s| s.start), s.map(|s| s.end)]),
        )
    }

    /// Hash of [`Self::slots`], computed without allocating.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for slot in self.slots() {
            slot.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_before_commit_is_undefined() {
        let store = CaptureStore::new(2);
        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), None);
        assert_eq!(store.get(0), None);
        assert_eq!(store.get(3), None);
    }

    #[test]
    fn open_then_close_commits_span() {
        let mut store = CaptureStore::new(1);
        store.open(1, 2);
        store.close(1, 5);
        assert_eq!(store.get(1), Some(Span::new(2, 5)));
    }

    #[test]
    fn close_without_open_is_ignored() {
        let mut store = CaptureStore::new(1);
        store.close(1, 5);
        assert_eq!(store.get(1), None);
    }

    #[test]
    fn rollback_restores_previous_span() {
        let mut store = CaptureStore::new(1);
        store.commit(1, Span::new(0, 1));
        let token = store.commit(1, Span::new(0, 3));
        assert_eq!(store.get(1), Some(Span::new(0, 3)));
        store.rollback(token);
        assert_eq!(store.get(1), Some(Span::new(0, 1)));
    }

    #[test]
    fn rollback_is_lifo_across_groups() {
        let mut store = CaptureStore::new(2);
        let outer = store.checkpoint();
        store.open(1, 0);
        store.open(2, 0);
        store.close(2, 2);
        let inner = store.checkpoint();
        store.close(1, 4);
        assert_eq!(store.get(1), Some(Span::new(0, 4)));

        store.rollback(inner);
        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), Some(Span::new(0, 2)));

        store.rollback(outer);
        assert_eq!(store.get(2), None);
        assert!(store.slots().eq(CaptureStore::new(2).slots()));
        assert_eq!(store.fingerprint(), CaptureStore::new(2).fingerprint());
    }

    #[test]
    fn slots_distinguish_capture_values() {
        let mut a = CaptureStore::new(1);
        let mut b = CaptureStore::new(1);
        a.commit(1, Span::new(0, 1));
        b.commit(1, Span::new(0, 2));
        assert!(!a.slots().eq(b.slots()));
        assert_ne!(a.fingerprint(), b.fingerprint());
        b.commit(1, Span::new(0, 1));
        assert!(a.slots().eq(b.slots()));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.slots().count(), a.slot_count());
    }
}
