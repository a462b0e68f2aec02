use crate::error::PatternError;

/// Read-only view over a pattern with delimiter lookahead.
///
/// Indices are char positions, not byte offsets. Escaped characters (`\(`,
/// `\]`, ...) never count as delimiters, and nothing inside a bracket class
/// counts towards parenthesis depth.
#[derive(Debug, Clone, Copy)]
pub struct PatternCursor<'p> {
    chars: &'p [char],
}

impl<'p> PatternCursor<'p> {
    #[must_use]
    pub fn new(chars: &'p [char]) -> Self {
        Self { chars }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).copied()
    }

    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> &'p [char] {
        &self.chars[start..end]
    }

    /// Index of the delimiter that closes the `(`, `[` or `{` at `open`.
    /// `None` when `open` is not an opening delimiter or the pattern ends first.
    #[must_use]
    pub fn closing(&self, open: usize) -> Option<usize> {
        match self.get(open)? {
            '(' => self.closing_paren(open),
            '[' => self.closing_bracket(open),
            '{' => self.closing_brace(open),
            _ => None,
        }
    }

    fn closing_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                '[' => i = self.closing_bracket(i)?,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    // Classes do not nest: the first unescaped `]` closes.
    fn closing_bracket(&self, open: usize) -> Option<usize> {
        let mut i = open + 1;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                ']' => return Some(i),
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn closing_brace(&self, open: usize) -> Option<usize> {
        self.chars[open + 1..]
            .iter()
            .position(|&c| c == '}')
            .map(|p| open + 1 + p)
    }

    /// Positions of every `|` in `start..end` that sits outside any group or class.
    #[must_use]
    pub fn top_level_bars(&self, start: usize, end: usize) -> Vec<usize> {
        let mut bars = Vec::new();
        let mut depth = 0usize;
        let mut i = start;
        while i < end {
            match self.chars[i] {
                '\\' => i += 1,
                '[' => match self.closing_bracket(i) {
                    Some(close) => i = close,
                    None => return bars,
                },
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '|' if depth == 0 => bars.push(i),
                _ => {}
            }
            i += 1;
        }
        bars
    }

    /// Upfront balance check: a stack of open `(` / `[`, popped and
    /// type-checked on every close. Runs before any matching is attempted.
    pub fn validate(&self) -> Result<(), PatternError> {
        let mut open_parens: Vec<usize> = Vec::new();
        let mut i = 0;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                '[' => match self.closing_bracket(i) {
                    Some(close) => i = close,
                    None => return Err(PatternError::UnbalancedBracket { offset: i }),
                },
                ']' => return Err(PatternError::UnbalancedBracket { offset: i }),
                '(' => open_parens.push(i),
                ')' => {
                    if open_parens.pop().is_none() {
                        return Err(PatternError::UnbalancedParen { offset: i });
                    }
                }
                _ => {}
            }
            i += 1;
        }
        match open_parens.pop() {
            Some(offset) => Err(PatternError::UnbalancedParen { offset }),
            None => Ok(()),
        }
    }
}
