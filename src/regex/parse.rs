use crate::error::PatternError;

use super::atom::{Atom, CharClass, ClassItem, EscapeClass};
use super::cursor::PatternCursor;

/// Largest bound accepted in `{m}`, `{m,}` and `{m,n}`.
pub const MAX_REPEAT: u32 = 1000;

/// Zero-width position tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    Start,
    End,
    WordBoundary,
    NotWordBoundary,
}

/// One node of the parsed pattern. Every pattern feature is a variant
/// here; there is no per-feature matcher type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Empty,
    Atom(Atom),
    Assert(Assertion),
    Group { index: usize, node: Box<Node> },
    NonCapturing(Box<Node>),
    LookAhead { negated: bool, node: Box<Node> },
    Backref(usize),
    Concat(Vec<Node>),
    Alternate(Vec<Node>),
    Repeat {
        node: Box<Node>,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    },
}

impl Node {
    fn is_repeatable(&self) -> bool {
        !matches!(self, Self::Assert(_) | Self::LookAhead { .. })
    }
}

/// Parsed pattern plus the number of capturing groups it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    pub root: Node,
    pub groups: usize,
}

/// Validate delimiter balance, then parse. Nothing is matched here.
pub fn parse(pattern: &str) -> Result<Ast, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let cursor = PatternCursor::new(&chars);
    cursor.validate()?;

    let mut parser = Parser {
        cursor,
        groups: 0,
        backrefs: Vec::new(),
    };
    let root = parser.alternation(0, chars.len())?;

    if let Some(&(offset, index)) = parser
        .backrefs
        .iter()
        .find(|&&(_, index)| index > parser.groups)
    {
        return Err(PatternError::InvalidBackreference {
            offset,
            index,
            groups: parser.groups,
        });
    }

    Ok(Ast {
        root,
        groups: parser.groups,
    })
}

struct Parser<'p> {
    cursor: PatternCursor<'p>,
    groups: usize,
    /// `(offset, index)` of every `\N` seen, checked once all groups are known.
    backrefs: Vec<(usize, usize)>,
}

struct Quantifier {
    min: u32,
    max: Option<u32>,
    greedy: bool,
    next: usize,
}

impl Parser<'_> {
    fn alternation(&mut self, start: usize, end: usize) -> Result<Node, PatternError> {
        let bars = self.cursor.top_level_bars(start, end);
        if bars.is_empty() {
            return self.sequence(start, end);
        }
        let mut branches = Vec::with_capacity(bars.len() + 1);
        let mut from = start;
        for bar in bars {
            branches.push(self.sequence(from, bar)?);
            from = bar + 1;
        }
        branches.push(self.sequence(from, end)?);
        Ok(Node::Alternate(branches))
    }

    fn sequence(&mut self, start: usize, end: usize) -> Result<Node, PatternError> {
        let mut items = Vec::new();
        let mut i = start;
        while i < end {
            let (mut node, next) = self.term(i)?;
            i = next;
            if let Some(q) = self.quantifier(i, end)? {
                if !node.is_repeatable() {
                    return Err(PatternError::NothingToRepeat { offset: i });
                }
                node = Node::Repeat {
                    node: Box::new(node),
                    min: q.min,
                    max: q.max,
                    greedy: q.greedy,
                };
                i = q.next;
            }
            items.push(node);
        }
        Ok(match items.len() {
            0 => Node::Empty,
            1 => items.pop().unwrap_or(Node::Empty),
            _ => Node::Concat(items),
        })
    }

    /// Parse the single term at `i`, returning it and the index after it.
    fn term(&mut self, i: usize) -> Result<(Node, usize), PatternError> {
        let c = self.char_at(i);
        let node = match c {
            '(' => {
                let close = self
                    .cursor
                    .closing(i)
                    .ok_or(PatternError::UnbalancedParen { offset: i })?;
                return Ok((self.group(i, close)?, close + 1));
            }
            '[' => {
                let close = self
                    .cursor
                    .closing(i)
                    .ok_or(PatternError::UnbalancedBracket { offset: i })?;
                let class = self.class(i + 1, close)?;
                return Ok((Node::Atom(Atom::Class(class)), close + 1));
            }
            '\\' => return self.escape(i),
            ')' => return Err(PatternError::UnbalancedParen { offset: i }),
            ']' => return Err(PatternError::UnbalancedBracket { offset: i }),
            '*' | '+' | '?' | '{' => return Err(PatternError::NothingToRepeat { offset: i }),
            '.' => Node::Atom(Atom::Any),
            '^' => Node::Assert(Assertion::Start),
            '$' => Node::Assert(Assertion::End),
            c => Node::Atom(Atom::Literal(c)),
        };
        Ok((node, i + 1))
    }

    fn group(&mut self, open: usize, close: usize) -> Result<Node, PatternError> {
        if self.cursor.get(open + 1) != Some('?') {
            self.groups += 1;
            let index = self.groups;
            let node = self.alternation(open + 1, close)?;
            return Ok(Node::Group {
                index,
                node: Box::new(node),
            });
        }
        let body = open + 3;
        if body > close {
            return Err(PatternError::UnsupportedGroup { offset: open });
        }
        match self.cursor.get(open + 2) {
            Some(':') => Ok(Node::NonCapturing(Box::new(self.alternation(body, close)?))),
            Some('=') => Ok(Node::LookAhead {
                negated: false,
                node: Box::new(self.alternation(body, close)?),
            }),
            Some('!') => Ok(Node::LookAhead {
                negated: true,
                node: Box::new(self.alternation(body, close)?),
            }),
            _ => Err(PatternError::UnsupportedGroup { offset: open }),
        }
    }

    fn escape(&mut self, i: usize) -> Result<(Node, usize), PatternError> {
        let c = self
            .cursor
            .get(i + 1)
            .ok_or(PatternError::TrailingBackslash { offset: i })?;
        let node = match c {
            'b' => Node::Assert(Assertion::WordBoundary),
            'B' => Node::Assert(Assertion::NotWordBoundary),
            '1'..='9' => {
                let index = c as usize - '0' as usize;
                self.backrefs.push((i, index));
                Node::Backref(index)
            }
            _ => match EscapeClass::from_letter(c) {
                Some((class, negated)) => Node::Atom(Atom::Escape { class, negated }),
                None => Node::Atom(Atom::Literal(escaped_literal(c, i)?)),
            },
        };
        Ok((node, i + 2))
    }

    /// `*`, `+`, `?` or `{...}` at `i`, with an optional lazy `?` suffix.
    fn quantifier(&self, i: usize, end: usize) -> Result<Option<Quantifier>, PatternError> {
        if i >= end {
            return Ok(None);
        }
        let (min, max, after) = match self.char_at(i) {
            '*' => (0, None, i + 1),
            '+' => (1, None, i + 1),
            '?' => (0, Some(1), i + 1),
            '{' => {
                let close = match self.cursor.closing(i) {
                    Some(close) if close < end => close,
                    _ => {
                        let body: String = self.cursor.slice(i + 1, end).iter().collect();
                        return Err(PatternError::MalformedQuantifier { offset: i, body });
                    }
                };
                let (min, max) = parse_bounds(self.cursor.slice(i + 1, close), i)?;
                (min, max, close + 1)
            }
            _ => return Ok(None),
        };
        let lazy = after < end && self.char_at(after) == '?';
        Ok(Some(Quantifier {
            min,
            max,
            greedy: !lazy,
            next: if lazy { after + 1 } else { after },
        }))
    }

    fn class(&self, start: usize, end: usize) -> Result<CharClass, PatternError> {
        let mut i = start;
        let negated = i < end && self.char_at(i) == '^';
        if negated {
            i += 1;
        }
        let mut items = Vec::new();
        while i < end {
            let (item, next) = self.class_member(i)?;
            i = next;
            // `-` between two members is a range; at either edge it is literal.
            let is_range = i + 1 < end && self.char_at(i) == '-';
            match item {
                ClassItem::Char(lo) if is_range => {
                    let (hi, next) = self.class_member(i + 1)?;
                    let ClassItem::Char(hi) = hi else {
                        return Err(PatternError::InvalidRange {
                            offset: i,
                            lo,
                            hi: self.char_at(i + 2),
                        });
                    };
                    if lo > hi {
                        return Err(PatternError::InvalidRange { offset: i, lo, hi });
                    }
                    items.push(ClassItem::Range(lo, hi));
                    i = next;
                }
                item => items.push(item),
            }
        }
        Ok(CharClass { items, negated })
    }

    fn class_member(&self, i: usize) -> Result<(ClassItem, usize), PatternError> {
        let c = self.char_at(i);
        if c != '\\' {
            return Ok((ClassItem::Char(c), i + 1));
        }
        let escaped = self
            .cursor
            .get(i + 1)
            .ok_or(PatternError::TrailingBackslash { offset: i })?;
        let item = match EscapeClass::from_letter(escaped) {
            Some((class, negated)) => ClassItem::Escape { class, negated },
            None => ClassItem::Char(escaped_literal(escaped, i)?),
        };
        Ok((item, i + 2))
    }

    fn char_at(&self, i: usize) -> char {
        self.cursor.get(i).unwrap_or('\0')
    }
}

/// The literal a `\c` escape stands for. Letters and digits without a
/// defined meaning are rejected so they stay free for future syntax.
fn escaped_literal(c: char, offset: usize) -> Result<char, PatternError> {
    match c {
        't' => Ok('\t'),
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        c if c.is_alphanumeric() => Err(PatternError::UnknownEscape { offset, escape: c }),
        c => Ok(c),
    }
}

/// Body of `{...}`: `m`, `m,` or `m,n`.
fn parse_bounds(body: &[char], offset: usize) -> Result<(u32, Option<u32>), PatternError> {
    let text: String = body.iter().collect();
    let malformed = || PatternError::MalformedQuantifier {
        offset,
        body: text.clone(),
    };
    let number = |s: &str| -> Result<u32, PatternError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let n = s.parse::<u32>().unwrap_or(u32::MAX);
        if n > MAX_REPEAT {
            return Err(PatternError::RepetitionTooLarge {
                offset,
                count: n,
                limit: MAX_REPEAT,
            });
        }
        Ok(n)
    };

    let (min, max) = match text.split_once(',') {
        None => {
            let n = number(&text)?;
            (n, Some(n))
        }
        Some((lo, "")) => (number(lo)?, None),
        Some((lo, hi)) => (number(lo)?, Some(number(hi)?)),
    };
    if max.is_some_and(|max| max < min) {
        return Err(malformed());
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(c: char) -> Node {
        Node::Atom(Atom::Literal(c))
    }

    #[test]
    fn literal_sequence() {
        let ast = parse("ab").unwrap();
        assert_eq!(ast.root, Node::Concat(vec![lit('a'), lit('b')]));
        assert_eq!(ast.groups, 0);
    }

    #[test]
    fn empty_pattern() {
        assert_eq!(parse("").unwrap().root, Node::Empty);
    }

    #[test]
    fn quantifiers_and_laziness() {
        let ast = parse("a*?").unwrap();
        assert_eq!(
            ast.root,
            Node::Repeat {
                node: Box::new(lit('a')),
                min: 0,
                max: None,
                greedy: false,
            }
        );
        let ast = parse("a{2,4}").unwrap();
        assert_eq!(
            ast.root,
            Node::Repeat {
                node: Box::new(lit('a')),
                min: 2,
                max: Some(4),
                greedy: true,
            }
        );
        let ast = parse("a{3,}?").unwrap();
        assert!(matches!(
            ast.root,
            Node::Repeat {
                min: 3,
                max: None,
                greedy: false,
                ..
            }
        ));
    }

    #[test]
    fn groups_are_numbered_by_open_paren() {
        let ast = parse("((a)(b))(?:c)(d)").unwrap();
        assert_eq!(ast.groups, 4);
        let Node::Concat(items) = ast.root else {
            panic!("expected concat");
        };
        let Node::Group { index, node } = &items[0] else {
            panic!("expected group");
        };
        assert_eq!(*index, 1);
        let Node::Concat(inner) = node.as_ref() else {
            panic!("expected inner concat");
        };
        assert!(matches!(inner[0], Node::Group { index: 2, .. }));
        assert!(matches!(inner[1], Node::Group { index: 3, .. }));
        assert!(matches!(items[1], Node::NonCapturing(_)));
        assert!(matches!(items[2], Node::Group { index: 4, .. }));
    }

    #[test]
    fn top_level_alternation() {
        let ast = parse("a|b|(c|d)").unwrap();
        let Node::Alternate(branches) = ast.root else {
            panic!("expected alternation");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0], lit('a'));
    }

    #[test]
    fn class_with_ranges_and_edges() {
        let ast = parse("[-a-cx-]").unwrap();
        let Node::Atom(Atom::Class(class)) = ast.root else {
            panic!("expected class");
        };
        assert!(!class.negated);
        assert_eq!(
            class.items,
            vec![
                ClassItem::Char('-'),
                ClassItem::Range('a', 'c'),
                ClassItem::Char('x'),
                ClassItem::Char('-'),
            ]
        );
    }

    #[test]
    fn escapes() {
        assert_eq!(
            parse(r"\d").unwrap().root,
            Node::Atom(Atom::Escape {
                class: EscapeClass::Digit,
                negated: false
            })
        );
        assert_eq!(parse(r"\.").unwrap().root, lit('.'));
        assert_eq!(parse(r"\t").unwrap().root, lit('\t'));
        assert_eq!(
            parse(r"\b").unwrap().root,
            Node::Assert(Assertion::WordBoundary)
        );
    }

    #[test]
    fn lookahead_groups() {
        assert!(matches!(
            parse("(?=a)").unwrap().root,
            Node::LookAhead { negated: false, .. }
        ));
        assert!(matches!(
            parse("(?!a)").unwrap().root,
            Node::LookAhead { negated: true, .. }
        ));
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(matches!(
            parse("(abc"),
            Err(PatternError::UnbalancedParen { .. })
        ));
        assert!(matches!(
            parse("[abc"),
            Err(PatternError::UnbalancedBracket { .. })
        ));
    }

    #[test]
    fn rejects_malformed_quantifiers() {
        for pattern in ["a{2,", "a{,}", "a{}", "a{x}", "a{,3}", "a{4,2}"] {
            assert!(
                matches!(parse(pattern), Err(PatternError::MalformedQuantifier { .. })),
                "{pattern} should be malformed"
            );
        }
        assert!(matches!(
            parse("a{1001}"),
            Err(PatternError::RepetitionTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_nothing_to_repeat() {
        for pattern in ["*", "*+?", "a**", "^*", "(?=a)+", "{2}"] {
            assert!(
                matches!(parse(pattern), Err(PatternError::NothingToRepeat { .. })),
                "{pattern} should have nothing to repeat"
            );
        }
    }

    #[test]
    fn backreference_bounds() {
        assert!(parse(r"(a)\1").is_ok());
        assert!(parse(r"\1(a)").is_ok());
        assert_eq!(
            parse(r"\2(a)"),
            Err(PatternError::InvalidBackreference {
                offset: 0,
                index: 2,
                groups: 1
            })
        );
        assert!(matches!(
            parse(r"abc\1"),
            Err(PatternError::InvalidBackreference { groups: 0, .. })
        ));
    }

    #[test]
    fn rejects_bad_escapes_and_ranges() {
        assert!(matches!(
            parse(r"\q"),
            Err(PatternError::UnknownEscape { escape: 'q', .. })
        ));
        assert!(matches!(
            parse(r"\p{Han}"),
            Err(PatternError::UnknownEscape { escape: 'p', .. })
        ));
        assert!(matches!(
            parse(r"ab\"),
            Err(PatternError::TrailingBackslash { offset: 2 })
        ));
        assert!(matches!(
            parse("[z-a]"),
            Err(PatternError::InvalidRange { .. })
        ));
        assert!(matches!(
            parse("(?<n>a)"),
            Err(PatternError::UnsupportedGroup { .. })
        ));
    }
}
