use unicode_general_category::{GeneralCategory, get_general_category};

/// `\d`, `\w`, `\s` and their uppercase negations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeClass {
    Digit,
    Word,
    Space,
}

impl EscapeClass {
    #[must_use]
    pub fn from_letter(c: char) -> Option<(Self, bool)> {
        match c {
            'd' => Some((Self::Digit, false)),
            'w' => Some((Self::Word, false)),
            's' => Some((Self::Space, false)),
            'D' => Some((Self::Digit, true)),
            'W' => Some((Self::Word, true)),
            'S' => Some((Self::Space, true)),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(self, c: char) -> bool {
        match self {
            Self::Digit => is_digit(c),
            Self::Word => is_word_char(c),
            Self::Space => c.is_whitespace(),
        }
    }
}

/// Decimal digits: general category `Nd`. Covers ASCII, Arabic-Indic and
/// full-width digits but not fractions, superscripts or numeral letters.
#[must_use]
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || get_general_category(c) == GeneralCategory::DecimalNumber
}

/// Letter (`L*`), decimal digit or underscore.
#[must_use]
pub fn is_word_char(c: char) -> bool {
    if c.is_ascii() {
        return c == '_' || c.is_ascii_alphanumeric();
    }
    matches!(
        get_general_category(c),
        GeneralCategory::UppercaseLetter
            | GeneralCategory::LowercaseLetter
            | GeneralCategory::TitlecaseLetter
            | GeneralCategory::ModifierLetter
            | GeneralCategory::OtherLetter
            | GeneralCategory::DecimalNumber
    )
}

/// One member of a bracket class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    /// Inclusive, by codepoint.
    Range(char, char),
    Escape { class: EscapeClass, negated: bool },
}

impl ClassItem {
    fn contains(&self, c: char) -> bool {
        match *self {
            Self::Char(m) => m == c,
            Self::Range(lo, hi) => (lo..=hi).contains(&c),
            Self::Escape { class, negated } => class.contains(c) != negated,
        }
    }
}

/// `[...]` with optional leading `^`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub items: Vec<ClassItem>,
    pub negated: bool,
}

impl CharClass {
    #[must_use]
    pub fn contains(&self, c: char) -> bool {
        self.items.iter().any(|item| item.contains(c)) != self.negated
    }
}

/// Everything that consumes exactly one character of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Literal(char),
    Any,
    Escape { class: EscapeClass, negated: bool },
    Class(CharClass),
}

impl Atom {
    /// Pure per-character test, no state and no backtracking.
    #[must_use]
    pub fn matches(&self, c: char) -> bool {
        match self {
            Self::Literal(m) => *m == c,
            Self::Any => true,
            Self::Escape { class, negated } => class.contains(c) != *negated,
            Self::Class(class) => class.contains(c),
        }
    }
}
