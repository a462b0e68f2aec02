use std::path::PathBuf;

/// Why a pattern was rejected before any matching was attempted.
/// Offsets count chars from the start of the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    UnbalancedParen {
        offset: usize,
    },
    UnbalancedBracket {
        offset: usize,
    },
    MalformedQuantifier {
        offset: usize,
        body: String,
    },
    NothingToRepeat {
        offset: usize,
    },
    RepetitionTooLarge {
        offset: usize,
        count: u32,
        limit: u32,
    },
    ProgramTooLarge {
        size: usize,
        limit: usize,
    },
    InvalidRange {
        offset: usize,
        lo: char,
        hi: char,
    },
    /// `\N` where the pattern has fewer than N capturing groups in total.
    InvalidBackreference {
        offset: usize,
        index: usize,
        groups: usize,
    },
    UnknownEscape {
        offset: usize,
        escape: char,
    },
    TrailingBackslash {
        offset: usize,
    },
    UnsupportedGroup {
        offset: usize,
    },
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnbalancedParen { offset } => {
                write!(f, "unbalanced parenthesis at offset {offset}")
            }
            Self::UnbalancedBracket { offset } => {
                write!(f, "unbalanced bracket at offset {offset}")
            }
            Self::MalformedQuantifier { offset, body } => {
                write!(f, "malformed quantifier {{{body}}} at offset {offset}")
            }
            Self::NothingToRepeat { offset } => {
                write!(f, "quantifier at offset {offset} has nothing to repeat")
            }
            Self::RepetitionTooLarge {
                offset,
                count,
                limit,
            } => write!(
                f,
                "repetition count {count} at offset {offset} exceeds the limit of {limit}"
            ),
            Self::ProgramTooLarge { size, limit } => write!(
                f,
                "compiled pattern needs {size} instructions, limit is {limit}"
            ),
            Self::InvalidRange { offset, lo, hi } => {
                write!(f, "invalid class range {lo}-{hi} at offset {offset}")
            }
            Self::InvalidBackreference {
                offset,
                index,
                groups,
            } => {
                write!(f, "backreference \\{index} at offset {offset} refers to a missing group")?;
                match groups {
                    0 => write!(f, " (pattern has no groups)"),
                    1 => write!(f, " (pattern has 1 group)"),
                    n => write!(f, " (pattern has {n} groups)"),
                }
            }
            Self::UnknownEscape { offset, escape } => {
                write!(f, "unknown escape \\{escape} at offset {offset}")
            }
            Self::TrailingBackslash { offset } => {
                write!(f, "trailing backslash at offset {offset}")
            }
            Self::UnsupportedGroup { offset } => {
                write!(f, "unsupported group syntax at offset {offset}")
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// Run-time failure distinct from "no match": the search ran out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    StepLimitExceeded { limit: usize },
    /// The backreference memo reached its size cap.
    MemoLimitExceeded { slots: usize },
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepLimitExceeded { limit } => {
                write!(f, "match abandoned after {limit} backtracking steps")
            }
            Self::MemoLimitExceeded { slots } => {
                write!(f, "match abandoned after recording {slots} capture states")
            }
        }
    }
}

impl std::error::Error for MatchError {}

/// Every error the driver can produce. Displayed as user-facing messages.
#[derive(Debug)]
pub enum SiftError {
    Pattern(PatternError),
    NotFound { path: PathBuf },
    IsDirectory { path: PathBuf },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidGlob { glob: String, reason: String },
    Output(std::io::Error),
}

impl std::fmt::Display for SiftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(e) => write!(f, "invalid pattern: {e}"),
            Self::NotFound { path } => {
                write!(f, "{}: no such file or directory", path.display())
            }
            Self::IsDirectory { path } => {
                write!(f, "{}: is a directory (use -r to search it)", path.display())
            }
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::InvalidGlob { glob, reason } => {
                write!(f, "invalid glob \"{glob}\": {reason}")
            }
            Self::Output(e) => write!(f, "write error: {e}"),
        }
    }
}

impl std::error::Error for SiftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pattern(e) => Some(e),
            Self::Io { source, .. } | Self::Output(source) => Some(source),
            _ => None,
        }
    }
}

impl From<PatternError> for SiftError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

impl SiftError {
    /// Exit status for the process. 0 and 1 are reserved for match / no match.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        2
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
