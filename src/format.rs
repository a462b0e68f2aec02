use std::fmt::Write;
use std::path::Path;

use crate::regex::{Captures, Span};
use crate::types::{LineRecord, MatchRecord};

const PATH_COLOR: &str = "\x1b[35m";
const LINE_NUMBER_COLOR: &str = "\x1b[32m";
const SEPARATOR_COLOR: &str = "\x1b[36m";
const MATCH_COLOR: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Display form of a path. Strips a leading `./` the walker adds.
pub fn display_path(path: &Path) -> String {
    let shown = path.strip_prefix(".").unwrap_or(path);
    if shown.as_os_str().is_empty() {
        path.display().to_string()
    } else {
        shown.display().to_string()
    }
}

/// `path:` and `N:` prefixes, each only when requested.
pub fn prefix(path: Option<&Path>, line_number: Option<u64>, color: bool) -> String {
    let mut out = String::new();
    if let Some(path) = path {
        push_field(&mut out, &display_path(path), PATH_COLOR, color);
    }
    if let Some(n) = line_number {
        push_field(&mut out, &n.to_string(), LINE_NUMBER_COLOR, color);
    }
    out
}

fn push_field(out: &mut String, field: &str, field_color: &str, color: bool) {
    if color {
        let _ = write!(out, "{field_color}{field}{RESET}{SEPARATOR_COLOR}:{RESET}");
    } else {
        let _ = write!(out, "{field}:");
    }
}

/// Wrap each span of `line` in match color. Spans must be sorted and
/// non-overlapping, as produced by `Regex::captures_iter`.
pub fn highlight(line: &str, spans: impl IntoIterator<Item = Span>) -> String {
    let mut out = String::with_capacity(line.len() + 16);
    let mut last = 0;
    for span in spans {
        if span.is_empty() {
            continue;
        }
        out.push_str(&line[last..span.start]);
        let _ = write!(out, "{MATCH_COLOR}{}{RESET}", &line[span.range()]);
        last = span.end;
    }
    out.push_str(&line[last..]);
    out
}

/// `path:count` (or bare count) line for `-c`.
pub fn count_line(path: Option<&Path>, count: u64, color: bool) -> String {
    format!("{}{count}\n", prefix(path, None, color))
}

pub fn binary_notice(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("Binary file {} matches\n", display_path(path)),
        None => "Binary file (standard input) matches\n".to_string(),
    }
}

/// One JSON object per line, newline-terminated.
pub fn json_line(
    path: Option<&Path>,
    line_number: u64,
    line: &str,
    matches: &[Captures<'_>],
) -> String {
    let record = LineRecord {
        path: path.map(display_path),
        line_number,
        text: line,
        matches: matches
            .iter()
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(MatchRecord {
                    text: whole.as_str(),
                    span: whole.span(),
                    groups: caps.spans().iter().skip(1).copied().collect(),
                })
            })
            .collect(),
    };
    let mut out = serde_json::to_string(&record).expect("line records are always serializable");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::Regex;
    use std::path::PathBuf;

    #[test]
    fn plain_prefixes() {
        let path = PathBuf::from("src/lib.rs");
        assert_eq!(prefix(Some(&path), Some(12), false), "src/lib.rs:12:");
        assert_eq!(prefix(None, Some(3), false), "3:");
        assert_eq!(prefix(Some(&path), None, false), "src/lib.rs:");
        assert_eq!(prefix(None, None, false), "");
    }

    #[test]
    fn walker_prefix_is_stripped() {
        assert_eq!(display_path(Path::new("./a/b.txt")), "a/b.txt");
        assert_eq!(display_path(Path::new(".")), ".");
    }

    #[test]
    fn colored_prefix_wraps_fields() {
        let out = prefix(None, Some(7), true);
        assert_eq!(out, "\x1b[32m7\x1b[0m\x1b[36m:\x1b[0m");
    }

    #[test]
    fn highlight_wraps_each_span() {
        let out = highlight("a1b22", [Span::new(1, 2), Span::new(3, 5)]);
        assert_eq!(out, "a\x1b[1;31m1\x1b[0mb\x1b[1;31m22\x1b[0m");
    }

    #[test]
    fn highlight_skips_empty_spans() {
        assert_eq!(highlight("abc", [Span::new(1, 1)]), "abc");
    }

    #[test]
    fn json_record_carries_groups() {
        let re = Regex::new(r"(\d)(x)?").unwrap();
        let caps: Vec<_> = re.captures_iter("a1").collect();
        let out = json_line(Some(Path::new("f.txt")), 4, "a1", &caps);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["path"], "f.txt");
        assert_eq!(value["line_number"], 4);
        assert_eq!(value["matches"][0]["text"], "1");
        assert_eq!(value["matches"][0]["span"]["start"], 1);
        assert_eq!(value["matches"][0]["groups"][0]["end"], 2);
        assert!(value["matches"][0]["groups"][1].is_null());
    }

    #[test]
    fn json_omits_missing_path() {
        let out = json_line(None, 1, "x", &[]);
        assert_eq!(out, "{\"line_number\":1,\"text\":\"x\",\"matches\":[]}\n");
    }
}
