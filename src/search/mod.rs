pub mod binary;

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use memmap2::Mmap;

use crate::error::SiftError;
use crate::format;
use crate::regex::{Captures, Regex, Span};
use crate::types::{FileReport, Target};

// Directories skipped by recursive search: VCS internals and dependency trees.
pub(crate) const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
];

/// How selected lines are chosen and rendered.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Select lines that do NOT match.
    pub invert: bool,
    /// Match the whole line instead of searching within it.
    pub line_regexp: bool,
    /// Print each match instead of the whole line.
    pub only_matching: bool,
    /// Stop reading an input after this many selected lines.
    pub max_count: Option<u64>,
    pub line_number: bool,
    pub with_filename: bool,
    pub count: bool,
    /// Print nothing; stop at the first selected line.
    pub quiet: bool,
    pub json: bool,
    pub color: bool,
}

impl SearchOptions {
    fn limit(&self) -> Option<u64> {
        if self.quiet {
            Some(1)
        } else {
            self.max_count
        }
    }

    fn prints_lines(&self) -> bool {
        !self.quiet && !self.count
    }
}

/// Applies one compiled pattern to lines, files and readers.
pub struct Searcher<'a> {
    regex: &'a Regex,
    options: &'a SearchOptions,
}

impl<'a> Searcher<'a> {
    #[must_use]
    pub fn new(regex: &'a Regex, options: &'a SearchOptions) -> Self {
        Self { regex, options }
    }

    /// Decide whether `line` is selected and, if so, render it into `out`.
    pub fn line(
        &self,
        path: Option<&Path>,
        line_number: u64,
        line: &str,
        out: &mut String,
    ) -> bool {
        let opts = self.options;
        let render = opts.prints_lines();
        let needs_all = render && (opts.only_matching || opts.color || opts.json);

        let matches: Vec<Captures<'_>> = if opts.line_regexp {
            self.regex.captures(line).into_iter().collect()
        } else if needs_all {
            self.regex.captures_iter(line).collect()
        } else {
            self.regex.captures_within(line).into_iter().collect()
        };

        let selected = matches.is_empty() == opts.invert;
        if !selected || !render {
            return selected;
        }

        let shown_path = path.filter(|_| opts.with_filename);
        let shown_number = opts.line_number.then_some(line_number);

        if opts.json {
            out.push_str(&format::json_line(path, line_number, line, &matches));
        } else if opts.only_matching && opts.invert {
            // Inverted lines have no matched parts to print.
        } else if opts.only_matching {
            let prefix = format::prefix(shown_path, shown_number, opts.color);
            for m in matches.iter().filter_map(|caps| caps.get(0)) {
                if m.is_empty() {
                    continue;
                }
                out.push_str(&prefix);
                if opts.color {
                    let whole = [Span::new(0, m.len())];
                    out.push_str(&format::highlight(m.as_str(), whole));
                } else {
                    out.push_str(m.as_str());
                }
                out.push('\n');
            }
        } else {
            out.push_str(&format::prefix(shown_path, shown_number, opts.color));
            if opts.color && !opts.invert {
                let spans = matches.iter().filter_map(|caps| caps.get(0)).map(|m| m.span());
                out.push_str(&format::highlight(line, spans));
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        true
    }

    /// Search an in-memory buffer line by line.
    pub fn search_bytes(&self, path: Option<&Path>, buf: &[u8]) -> FileReport {
        let binary = binary::is_binary(buf);
        let limit = self.options.limit();
        let mut report = FileReport {
            path: path.map(Path::to_path_buf),
            binary,
            ..FileReport::default()
        };

        for (idx, raw) in lines(buf).enumerate() {
            if limit.is_some_and(|n| report.selected >= n) {
                break;
            }
            let text = String::from_utf8_lossy(raw);
            if self.line(path, idx as u64 + 1, &text, &mut report.output) {
                report.selected += 1;
            }
        }

        self.finish(&mut report);
        report
    }

    /// Stream from a reader, writing each rendered line as soon as it is
    /// selected. Used for stdin, where input may never end.
    pub fn search_reader<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        path: Option<&Path>,
        out: &mut W,
    ) -> Result<FileReport, SiftError> {
        let label = path.map_or_else(|| PathBuf::from("(standard input)"), Path::to_path_buf);
        let limit = self.options.limit();
        let mut report = FileReport {
            path: path.map(Path::to_path_buf),
            ..FileReport::default()
        };
        let mut raw = Vec::new();
        let mut line_number = 0u64;

        loop {
            if limit.is_some_and(|n| report.selected >= n) {
                break;
            }
            raw.clear();
            let read = reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| SiftError::io(&label, e))?;
            if read == 0 {
                break;
            }
            line_number += 1;
            let text = String::from_utf8_lossy(trim_line_end(&raw));
            if self.line(path, line_number, &text, &mut report.output) {
                report.selected += 1;
            }
            if !report.output.is_empty() {
                out.write_all(report.output.as_bytes())
                    .map_err(SiftError::Output)?;
                report.output.clear();
            }
        }

        self.finish(&mut report);
        out.write_all(report.output.as_bytes())
            .map_err(SiftError::Output)?;
        report.output.clear();
        Ok(report)
    }

    /// Memory-map and search one file.
    pub fn search_file(&self, path: &Path) -> Result<FileReport, SiftError> {
        let meta = fs::metadata(path).map_err(|e| SiftError::io(path, e))?;
        if meta.is_dir() {
            return Err(SiftError::IsDirectory {
                path: path.to_path_buf(),
            });
        }
        // Empty files: mmap of 0 bytes fails on some platforms.
        if meta.len() == 0 {
            return Ok(self.search_bytes(Some(path), &[]));
        }

        let file = fs::File::open(path).map_err(|e| SiftError::io(path, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SiftError::io(path, e))?;
        let report = self.search_bytes(Some(path), &mmap);
        log::debug!(
            "{}: {} bytes, {} selected{}",
            path.display(),
            meta.len(),
            report.selected,
            if report.binary { " (binary)" } else { "" }
        );
        Ok(report)
    }

    // Post-process once every line is seen: counts and binary notices.
    fn finish(&self, report: &mut FileReport) {
        let opts = self.options;
        let shown_path = report.path.as_deref().filter(|_| opts.with_filename);
        if opts.quiet {
            report.output.clear();
        } else if opts.count {
            report.output = format::count_line(shown_path, report.selected, opts.color);
        } else if report.binary && report.selected > 0 && !opts.json {
            report.output = format::binary_notice(report.path.as_deref());
        }
    }
}

/// Split on `\n`, dropping the terminator and any `\r` before it. A final
/// line without a terminator is still yielded; a trailing empty one is not.
pub fn lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut start = 0;
    let mut ends = memchr::memchr_iter(b'\n', buf);
    std::iter::from_fn(move || {
        if start >= buf.len() {
            return None;
        }
        let end = ends.next().unwrap_or(buf.len());
        let line = &buf[start..end];
        start = end + 1;
        Some(trim_line_end(line))
    })
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Compile `--include` globs. Matched against file names, not full paths.
pub fn include_set(globs: &[String]) -> Result<Option<GlobSet>, SiftError> {
    if globs.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let parsed = Glob::new(glob).map_err(|e| SiftError::InvalidGlob {
            glob: glob.clone(),
            reason: e.to_string(),
        })?;
        builder.add(parsed);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| SiftError::InvalidGlob {
            glob: globs.join(","),
            reason: e.to_string(),
        })
}

/// Sequential, name-sorted walk so output order is stable across runs.
/// Hidden files are searched; ignore files are not consulted.
pub(crate) fn walk(root: &Path, include: Option<&GlobSet>) -> (Vec<PathBuf>, Vec<SiftError>) {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                if let Some(name) = entry.file_name().to_str() {
                    return !SKIP_DIRS.contains(&name);
                }
            }
            true
        })
        .build();

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("walk error under {}: {e}", root.display());
                errors.push(SiftError::Io {
                    path: root.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                });
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if let Some(set) = include {
            if !set.is_match(entry.file_name()) {
                continue;
            }
        }
        files.push(entry.into_path());
    }
    (files, errors)
}

/// Expand command-line paths into search targets. `-` is stdin.
/// Directories expand only with `recursive`.
pub fn targets(
    paths: &[PathBuf],
    recursive: bool,
    include: Option<&GlobSet>,
) -> (Vec<Target>, Vec<SiftError>) {
    let mut targets = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        if path.as_os_str() == "-" {
            targets.push(Target::Stdin);
            continue;
        }
        if recursive && path.is_dir() {
            let (files, walk_errors) = walk(path, include);
            targets.extend(files.into_iter().map(Target::File));
            errors.extend(walk_errors);
        } else {
            targets.push(Target::File(path.clone()));
        }
    }
    (targets, errors)
}
