use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;

use sift::{Config, SearchOptions, DEFAULT_STEP_LIMIT};

/// sift: grep with backreferences and capture groups.
/// Prints lines of each input that match PATTERN.
#[derive(Parser)]
#[command(
    name = "sift",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SIFT_BUILD_COMMIT"), ")"),
    about
)]
struct Cli {
    /// Pattern to search for.
    #[arg(
        short = 'E',
        long = "regexp",
        value_name = "PATTERN",
        required_unless_present = "completions"
    )]
    pattern: Option<String>,

    /// Files or directories to search. `-` or nothing reads stdin.
    paths: Vec<PathBuf>,

    /// Search directories recursively.
    #[arg(short, long)]
    recursive: bool,

    /// Select lines that do not match.
    #[arg(short = 'v', long)]
    invert_match: bool,

    /// Pattern must match the whole line.
    #[arg(short = 'x', long)]
    line_regexp: bool,

    /// Print only the matched parts of each line.
    #[arg(short, long)]
    only_matching: bool,

    /// Prefix each line with its 1-based line number.
    #[arg(short = 'n', long)]
    line_number: bool,

    /// Print a count of selected lines per input.
    #[arg(short, long)]
    count: bool,

    /// No output; exit status only.
    #[arg(short, long)]
    quiet: bool,

    /// Stop after NUM selected lines per input.
    #[arg(short = 'm', long, value_name = "NUM")]
    max_count: Option<u64>,

    /// Always prefix lines with the file name.
    #[arg(short = 'H', long)]
    with_filename: bool,

    /// Only search files whose name matches GLOB (repeatable).
    #[arg(long, value_name = "GLOB")]
    include: Vec<String>,

    /// One JSON object per selected line.
    #[arg(long)]
    json: bool,

    /// Highlight matches and prefixes.
    #[arg(long, value_enum, value_name = "WHEN", default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Give up on a line after this many engine steps.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_STEP_LIMIT)]
    step_limit: usize,

    /// Print shell completions for the given shell.
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "sift", &mut io::stdout());
        return;
    }

    let Some(pattern) = cli.pattern else {
        eprintln!("usage: sift -E <PATTERN> [PATH]...");
        process::exit(2);
    };

    let config = Config {
        pattern,
        paths: cli.paths,
        recursive: cli.recursive,
        include: cli.include,
        step_limit: cli.step_limit,
        options: SearchOptions {
            invert: cli.invert_match,
            line_regexp: cli.line_regexp,
            only_matching: cli.only_matching,
            max_count: cli.max_count,
            line_number: cli.line_number,
            with_filename: cli.with_filename,
            count: cli.count,
            quiet: cli.quiet,
            // JSON output is never colored.
            color: !cli.json && cli.color.enabled(),
            json: cli.json,
        },
    };

    let stdin = io::stdin().lock();
    let mut stdout = io::BufWriter::new(io::stdout().lock());

    match sift::run(&config, stdin, &mut stdout) {
        Ok(summary) => {
            for e in &summary.errors {
                eprintln!("sift: {e}");
            }
            drop(stdout);
            process::exit(summary.exit_code());
        }
        Err(sift::SiftError::Output(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            process::exit(0);
        }
        Err(e) => {
            eprintln!("sift: {e}");
            process::exit(e.exit_code());
        }
    }
}
