use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use srccompare_common::{
    ensure_config, load_config, load_config_from, CompareError, ComparisonMode, ComparisonResult,
};
use srccompare_core::{archive_input_for_path, ComparisonEngine, ComparisonRequest};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "srccompare")]
#[command(author = "SrcCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Compare Java source and class bundles file by file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two archives (jar, war, zip) or single .java/.class files
    Compare {
        /// Original bundle
        left: PathBuf,

        /// Revised bundle
        right: PathBuf,

        /// What each side contains
        #[arg(short, long, value_enum, default_value_t = Mode::SourceVsSource)]
        mode: Mode,

        /// Lines of context around each change (negative values count as 0)
        #[arg(short = 'U', long = "context", allow_negative_numbers = true)]
        context: Option<i32>,

        /// Also list files that did not change
        #[arg(long)]
        include_unchanged: bool,

        /// Decompile worker count (0 uses all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,

        /// Load configuration from this file instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a default configuration file if none exists
    InitConfig {
        /// Place the file next to the executable
        #[arg(long)]
        portable: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    ClassVsSource,
    ClassVsClass,
    SourceVsSource,
}

impl From<Mode> for ComparisonMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::ClassVsSource => ComparisonMode::ClassVsSource,
            Mode::ClassVsClass => ComparisonMode::ClassVsClass,
            Mode::SourceVsSource => ComparisonMode::SourceVsSource,
        }
    }
}

struct CompareArgs {
    left: PathBuf,
    right: PathBuf,
    mode: Mode,
    context: Option<i32>,
    include_unchanged: bool,
    threads: Option<usize>,
    json: bool,
    no_color: bool,
    config: Option<PathBuf>,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            left,
            right,
            mode,
            context,
            include_unchanged,
            threads,
            json,
            no_color,
            config,
        } => {
            let args = CompareArgs {
                left,
                right,
                mode,
                context,
                include_unchanged,
                threads,
                json,
                no_color,
                config,
            };
            if let Err(e) = run_compare(&args) {
                report_failure(&e, args.json);
                std::process::exit(1);
            }
        }
        Commands::InitConfig { portable } => {
            if let Err(e) = run_init_config(portable) {
                report_failure(&e, false);
                std::process::exit(1);
            }
        }
    }
}

#[derive(Serialize)]
struct JsonError<'a> {
    error: JsonErrorBody<'a>,
}

#[derive(Serialize)]
struct JsonErrorBody<'a> {
    kind: &'a str,
    message: String,
}

fn error_kind(e: &anyhow::Error) -> &'static str {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<CompareError>())
        .map(CompareError::kind)
        .unwrap_or("InternalError")
}

fn report_failure(e: &anyhow::Error, json: bool) {
    let kind = error_kind(e);
    if json {
        let body = JsonError {
            error: JsonErrorBody {
                kind,
                message: format!("{:#}", e),
            },
        };
        match serde_json::to_string_pretty(&body) {
            Ok(output) => println!("{output}"),
            Err(_) => error!("{}: {:#}", kind, e),
        }
    } else {
        error!("{}: {:#}", kind, e);
    }
}

fn run_init_config(portable: bool) -> anyhow::Result<()> {
    let loaded = ensure_config(portable)?;
    if loaded.exists {
        println!("Configuration already exists: {}", loaded.path.display());
    } else {
        println!("Wrote default configuration: {}", loaded.path.display());
    }
    Ok(())
}

fn run_compare(args: &CompareArgs) -> anyhow::Result<()> {
    let loaded = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config(false)?,
    };
    if loaded.exists {
        info!("Using configuration {}", loaded.path.display());
    }

    let mut config = loaded.config;
    if let Some(threads) = args.threads {
        config.decompile_pool_size = threads;
    }
    if args.include_unchanged {
        config.include_unchanged = true;
    }
    let context = args
        .context
        .unwrap_or_else(|| i32::try_from(config.context_lines).unwrap_or(i32::MAX));

    let left = archive_input_for_path(&args.left)
        .with_context(|| format!("Cannot open left input {}", args.left.display()))?;
    let right = archive_input_for_path(&args.right)
        .with_context(|| format!("Cannot open right input {}", args.right.display()))?;

    info!("Comparing:");
    info!("  Left:  {}", args.left.display());
    info!("  Right: {}", args.right.display());

    let engine = ComparisonEngine::from_config(&config);
    let request = ComparisonRequest::new(left.as_ref(), right.as_ref(), args.mode.into())
        .with_context_lines(context)
        .with_unchanged(config.include_unchanged);
    let result = engine.compare(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let use_color = !args.no_color && std::io::stdout().is_terminal();
    print_text_report(&result, use_color);
    Ok(())
}

struct Palette {
    added: &'static str,
    deleted: &'static str,
    modified: &'static str,
    renamed: &'static str,
    hunk: &'static str,
    reset: &'static str,
}

impl Palette {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                added: "\x1b[32m",    // Green
                deleted: "\x1b[31m",  // Red
                modified: "\x1b[33m", // Yellow
                renamed: "\x1b[34m",  // Blue
                hunk: "\x1b[36m",     // Cyan
                reset: "\x1b[0m",
            }
        } else {
            Self {
                added: "",
                deleted: "",
                modified: "",
                renamed: "",
                hunk: "",
                reset: "",
            }
        }
    }

    fn paint_diff(&self, diff: &str) -> String {
        if self.reset.is_empty() {
            return diff.to_string();
        }

        let mut out = String::with_capacity(diff.len());
        for line in diff.lines() {
            let color = if line.starts_with("@@") {
                self.hunk
            } else if line.starts_with('+') && !line.starts_with("+++") {
                self.added
            } else if line.starts_with('-') && !line.starts_with("---") {
                self.deleted
            } else {
                ""
            };
            if color.is_empty() {
                out.push_str(line);
            } else {
                out.push_str(&format!("{}{}{}", color, line, self.reset));
            }
            out.push('\n');
        }
        out
    }
}

fn print_text_report(result: &ComparisonResult, use_color: bool) {
    let palette = Palette::new(use_color);

    println!("\n{}", "=".repeat(80));
    println!("Comparison Results");
    println!("{}", "=".repeat(80));

    for name in result.added.keys() {
        println!("{}  A  {}{}", palette.added, palette.reset, name);
    }
    for name in result.deleted.keys() {
        println!("{}  D  {}{}", palette.deleted, palette.reset, name);
    }
    for name in result.modified.keys() {
        println!("{}  M  {}{}", palette.modified, palette.reset, name);
    }
    for rename in &result.renamed {
        println!(
            "{}  R  {}{} -> {}",
            palette.renamed, palette.reset, rename.from, rename.to
        );
    }
    if let Some(unchanged) = &result.unchanged {
        for name in unchanged {
            println!("  =  {}", name);
        }
    }

    let diffs = result
        .added
        .values()
        .chain(result.deleted.values())
        .chain(result.modified.values())
        .map(|info| info.diff.as_str())
        .chain(result.renamed.iter().map(|rename| rename.diff.as_str()));
    for diff in diffs {
        println!();
        print!("{}", palette.paint_diff(diff));
    }

    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Added:     {}", result.added.len());
    println!("  Deleted:   {}", result.deleted.len());
    println!("  Modified:  {}", result.modified.len());
    println!("  Renamed:   {}", result.renamed.len());
    if let Some(unchanged) = &result.unchanged {
        println!("  Unchanged: {}", unchanged.len());
    }
    println!("Timing:");
    for step in &result.timing.steps {
        println!("  {:<32} {:>8.3}s", step.label, step.duration_seconds);
    }
    println!("  {:<32} {:>8.3}s", "Total", result.timing.total_duration_seconds);
    println!("{}", "=".repeat(80));
}
