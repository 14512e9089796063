//! symgraph CLI - symbol and dependency graph analysis over AST dumps.
//!
//! Reads `*.ast.json` dumps below a repository root, runs a full pass,
//! optionally replays change events, and prints a plain or JSON report.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use symgraph_core::logging::{init_structured_logging, log_diff, log_snapshot, log_store_miss};
use symgraph_core::report::{print_report, OutputFormat, ReportOptions, Sections};
use symgraph_core::{
    CancellationToken, ChangeEvent, JsonFileStore, Query, SnapshotStore, Symgraph,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Symbol graph, dead code and import cycle analysis")]
pub struct Cli {
    /// Repository root containing `*.ast.json` dumps
    #[arg(default_value = ".")]
    path: String,

    /// Output results in JSON format
    #[arg(long)]
    json: bool,

    /// Symbol name patterns to leave out of dead code reports
    #[arg(long, num_args = 1..)]
    ignore: Vec<String>,

    /// Directory names to skip while gathering dumps
    #[arg(long, num_args = 1..)]
    exclude: Vec<String>,

    /// Roots for absolute imports, in priority order (replaces the config value)
    #[arg(long, num_args = 1..)]
    source_root: Vec<String>,

    /// Change events to apply after the full pass (one JSON object per line)
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Persist the final snapshot to a JSON store
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Repository id used as the store key
    #[arg(long, default_value = "default")]
    repository_id: String,

    /// Report what changed since the snapshot held in the store
    #[arg(long, requires = "store")]
    diff: bool,

    /// Disable the extraction cache
    #[arg(long)]
    no_cache: bool,

    /// Exit with code 1 when dead code or broken imports are found
    #[arg(long)]
    fail_on_issues: bool,

    /// Only report dead code with at least this confidence
    #[arg(long, default_value_t = 0.0)]
    min_confidence: f64,

    /// Only report complexity rows with at least this cyclomatic complexity
    #[arg(long, default_value_t = 1)]
    min_cyclomatic: u32,

    /// Show the summary section
    #[arg(long)]
    summary: bool,

    /// Show the dead code section
    #[arg(long)]
    dead: bool,

    /// Show the import issues section
    #[arg(long)]
    imports: bool,

    /// Show the import cycles section
    #[arg(long)]
    cycles: bool,

    /// Show the complexity section
    #[arg(long)]
    complexity: bool,

    /// Show the issues section
    #[arg(long)]
    issues: bool,
}

impl Cli {
    /// Selected report sections; no section flag means all of them.
    fn sections(&self) -> Sections {
        let selected = Sections {
            summary: self.summary,
            dead_code: self.dead,
            imports: self.imports,
            cycles: self.cycles,
            complexity: self.complexity,
            issues: self.issues,
        };
        if selected == Sections::none() {
            Sections::all()
        } else {
            selected
        }
    }

    fn builder(&self) -> Symgraph {
        let mut builder = Symgraph::new(&self.path)
            .with_cache(!self.no_cache)
            .ignore_patterns(self.ignore.iter().cloned())
            .exclude_dirs(self.exclude.iter().cloned());
        if !self.source_root.is_empty() {
            builder = builder.source_roots(self.source_root.iter().cloned());
        }
        builder
    }
}

/// Reads one `ChangeEvent` per non-blank line.
fn read_events(path: &Path) -> Result<Vec<ChangeEvent>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file: {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<ChangeEvent>(line)
                .with_context(|| format!("Invalid change event at {}:{}", path.display(), i + 1))
        })
        .collect()
}

fn main() -> Result<()> {
    // Initialize structured logging (JSON to stderr, respects RUST_LOG)
    init_structured_logging();

    let cli = Cli::parse();
    let builder = cli.builder();
    let config = builder.config()?;

    // 1. Full pass over the dumps
    let coordinator = builder.coordinator()?;
    let units = builder.load_units()?;
    coordinator
        .full_pass(&units, &CancellationToken::new())
        .context("Full analysis pass failed")?;

    // 2. Replay change events
    if let Some(events_path) = &cli.events {
        let events = read_events(events_path)?;
        tracing::info!(count = events.len(), "applying change events");
        coordinator.sync(events).context("Incremental pass failed")?;
    }

    builder.persist_cache(&coordinator);
    let snapshot = coordinator.snapshot();
    log_snapshot(&snapshot);

    // 3. Compare with and persist to the store
    if let Some(store_path) = &cli.store {
        let store = JsonFileStore::new(store_path);
        if cli.diff {
            match store.load(&cli.repository_id)? {
                Some(stored) => {
                    let older = stored.into_snapshot();
                    let diff = Query::new(&snapshot).diff_since(&older);
                    log_diff(&diff);
                    eprintln!("{}", serde_json::to_string_pretty(&diff)?);
                }
                None => {
                    log_store_miss(&store_path.display().to_string(), &cli.repository_id);
                    eprintln!(
                        "No stored snapshot for repository '{}'; nothing to compare.",
                        cli.repository_id
                    );
                }
            }
        }
        store
            .save(&cli.repository_id, &snapshot, &coordinator.runs())
            .with_context(|| format!("Failed to write store: {}", store_path.display()))?;
    }

    // 4. Report
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::parse(config.output.format.as_deref())
    };
    let options = ReportOptions {
        sections: cli.sections(),
        min_confidence: cli.min_confidence,
        min_cyclomatic: cli.min_cyclomatic,
    };
    print_report(&snapshot, format, &options);

    // 5. Exit code (CI-friendly)
    if cli.fail_on_issues {
        let result = symgraph_core::AnalysisResult::new(&cli.path, &coordinator);
        if result.has_dead_code() || result.has_broken_imports() {
            std::process::exit(1);
        }
    }
    Ok(())
}
