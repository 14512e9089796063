//! Output formatting - plaintext and JSON.

use crate::query::Query;
use crate::snapshot::Snapshot;
use serde_json::{json, Map, Value};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl OutputFormat {
    /// `"json"` (any case) selects JSON; anything else is plain text.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Plain,
        }
    }
}

/// Report sections to include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub summary: bool,
    pub dead_code: bool,
    pub imports: bool,
    pub cycles: bool,
    pub complexity: bool,
    pub issues: bool,
}

impl Sections {
    pub fn all() -> Self {
        Self {
            summary: true,
            dead_code: true,
            imports: true,
            cycles: true,
            complexity: true,
            issues: true,
        }
    }

    pub fn none() -> Self {
        Self {
            summary: false,
            dead_code: false,
            imports: false,
            cycles: false,
            complexity: false,
            issues: false,
        }
    }
}

impl Default for Sections {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportOptions {
    pub sections: Sections,
    pub min_confidence: f64,
    /// Complexity rows below this cyclomatic complexity are omitted.
    pub min_cyclomatic: u32,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sections: Sections::all(),
            min_confidence: 0.0,
            min_cyclomatic: 1,
        }
    }
}

/// Renders the plain text report.
pub fn render_plain(snapshot: &Snapshot, options: &ReportOptions) -> String {
    let query = Query::new(snapshot);
    let sections = options.sections;
    let mut out = String::new();

    if sections.summary {
        let s = query.summary();
        let _ = writeln!(out, "SUMMARY (version {}):", s.version);
        let _ = writeln!(
            out,
            "- files: {}, symbols: {}, usage edges: {}, dependency edges: {}",
            s.files, s.symbols, s.usage_edges, s.dependency_edges
        );
        for (kind, count) in &s.symbols_by_kind {
            let _ = writeln!(out, "- {}: {}", kind.as_str(), count);
        }
        for (status, count) in &s.imports_by_status {
            let _ = writeln!(out, "- imports {}: {}", status.as_str(), count);
        }
        if s.stale_files > 0 || s.analysis_stale {
            let _ = writeln!(
                out,
                "- stale: {} files, {} symbols, {} edges",
                s.stale_files, s.stale_symbols, s.stale_edges
            );
        }
    }

    if sections.dead_code {
        let dead = query.dead_code(options.min_confidence);
        if dead.is_empty() {
            let _ = writeln!(out, "No dead code found.");
        } else {
            let _ = writeln!(out, "DEAD CODE ({}):", dead.len());
            for item in dead {
                let _ = writeln!(
                    out,
                    "- {}:{} {} {} [{}, {}, {:.2}]",
                    item.file_path,
                    item.location.start_line,
                    item.kind.as_str(),
                    item.qualified_name,
                    item.status,
                    item.reason,
                    item.confidence
                );
            }
        }
    }

    if sections.imports {
        let issues = query.import_issues();
        if issues.is_empty() {
            let _ = writeln!(out, "No broken imports found.");
        } else {
            let _ = writeln!(out, "IMPORT ISSUES ({}):", issues.len());
            for issue in issues {
                let kind = match issue.kind {
                    crate::issues::ImportIssueKind::Unresolved => "unresolved",
                    crate::issues::ImportIssueKind::Circular => "circular",
                };
                let _ = writeln!(
                    out,
                    "- {}:{} {} ({})",
                    issue.file_path, issue.line, issue.import_path, kind
                );
            }
        }
    }

    if sections.cycles {
        let graph = query.dependency_graph();
        if graph.cycles.is_empty() {
            let _ = writeln!(out, "No import cycles found.");
        } else {
            let _ = writeln!(out, "IMPORT CYCLES ({}):", graph.cycles.len());
            for cycle in &graph.cycles {
                let _ = writeln!(out, "- {} (length {})", cycle, cycle.length);
            }
        }
    }

    if sections.complexity {
        let reports = query.complexity_report(options.min_cyclomatic);
        if !reports.is_empty() {
            let _ = writeln!(out, "COMPLEXITY ({}):", reports.len());
            for r in reports {
                let _ = writeln!(
                    out,
                    "- {}:{} {} cc={} ({}) mi={:.2} ({})",
                    r.file_path,
                    r.start_line,
                    r.qualified_name,
                    r.cyclomatic,
                    r.cyclomatic_grade,
                    r.score,
                    r.grade
                );
            }
        }
    }

    if sections.issues {
        let issues = query.issues(None);
        if !issues.is_empty() {
            let _ = writeln!(out, "ISSUES ({}):", issues.len());
            for issue in issues {
                let _ = writeln!(out, "- {}", issue);
            }
        }
    }

    out
}

/// Builds the JSON report.
pub fn render_json(snapshot: &Snapshot, options: &ReportOptions) -> Value {
    let query = Query::new(snapshot);
    let sections = options.sections;
    let mut root = Map::new();
    root.insert("version".into(), json!(snapshot.version));

    if sections.summary {
        root.insert("summary".into(), json!(query.summary()));
    }
    if sections.dead_code {
        root.insert("dead_code".into(), json!(query.dead_code(options.min_confidence)));
    }
    if sections.imports {
        root.insert("import_issues".into(), json!(query.import_issues()));
    }
    if sections.cycles {
        root.insert("dependency_graph".into(), json!(query.dependency_graph()));
    }
    if sections.complexity {
        root.insert(
            "complexity".into(),
            json!(query.complexity_report(options.min_cyclomatic)),
        );
    }
    if sections.issues {
        root.insert("issues".into(), json!(query.issues(None)));
    }
    Value::Object(root)
}

/// Prints the report in the requested format.
pub fn print_report(snapshot: &Snapshot, format: OutputFormat, options: &ReportOptions) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(snapshot, options)),
        OutputFormat::Json => match serde_json::to_string_pretty(&render_json(snapshot, options)) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                tracing::error!(error = %e, "JSON serialization failed");
                println!("{{\"version\": {}}}", snapshot.version);
            }
        },
    }
}
