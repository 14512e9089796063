//! Cyclomatic complexity and maintainability index per function.
//!
//! - CC = 1 + decision points in the body, nested function and class bodies
//!   excluded (they are scored on their own).
//! - MI = 171 − 5.2·ln(HV) − 0.23·CC − 16.2·ln(LOC), clamped to `[0, 100]`.
//!   HV is the adapter-measured Halstead volume when positive, `2 × LOC`
//!   otherwise. LOC is the line span of the declaration.

use crate::ast::{AstNode, NodeKind};
use crate::model::{Symbol, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw complexity inputs captured by the symbol builder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    pub decision_points: u32,
    pub loc: usize,
    pub halstead_volume: Option<f64>,
}

impl FunctionMetrics {
    pub fn cyclomatic(&self) -> u32 {
        1 + self.decision_points
    }

    pub fn maintainability_index(&self) -> f64 {
        maintainability_index(self.halstead_volume, self.cyclomatic(), self.loc)
    }
}

/// Counts decision points below `nodes`, not descending into nested
/// declarations.
pub fn decision_points(nodes: &[AstNode]) -> u32 {
    let mut count = 0;
    let mut stack: Vec<&AstNode> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        match node.kind {
            NodeKind::Function { .. } | NodeKind::Class { .. } | NodeKind::Interface { .. } => {
                continue
            }
            _ => {}
        }
        if node.kind.is_decision_point() {
            count += 1;
        }
        stack.extend(node.children.iter());
    }
    count
}

pub fn maintainability_index(halstead_volume: Option<f64>, cyclomatic: u32, loc: usize) -> f64 {
    let loc = loc.max(1) as f64;
    let volume = match halstead_volume {
        Some(v) if v > 0.0 && v.is_finite() => v,
        _ => 2.0 * loc,
    };
    let mi = 171.0 - 5.2 * volume.ln() - 0.23 * cyclomatic as f64 - 16.2 * loc.ln();
    mi.clamp(0.0, 100.0)
}

/// Letter grade, A best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_maintainability(mi: f64) -> Self {
        if mi >= 60.0 {
            Self::A
        } else if mi >= 40.0 {
            Self::B
        } else if mi >= 20.0 {
            Self::C
        } else if mi >= 10.0 {
            Self::D
        } else {
            Self::F
        }
    }

    pub fn from_cyclomatic(cc: u32) -> Self {
        match cc {
            0..=5 => Self::A,
            6..=10 => Self::B,
            11..=15 => Self::C,
            16..=25 => Self::D,
            _ => Self::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        };
        f.write_str(s)
    }
}

/// Complexity of one function or method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub symbol_id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub start_line: usize,
    pub cyclomatic: u32,
    pub cyclomatic_grade: Grade,
    /// Maintainability index, two decimals.
    pub score: f64,
    pub grade: Grade,
}

impl ComplexityReport {
    pub fn new(symbol: &Symbol, metrics: &FunctionMetrics) -> Self {
        let cyclomatic = metrics.cyclomatic();
        let mi = metrics.maintainability_index();
        Self {
            symbol_id: symbol.id,
            name: symbol.name.clone(),
            qualified_name: symbol.qualified_name.clone(),
            file_path: symbol.file_path.clone(),
            start_line: symbol.start_line,
            cyclomatic,
            cyclomatic_grade: Grade::from_cyclomatic(cyclomatic),
            score: (mi * 100.0).round() / 100.0,
            grade: Grade::from_maintainability(mi),
        }
    }
}

/// Scores every live callable symbol that has metrics.
///
/// Output is ordered by file path, then start line.
pub fn complexity_reports<'a>(
    symbols: impl IntoIterator<Item = &'a Symbol>,
    metrics: &BTreeMap<SymbolId, FunctionMetrics>,
) -> Vec<ComplexityReport> {
    let mut reports: Vec<ComplexityReport> = symbols
        .into_iter()
        .filter(|s| s.kind.is_callable() && !s.tombstoned)
        .filter_map(|s| metrics.get(&s.id).map(|m| ComplexityReport::new(s, m)))
        .collect();
    reports.sort_by(|a, b| {
        (&a.file_path, a.start_line, &a.qualified_name).cmp(&(
            &b.file_path,
            b.start_line,
            &b.qualified_name,
        ))
    });
    reports
}
