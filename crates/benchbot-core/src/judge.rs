//! The Judge: classifies metric changes between two structured results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::results::{BenchKey, StructuredResult};

/// Classification of one metric within noise tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Improvement,
    Regression,
    Invariant,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verdict::Improvement => "improvement",
            Verdict::Regression => "regression",
            Verdict::Invariant => "invariant",
        })
    }
}

/// Judged change for one benchmark key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    /// primary time / comparison time.
    pub time_ratio: f64,
    /// primary memory / comparison memory.
    pub memory_ratio: f64,
    pub time: Verdict,
    pub memory: Verdict,
}

impl Judgement {
    /// Whether this entry should appear in a comparison report.
    pub fn is_interesting(&self) -> bool {
        self.time != Verdict::Invariant || self.memory != Verdict::Invariant
    }

    pub fn is_regression(&self) -> bool {
        self.time == Verdict::Regression || self.memory == Verdict::Regression
    }
}

/// Judged changes over the keys shared by two structured results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JudgedResult {
    entries: BTreeMap<BenchKey, Judgement>,
}

impl JudgedResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &BenchKey) -> Option<&Judgement> {
        self.entries.get(key)
    }

    /// Entries in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&BenchKey, &Judgement)> {
        self.entries.iter()
    }

    /// Overall job outcome: any time or memory regression on any key.
    pub fn has_regressions(&self) -> bool {
        self.entries.values().any(Judgement::is_regression)
    }
}

/// Compare two structured results key-by-key.
///
/// Only keys present on both sides are judged; per metric, the ratio is
/// primary over comparison and the effective tolerance is the larger of the
/// two recorded tolerances. Judging is pure: the same inputs always yield
/// the same output.
pub fn judge(primary: &StructuredResult, against: &StructuredResult) -> JudgedResult {
    let mut entries = BTreeMap::new();

    for (key, p) in primary.iter() {
        let Some(a) = against.get(key) else {
            continue;
        };

        let time_ratio = ratio(p.time, a.time);
        let memory_ratio = ratio(p.memory, a.memory);
        let time_tol = p.time_tolerance.max(a.time_tolerance);
        let memory_tol = p.memory_tolerance.max(a.memory_tolerance);

        entries.insert(
            key.clone(),
            Judgement {
                time_ratio,
                memory_ratio,
                time: classify(time_ratio, time_tol),
                memory: classify(memory_ratio, memory_tol),
            },
        );
    }

    JudgedResult { entries }
}

fn ratio(primary: f64, against: f64) -> f64 {
    if against == 0.0 {
        if primary == 0.0 { 1.0 } else { f64::INFINITY }
    } else {
        primary / against
    }
}

fn classify(ratio: f64, tolerance: f64) -> Verdict {
    if ratio > 1.0 + tolerance {
        Verdict::Regression
    } else if ratio < 1.0 - tolerance {
        Verdict::Improvement
    } else {
        Verdict::Invariant
    }
}
