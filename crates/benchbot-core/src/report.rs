//! Report-row generation and Markdown rendering.
//!
//! Comparison reports list only interesting rows (regressions and
//! improvements); invariant rows are suppressed to keep the report short.
//! Single-build reports list every row. Rows follow the `BenchKey` order.

use std::fmt::Write;

use crate::job::BenchmarkJob;
use crate::judge::{JudgedResult, Verdict};
use crate::results::StructuredResult;

/// Render the Markdown report for a comparison job.
pub fn comparison_report(job: &BenchmarkJob, judged: &JudgedResult) -> String {
    let mut out = String::new();
    header(&mut out, job);

    let interesting: Vec<_> = judged.iter().filter(|(_, j)| j.is_interesting()).collect();

    if interesting.is_empty() {
        out.push_str("No significant changes were detected.\n");
        return out;
    }

    if judged.has_regressions() {
        out.push_str("**Possible performance regressions were detected.**\n\n");
    }

    out.push_str("Ratios are primary over comparison; a time or memory ratio ");
    out.push_str("outside the recorded tolerance is marked below. ");
    out.push_str("Entries within tolerance are omitted.\n\n");
    out.push_str("| ID | time ratio | memory ratio |\n");
    out.push_str("|----|------------|--------------|\n");
    for (key, j) in interesting {
        let _ = writeln!(
            out,
            "| `{key}` | {} | {} |",
            ratio_cell(j.time_ratio, j.time),
            ratio_cell(j.memory_ratio, j.memory),
        );
    }
    out
}

/// Render the Markdown report for a single-build job.
pub fn single_report(job: &BenchmarkJob, result: &StructuredResult) -> String {
    let mut out = String::new();
    header(&mut out, job);

    out.push_str("| ID | time (ns) | GC (ns) | memory (bytes) | allocs |\n");
    out.push_str("|----|-----------|---------|----------------|--------|\n");
    for (key, m) in result.iter() {
        let _ = writeln!(
            out,
            "| `{key}` | {:.0} | {:.0} | {:.0} | {} |",
            m.time, m.gctime, m.memory, m.allocs,
        );
    }
    out
}

fn header(out: &mut String, job: &BenchmarkJob) {
    out.push_str("# Benchmark Report\n\n");
    let _ = writeln!(out, "*Job:* {}\n", job.summary());
    let _ = writeln!(out, "*Primary build:* `{}`{}", job.submission.primary, version_note(&job.submission.primary.version));
    if let Some(against) = &job.against {
        let _ = writeln!(out, "*Comparison build:* `{against}`{}", version_note(&against.version));
    }
    out.push('\n');
}

fn version_note(version: &Option<String>) -> String {
    match version {
        Some(v) => format!(" ({v})"),
        None => String::new(),
    }
}

fn ratio_cell(ratio: f64, verdict: Verdict) -> String {
    match verdict {
        Verdict::Invariant => format!("{ratio:.2}"),
        other => format!("{ratio:.2} ({other})"),
    }
}

/// Serialize the raw data artifact for a comparison job.
pub fn comparison_data(
    primary: &StructuredResult,
    against: &StructuredResult,
    judged: &JudgedResult,
) -> serde_json::Result<String> {
    let data = serde_json::json!({
        "primary": serde_json::from_str::<serde_json::Value>(&primary.to_json()?)?,
        "against": serde_json::from_str::<serde_json::Value>(&against.to_json()?)?,
        "judged": judged,
    });
    serde_json::to_string_pretty(&data)
}

/// Serialize the raw data artifact for a single-build job.
pub fn single_data(result: &StructuredResult) -> serde_json::Result<String> {
    result.to_json()
}
