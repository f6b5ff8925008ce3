//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code never builds strings and output
//! changes stay localized.

use crate::domain::RunConfig;
use crate::fit::{BatchEntry, BatchResults};

/// Run header plus one table row per dataset, in input order.
pub fn format_batch_summary(results: &BatchResults, labels: &[String], config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== clipfit - iterative sigma-clip fit ===\n");
    out.push_str(&format!("Label: {}\n", config.label));
    out.push_str(&format!(
        "Visits: {} | clip: {} iter(s) at {:.1} sigma | functions: {}\n",
        config.nvisit,
        config.max_clip_iters,
        config.clip_sigma,
        config
            .functions
            .iter()
            .map(|f| format!("{f:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    let samplers = config.requested_samplers();
    if !samplers.is_empty() {
        let names: Vec<String> = samplers.iter().map(|s| s.to_string()).collect();
        out.push_str(&format!("Samplers: {}\n", names.join(", ")));
    }
    out.push_str(&format!(
        "Datasets: {} ({} ok, {} failed)\n\n",
        results.len(),
        results.succeeded(),
        results.len() - results.succeeded()
    ));

    out.push_str(&header_row(labels));
    out.push('\n');
    out.push_str(&rule_row(labels.len()));
    out.push('\n');
    for entry in &results.entries {
        out.push_str(format_entry(entry, labels).trim_end());
        out.push('\n');
    }

    out
}

fn header_row(labels: &[String]) -> String {
    let mut row = format!(
        "{:>4} {:<24} {:<16} {:>5} {:>9}",
        "#", "source", "termination", "clip", "chi2red"
    );
    for label in labels {
        row.push_str(&format!(" {:>22}", truncate(label, 22)));
    }
    row.trim_end().to_string()
}

fn rule_row(n_labels: usize) -> String {
    let mut row = format!("{:-<4} {:-<24} {:-<16} {:-<5} {:-<9}", "", "", "", "", "");
    for _ in 0..n_labels {
        row.push_str(&format!(" {:-<22}", ""));
    }
    row
}

fn format_entry(entry: &BatchEntry, labels: &[String]) -> String {
    let name = short_source(&entry.source);
    match &entry.outcome {
        Ok(outcome) => {
            let mut row = format!(
                "{:>4} {:<24} {:<16} {:>5} {:>9.3}",
                entry.position,
                truncate(&name, 24),
                outcome.termination.display_name(),
                outcome.clipped.len(),
                outcome.chi2red
            );
            for k in 0..labels.len() {
                let cell = match outcome.summary.reported(k) {
                    Some((value, error)) => format!("{value:.5e}±{error:.1e}"),
                    None => "-".to_string(),
                };
                row.push_str(&format!(" {cell:>22}"));
            }
            row
        }
        Err(err) => format!(
            "{:>4} {:<24} {:<16} error: {err}",
            entry.position,
            truncate(&name, 24),
            "failed"
        ),
    }
}

fn short_source(source: &str) -> String {
    std::path::Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
