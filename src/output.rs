use crate::models::{EvaluationRun, Statistics};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print evaluation runs in the specified format
pub fn print_results(runs: &[EvaluationRun], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print_plain(runs),
        OutputFormat::Json => print_json(runs),
    }
}

/// Print runs in plain text format
fn print_plain(runs: &[EvaluationRun]) {
    let mut out = String::new();
    match render_plain(&mut out, runs) {
        Ok(()) => print!("{}", out),
        Err(e) => eprintln!("Error rendering results: {}", e),
    }
}

/// Render runs as human-readable text
fn render_plain(out: &mut impl Write, runs: &[EvaluationRun]) -> fmt::Result {
    for (i, run) in runs.iter().enumerate() {
        writeln!(out, "=== {} ({}) ===", run.run_name, run.project_name)?;
        writeln!(out)?;

        writeln!(out, "📊 STATISTICS")?;
        writeln!(out, "-------------")?;
        render_statistics_plain(out, &run.statistics)?;
        writeln!(out)?;

        writeln!(out, "📝 DETAILED RESULTS")?;
        writeln!(out, "-------------------")?;
        for (j, result) in run.results.iter().enumerate() {
            let status = if result.passed() { "PASS" } else { "FAIL" };
            writeln!(out, "Example #{} [{}]", j + 1, status)?;
            writeln!(out, "Input: {}", result.example.input)?;
            writeln!(out, "Answer: {}", result.example.actual_output)?;
            writeln!(out, "Scores:")?;
            for verdict in &result.scores {
                let score = verdict
                    .score
                    .map(|s| format!("{:.3}", s))
                    .unwrap_or_else(|| "n/a".to_string());
                let mark = if verdict.success { "✓" } else { "✗" };
                writeln!(
                    out,
                    "  • {}: {} (threshold {:.2}) {}",
                    verdict.scorer, score, verdict.threshold, mark
                )?;
                if let Some(reason) = &verdict.reason {
                    writeln!(out, "    {}", reason)?;
                }
            }
            writeln!(out)?;
        }

        if i < runs.len() - 1 {
            writeln!(out, "{}", "=".repeat(50))?;
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Render the per-scorer statistics table
fn render_statistics_plain(out: &mut impl Write, stats: &Statistics) -> fmt::Result {
    if stats.pass_rate.is_empty() {
        return writeln!(out, "No statistics available.");
    }

    writeln!(
        out,
        "{:<22} {:<8} {:<8} {:<8} {:<8}",
        "Scorer", "Mean", "Median", "Mode", "Pass"
    )?;
    writeln!(out, "{}", "-".repeat(58))?;

    for (scorer, pass_rate) in &stats.pass_rate {
        let mean = stats.mean.get(scorer).unwrap_or(&0.0);
        let median = stats.median.get(scorer).unwrap_or(&0.0);
        let mode = stats.mode.get(scorer).unwrap_or(&0.0);

        writeln!(
            out,
            "{:<22} {:<8.3} {:<8.3} {:<8.1} {:<8}",
            scorer,
            mean,
            median,
            mode,
            format!("{:.0}%", pass_rate * 100.0)
        )?;
    }

    Ok(())
}

/// Print runs in JSON format
fn print_json(runs: &[EvaluationRun]) {
    match serde_json::to_string_pretty(runs) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}
