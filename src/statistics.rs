use std::collections::HashMap;

use crate::models::{ExampleResult, Statistics};

/// Calculate per-scorer statistics across the results of a run.
///
/// Verdict `i` of every example belongs to `scorers[i]`, whatever name the
/// service gave it.
pub fn calculate_statistics(results: &[ExampleResult], scorers: &[String]) -> Statistics {
    let mut statistics = Statistics::default();

    for (position, scorer) in scorers.iter().enumerate() {
        let verdicts: Vec<_> = results
            .iter()
            .filter_map(|r| r.scores.get(position))
            .collect();

        let pass_rate = if verdicts.is_empty() {
            0.0
        } else {
            verdicts.iter().filter(|v| v.success).count() as f64 / verdicts.len() as f64
        };
        statistics.pass_rate.insert(scorer.clone(), pass_rate);

        let scores: Vec<f64> = verdicts.iter().filter_map(|v| v.score).collect();
        if scores.is_empty() {
            statistics.mean.insert(scorer.clone(), 0.0);
            statistics.median.insert(scorer.clone(), 0.0);
            statistics.mode.insert(scorer.clone(), 0.0);
            continue;
        }

        statistics.mean.insert(scorer.clone(), calculate_mean(&scores));
        statistics.median.insert(scorer.clone(), calculate_median(&scores));
        statistics.mode.insert(scorer.clone(), calculate_mode(&scores));
    }

    statistics
}

fn calculate_mean(scores: &[f64]) -> f64 {
    let sum: f64 = scores.iter().sum();
    sum / scores.len() as f64
}

fn calculate_median(scores: &[f64]) -> f64 {
    let mut sorted_scores = scores.to_vec();
    sorted_scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted_scores.len() / 2;
    if sorted_scores.len() % 2 == 0 {
        (sorted_scores[mid - 1] + sorted_scores[mid]) / 2.0
    } else {
        sorted_scores[mid]
    }
}

/// Most frequent score after rounding to one decimal place; ties go to the lowest score
fn calculate_mode(scores: &[f64]) -> f64 {
    let mut frequency: HashMap<i64, usize> = HashMap::new();

    for &score in scores {
        *frequency.entry((score * 10.0).round() as i64).or_insert(0) += 1;
    }

    frequency
        .into_iter()
        .max_by(|(a_key, a_count), (b_key, b_count)| a_count.cmp(b_count).then(b_key.cmp(a_key)))
        .map(|(tenths, _)| tenths as f64 / 10.0)
        .unwrap_or(0.0)
}
