use std::collections::BTreeMap;

use serde::Serialize;

use super::{GroupStats, RollingPoint};

/// Full report payload for machine consumption (`report --json`).
#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    pub groups: &'a BTreeMap<String, GroupStats>,
    pub rolling_error_rate: &'a [RollingPoint],
}

pub fn to_json(
    groups: &BTreeMap<String, GroupStats>,
    rolling: &[RollingPoint],
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ReportPayload {
        groups,
        rolling_error_rate: rolling,
    })
}

/// Operator-facing statistics block, one section per group.
pub fn print_summary(groups: &BTreeMap<String, GroupStats>) {
    if groups.is_empty() {
        println!("No samples in store.");
        return;
    }

    for (group, stats) in groups {
        println!();
        println!("Performance statistics for {group}:");
        println!("  Average TPS: {:.2}", stats.average_tps);
        println!("  Max TPS: {:.2}", stats.max_tps);
        println!("  Min TPS: {:.2}", stats.min_tps);
        println!();
        println!(
            "  Average First Token Latency: {:.2} ms",
            stats.average_first_token_latency_ms
        );
        println!(
            "  Max First Token Latency: {:.2} ms",
            stats.max_first_token_latency_ms
        );
        println!(
            "  Min First Token Latency: {:.2} ms",
            stats.min_first_token_latency_ms
        );
        println!(
            "  p50/p95/p99 First Token Latency: {}/{}/{} ms",
            stats.first_token_latency.p50,
            stats.first_token_latency.p95,
            stats.first_token_latency.p99
        );
        println!();
        println!(
            "  Average Total Latency: {:.2} ms",
            stats.average_total_latency_ms
        );
        println!("  Max Total Latency: {:.2} ms", stats.max_total_latency_ms);
        println!("  Min Total Latency: {:.2} ms", stats.min_total_latency_ms);
        println!(
            "  p50/p95/p99 Total Latency: {}/{}/{} ms",
            stats.total_latency.p50, stats.total_latency.p95, stats.total_latency.p99
        );
        println!();
        println!(
            "  Total Completion Tokens: {}",
            stats.total_completion_tokens
        );
        println!("  Total Prompt Tokens: {}", stats.total_prompt_tokens);
        println!(
            "  Average Prompt Tokens: {:.2}",
            stats.average_prompt_tokens
        );
        println!("  Total Requests: {}", stats.total_requests);
        println!("  API Error Rate: {:.2}%", stats.error_rate_percent);
        println!("  API Errors: {}", stats.api_errors);
        println!(
            "  Context Window Errors: {}",
            stats.context_overflow_count
        );
        println!("  No-Token Failures: {}", stats.no_token_count);
        println!("  Other Failures: {}", stats.other_failures);
    }
}

/// Compact view of the rolling series: bucket count, span, and peak.
pub fn print_rolling_overview(rolling: &[RollingPoint]) {
    let Some(first) = rolling.first() else {
        return;
    };
    let last = rolling.last().unwrap_or(first);
    let peak = rolling
        .iter()
        .map(|p| p.error_rate_percent)
        .fold(0.0, f64::max);

    println!();
    println!(
        "Rolling error rate: {} buckets from {} to {}, peak {:.2}%",
        rolling.len(),
        first.bucket_start,
        last.bucket_start,
        peak
    );
}
