pub mod percentiles;
pub mod render;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use hdrhistogram::Histogram;
use serde::Serialize;

use crate::sample::{ErrorKind, Outcome, SampleRecord};
use crate::store::{MalformedLine, ReplayRow};

use self::percentiles::{latency_histogram, PercentileSet};

/// Group key used when not splitting per model.
pub const OVERALL_GROUP: &str = "all";

/// Rolling error-rate bucket width, minutes.
pub const DEFAULT_BUCKET_MINS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    All,
    Model,
}

// ─── Summary statistics ──────────────────────────────────────────

/// Scalar statistics for one group (overall or per model). Recomputed
/// from the store on every reporting pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    /// Every attempt, malformed rows included — undercounting these
    /// would silently understate the error rate.
    pub total_requests: u64,
    pub successes: u64,

    pub average_tps: f64,
    pub max_tps: f64,
    pub min_tps: f64,

    pub average_first_token_latency_ms: f64,
    pub max_first_token_latency_ms: f64,
    pub min_first_token_latency_ms: f64,

    pub average_total_latency_ms: f64,
    pub max_total_latency_ms: f64,
    pub min_total_latency_ms: f64,

    pub total_completion_tokens: u64,
    pub total_prompt_tokens: u64,
    pub average_prompt_tokens: f64,

    // Error-classification breakdown.
    pub api_errors: u64,
    pub context_overflow_count: u64,
    pub no_token_count: u64,
    pub other_failures: u64,
    pub error_rate_percent: f64,

    pub first_token_latency: PercentileSet,
    pub total_latency: PercentileSet,
}

/// Running totals for one group while a summarize pass walks the rows.
struct StatsBuilder {
    total: u64,
    successes: u64,

    tps_sum: f64,
    tps_min: f64,
    tps_max: f64,

    ftl_sum: f64,
    ftl_min: f64,
    ftl_max: f64,

    ttl_sum: f64,
    ttl_min: f64,
    ttl_max: f64,

    completion_tokens: u64,
    prompt_tokens: u64,

    api_errors: u64,
    overflows: u64,
    no_token: u64,
    other: u64,

    ftl_hist: Histogram<u64>,
    ttl_hist: Histogram<u64>,
}

impl StatsBuilder {
    fn new() -> Self {
        Self {
            total: 0,
            successes: 0,
            tps_sum: 0.0,
            tps_min: f64::INFINITY,
            tps_max: f64::NEG_INFINITY,
            ftl_sum: 0.0,
            ftl_min: f64::INFINITY,
            ftl_max: f64::NEG_INFINITY,
            ttl_sum: 0.0,
            ttl_min: f64::INFINITY,
            ttl_max: f64::NEG_INFINITY,
            completion_tokens: 0,
            prompt_tokens: 0,
            api_errors: 0,
            overflows: 0,
            no_token: 0,
            other: 0,
            ftl_hist: latency_histogram(),
            ttl_hist: latency_histogram(),
        }
    }

    fn record(&mut self, record: &SampleRecord) {
        self.total += 1;
        match &record.outcome {
            Outcome::Success {
                first_token_latency_ms,
                total_latency_ms,
                tokens_per_second,
                completion_tokens,
                prompt_tokens,
            } => {
                self.successes += 1;

                self.tps_sum += tokens_per_second;
                self.tps_min = self.tps_min.min(*tokens_per_second);
                self.tps_max = self.tps_max.max(*tokens_per_second);

                self.ftl_sum += first_token_latency_ms;
                self.ftl_min = self.ftl_min.min(*first_token_latency_ms);
                self.ftl_max = self.ftl_max.max(*first_token_latency_ms);

                self.ttl_sum += total_latency_ms;
                self.ttl_min = self.ttl_min.min(*total_latency_ms);
                self.ttl_max = self.ttl_max.max(*total_latency_ms);

                self.completion_tokens += completion_tokens;
                self.prompt_tokens += prompt_tokens;

                // Clamp to >= 1 so the histogram accepts sub-ms values.
                let _ = self.ftl_hist.record((*first_token_latency_ms as u64).max(1));
                let _ = self.ttl_hist.record((*total_latency_ms as u64).max(1));
            }
            Outcome::Failure { kind, .. } => match kind {
                ErrorKind::ApiError => self.api_errors += 1,
                ErrorKind::ContextWindowExceeded => self.overflows += 1,
                ErrorKind::NoTokenProduced => self.no_token += 1,
                ErrorKind::Other => self.other += 1,
            },
        }
    }

    fn record_malformed(&mut self, marker: &MalformedLine) {
        self.total += 1;
        if marker.api_error {
            self.api_errors += 1;
        } else {
            self.other += 1;
        }
    }

    fn finish(self) -> GroupStats {
        let n = self.successes as f64;
        // Division-by-zero guards: a group with no successes reports
        // zeroed metrics, an empty group reports a zero error rate.
        let mean = |sum: f64| if self.successes > 0 { sum / n } else { 0.0 };
        let bound = |v: f64| if v.is_finite() { v } else { 0.0 };
        let error_rate = if self.total > 0 {
            self.api_errors as f64 / self.total as f64 * 100.0
        } else {
            0.0
        };

        GroupStats {
            total_requests: self.total,
            successes: self.successes,
            average_tps: mean(self.tps_sum),
            max_tps: bound(self.tps_max),
            min_tps: bound(self.tps_min),
            average_first_token_latency_ms: mean(self.ftl_sum),
            max_first_token_latency_ms: bound(self.ftl_max),
            min_first_token_latency_ms: bound(self.ftl_min),
            average_total_latency_ms: mean(self.ttl_sum),
            max_total_latency_ms: bound(self.ttl_max),
            min_total_latency_ms: bound(self.ttl_min),
            total_completion_tokens: self.completion_tokens,
            total_prompt_tokens: self.prompt_tokens,
            average_prompt_tokens: mean(self.prompt_tokens as f64),
            api_errors: self.api_errors,
            context_overflow_count: self.overflows,
            no_token_count: self.no_token,
            other_failures: self.other,
            error_rate_percent: error_rate,
            first_token_latency: PercentileSet::from_histogram(&self.ftl_hist),
            total_latency: PercentileSet::from_histogram(&self.ttl_hist),
        }
    }
}

/// Reduce replayed history to per-group statistics.
///
/// `GroupBy::All` folds everything — malformed markers included — into
/// one group. `GroupBy::Model` keys by model id; records without a
/// model (historic rows, malformed markers) are excluded from the
/// per-model view and only ever show up in an `All` pass.
pub fn summarize(rows: &[ReplayRow], group_by: GroupBy) -> BTreeMap<String, GroupStats> {
    let mut groups: BTreeMap<String, StatsBuilder> = BTreeMap::new();

    for row in rows {
        match group_by {
            GroupBy::All => {
                let builder = groups
                    .entry(OVERALL_GROUP.to_string())
                    .or_insert_with(StatsBuilder::new);
                match row {
                    ReplayRow::Record(record) => builder.record(record),
                    ReplayRow::Malformed(marker) => builder.record_malformed(marker),
                }
            }
            GroupBy::Model => {
                if let ReplayRow::Record(record) = row {
                    if let Some(model) = &record.model {
                        groups
                            .entry(model.clone())
                            .or_insert_with(StatsBuilder::new)
                            .record(record);
                    }
                }
            }
        }
    }

    groups.into_iter().map(|(k, b)| (k, b.finish())).collect()
}

// ─── Rolling error-rate series ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingPoint {
    pub bucket_start: NaiveDateTime,
    pub error_rate_percent: f64,
}

/// Fixed-width error-rate series spanning the full timestamp range of
/// the history, in chronological order with no gaps: a bucket with no
/// samples reports 0. Every row with a recoverable timestamp counts —
/// successes, classified failures, and malformed markers alike.
pub fn rolling_error_rate(
    rows: &[ReplayRow],
    bucket_width: chrono::Duration,
) -> Vec<RollingPoint> {
    let width_secs = bucket_width.num_seconds().max(1);

    let points: Vec<(NaiveDateTime, bool)> = rows
        .iter()
        .filter_map(|row| match row {
            ReplayRow::Record(record) => Some((
                record.timestamp,
                matches!(
                    record.outcome,
                    Outcome::Failure {
                        kind: ErrorKind::ApiError,
                        ..
                    }
                ),
            )),
            ReplayRow::Malformed(marker) => {
                marker.timestamp.map(|ts| (ts, marker.api_error))
            }
        })
        .collect();

    let Some(start) = points.iter().map(|(ts, _)| *ts).min() else {
        return Vec::new();
    };
    let end = points
        .iter()
        .map(|(ts, _)| *ts)
        .max()
        .unwrap_or(start);

    let buckets = ((end - start).num_seconds() / width_secs) as usize + 1;
    let mut totals = vec![0u64; buckets];
    let mut errors = vec![0u64; buckets];

    for (ts, is_api_error) in points {
        let index = ((ts - start).num_seconds() / width_secs) as usize;
        totals[index] += 1;
        if is_api_error {
            errors[index] += 1;
        }
    }

    (0..buckets)
        .map(|i| RollingPoint {
            bucket_start: start + chrono::Duration::seconds(i as i64 * width_secs),
            error_rate_percent: if totals[i] > 0 {
                errors[i] as f64 / totals[i] as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::TIMESTAMP_FORMAT;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn success_row(at: &str, model: Option<&str>, tps: f64) -> ReplayRow {
        ReplayRow::Record(SampleRecord {
            timestamp: ts(at),
            model: model.map(|m| m.to_string()),
            outcome: Outcome::Success {
                first_token_latency_ms: 250.0,
                total_latency_ms: 3000.0,
                tokens_per_second: tps,
                completion_tokens: 100,
                prompt_tokens: 400,
            },
        })
    }

    fn failure_row(at: &str, model: Option<&str>, detail: &str) -> ReplayRow {
        ReplayRow::Record(SampleRecord {
            timestamp: ts(at),
            model: model.map(|m| m.to_string()),
            outcome: Outcome::Failure {
                kind: crate::sample::classify_error(detail),
                detail: detail.to_string(),
            },
        })
    }

    fn malformed_row(at: Option<&str>, api_error: bool) -> ReplayRow {
        ReplayRow::Malformed(MalformedLine {
            raw: "unparsable".into(),
            timestamp: at.map(ts),
            api_error,
        })
    }

    #[test]
    fn two_successes_one_api_error() {
        // Three rows: successes at 12.5 and 18.0 tps plus one ApiError.
        let rows = vec![
            success_row("2025-03-01 10:00:00", Some("deepseek-chat"), 12.5),
            success_row("2025-03-01 10:01:00", Some("deepseek-chat"), 18.0),
            failure_row(
                "2025-03-01 10:02:00",
                Some("deepseek-chat"),
                "APIError: HTTP 500: boom",
            ),
        ];

        let stats = &summarize(&rows, GroupBy::All)[OVERALL_GROUP];
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.api_errors, 1);
        assert!((stats.error_rate_percent - 33.33).abs() < 0.01);
        assert!((stats.average_tps - 15.25).abs() < 1e-9);
        assert_eq!(stats.max_tps, 18.0);
        assert_eq!(stats.min_tps, 12.5);
    }

    #[test]
    fn malformed_api_error_lines_count_toward_totals() {
        let rows = vec![
            success_row("2025-03-01 10:00:00", Some("deepseek-chat"), 10.0),
            malformed_row(Some("2025-03-01 10:01:00"), true),
        ];

        let stats = &summarize(&rows, GroupBy::All)[OVERALL_GROUP];
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.api_errors, 1);
        assert!((stats.error_rate_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn error_rate_stays_bounded() {
        let all_errors = vec![
            failure_row("2025-03-01 10:00:00", None, "APIError: x"),
            malformed_row(Some("2025-03-01 10:01:00"), true),
        ];
        let stats = &summarize(&all_errors, GroupBy::All)[OVERALL_GROUP];
        assert!((stats.error_rate_percent - 100.0).abs() < 1e-9);

        let none: Vec<ReplayRow> = Vec::new();
        assert!(summarize(&none, GroupBy::All).is_empty());
    }

    #[test]
    fn group_with_no_successes_reports_zeroed_metrics() {
        let rows = vec![failure_row(
            "2025-03-01 10:00:00",
            Some("deepseek-chat"),
            "APIError: down",
        )];

        let stats = &summarize(&rows, GroupBy::All)[OVERALL_GROUP];
        assert_eq!(stats.average_tps, 0.0);
        assert_eq!(stats.max_tps, 0.0);
        assert_eq!(stats.min_tps, 0.0);
        assert_eq!(stats.first_token_latency, PercentileSet::empty());
    }

    #[test]
    fn per_model_grouping_excludes_model_less_rows() {
        let rows = vec![
            success_row("2025-03-01 10:00:00", Some("deepseek-chat"), 10.0),
            success_row("2025-03-01 10:01:00", Some("deepseek-reasoner"), 20.0),
            success_row("2025-03-01 10:02:00", None, 30.0), // historic row
            malformed_row(Some("2025-03-01 10:03:00"), true),
        ];

        let by_model = summarize(&rows, GroupBy::Model);
        assert_eq!(
            by_model.keys().cloned().collect::<Vec<_>>(),
            vec!["deepseek-chat".to_string(), "deepseek-reasoner".to_string()]
        );
        assert_eq!(by_model["deepseek-chat"].total_requests, 1);

        // The excluded rows still show up in the overall pass.
        let overall = &summarize(&rows, GroupBy::All)[OVERALL_GROUP];
        assert_eq!(overall.total_requests, 4);
    }

    #[test]
    fn classification_breakdown_is_complete() {
        let rows = vec![
            failure_row("2025-03-01 10:00:00", None, "APIError: x"),
            failure_row("2025-03-01 10:01:00", None, "ContextWindowExceeded"),
            failure_row("2025-03-01 10:02:00", None, "NoTokenProduced: empty"),
            failure_row("2025-03-01 10:03:00", None, "socket closed"),
        ];

        let stats = &summarize(&rows, GroupBy::All)[OVERALL_GROUP];
        assert_eq!(stats.api_errors, 1);
        assert_eq!(stats.context_overflow_count, 1);
        assert_eq!(stats.no_token_count, 1);
        assert_eq!(stats.other_failures, 1);
        assert_eq!(
            stats.api_errors
                + stats.context_overflow_count
                + stats.no_token_count
                + stats.other_failures,
            stats.total_requests
        );
    }

    #[test]
    fn summarize_is_idempotent() {
        let rows = vec![
            success_row("2025-03-01 10:00:00", Some("deepseek-chat"), 12.5),
            failure_row("2025-03-01 10:01:00", Some("deepseek-chat"), "APIError: x"),
            malformed_row(None, false),
        ];

        assert_eq!(
            summarize(&rows, GroupBy::All),
            summarize(&rows, GroupBy::All)
        );
        assert_eq!(
            rolling_error_rate(&rows, chrono::Duration::minutes(15)),
            rolling_error_rate(&rows, chrono::Duration::minutes(15))
        );
    }

    #[test]
    fn rolling_series_is_gap_free() {
        // 40 minutes apart with 15-minute buckets: three buckets, the
        // middle one empty.
        let rows = vec![
            success_row("2025-03-01 10:00:00", None, 10.0),
            failure_row("2025-03-01 10:40:00", None, "APIError: x"),
        ];

        let series = rolling_error_rate(&rows, chrono::Duration::minutes(15));
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].bucket_start, ts("2025-03-01 10:00:00"));
        assert_eq!(series[1].bucket_start, ts("2025-03-01 10:15:00"));
        assert_eq!(series[2].bucket_start, ts("2025-03-01 10:30:00"));

        assert_eq!(series[0].error_rate_percent, 0.0);
        assert_eq!(series[1].error_rate_percent, 0.0); // empty bucket
        assert_eq!(series[2].error_rate_percent, 100.0);

        for point in &series {
            assert!((0.0..=100.0).contains(&point.error_rate_percent));
        }
    }

    #[test]
    fn rolling_series_includes_malformed_markers() {
        let rows = vec![
            success_row("2025-03-01 10:00:00", None, 10.0),
            malformed_row(Some("2025-03-01 10:00:30"), true),
        ];

        let series = rolling_error_rate(&rows, chrono::Duration::minutes(15));
        assert_eq!(series.len(), 1);
        assert!((series[0].error_rate_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_series_of_empty_history_is_empty() {
        let rows = vec![malformed_row(None, true)];
        assert!(rolling_error_rate(&rows, chrono::Duration::minutes(15)).is_empty());
        assert!(rolling_error_rate(&[], chrono::Duration::minutes(15)).is_empty());
    }
}
