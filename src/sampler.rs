use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Local, Timelike};
use tokio::sync::Notify;

use crate::config::RunConfig;
use crate::model::ModelSelector;
use crate::probe::ProbeExecutor;
use crate::sample::{Outcome, SampleRecord};
use crate::store::SampleStore;

// ─── Cooperative stop ────────────────────────────────────────────

/// Operator-issued stop request. Checked only at iteration boundaries;
/// an in-flight probe and its append always complete, so no partial
/// record is ever persisted.
pub struct StopSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a trigger that lands mid-probe
        // still cuts the following sleep short.
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

// ─── Scheduler loop ──────────────────────────────────────────────

/// Drives the probe executor at a fixed cadence for a bounded total
/// duration: one probe in flight at a time, every outcome appended and
/// flushed before the inter-iteration sleep.
pub struct Sampler {
    config: RunConfig,
    executor: ProbeExecutor,
    selector: ModelSelector,
    store: SampleStore,
    stop: Arc<StopSignal>,
}

impl Sampler {
    pub fn new(
        config: RunConfig,
        executor: ProbeExecutor,
        selector: ModelSelector,
        store: SampleStore,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            config,
            executor,
            selector,
            store,
            stop,
        }
    }

    /// Run until the deadline or an operator stop. Returns the number
    /// of samples written. A store append failure is fatal to the run.
    pub async fn run(mut self) -> Result<u64> {
        let deadline = Instant::now() + self.config.duration;
        let mut written: u64 = 0;

        while !self.stop.is_triggered() && Instant::now() < deadline {
            let timestamp = second_resolution(Local::now().naive_local());
            let kind = self.selector.choose();
            let model_id = self.config.model_id(kind).to_string();

            let outcome = self.executor.run_probe(&model_id).await;
            report_outcome(&timestamp, &model_id, &outcome);

            let record = SampleRecord {
                timestamp,
                model: Some(model_id),
                outcome,
            };
            self.store
                .append(&record)
                .context("durable append failed, terminating run")?;
            written += 1;

            // Sleep the configured interval, but wake early on a stop
            // request so the operator is not left waiting out a cycle.
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = self.stop.wait() => {}
            }
        }

        Ok(written)
    }
}

/// The store format carries second resolution; keep the in-memory
/// record identical to its durable form.
fn second_resolution(ts: chrono::NaiveDateTime) -> chrono::NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Operator-facing per-sample line, plus structured logging for
/// failures. The loop keeps sampling after any single failure.
fn report_outcome(
    timestamp: &chrono::NaiveDateTime,
    model_id: &str,
    outcome: &Outcome,
) {
    let ts = timestamp.format(crate::sample::TIMESTAMP_FORMAT);
    match outcome {
        Outcome::Success {
            first_token_latency_ms,
            total_latency_ms,
            tokens_per_second,
            completion_tokens,
            prompt_tokens,
        } => {
            println!(
                "{ts}  {model_id}  first token: {first_token_latency_ms:.2}ms, \
                 total: {total_latency_ms:.2}ms, tps: {tokens_per_second:.2}, \
                 completion: {completion_tokens}, prompt: {prompt_tokens}"
            );
        }
        Outcome::Failure { kind, detail } => {
            let short: String = detail.chars().take(160).collect();
            println!("{ts}  {model_id}  \x1b[31m{kind:?}\x1b[0m  {short}");
            tracing::warn!(model = model_id, ?kind, detail = %detail, "probe failed");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
