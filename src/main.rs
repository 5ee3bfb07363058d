use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod client;
mod config;
mod model;
mod probe;
mod prompt;
mod report;
mod sample;
mod sampler;
mod store;

use crate::cli::{Cli, Command, ReportArgs, RunArgs};
use crate::client::ChatClient;
use crate::config::RunConfig;
use crate::model::ModelSelector;
use crate::probe::ProbeExecutor;
use crate::prompt::RandomPrompts;
use crate::report::{render, rolling_error_rate, summarize, GroupBy};
use crate::sampler::{Sampler, StopSignal};
use crate::store::SampleStore;

/// Environment variable holding the API key.
const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Report(args) => report(args),
    }
}

// ─── run ─────────────────────────────────────────────────────────

async fn run(args: RunArgs) -> Result<()> {
    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   📡  LLM API LATENCY PROBE                      ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    if !args.hours.is_finite() || args.hours <= 0.0 || args.hours > 8760.0 {
        bail!("--hours must be between 0 and 8760");
    }

    // ── 1. Build the run configuration ───────────────────────────
    let api_key = std::env::var(API_KEY_ENV)
        .with_context(|| format!("{API_KEY_ENV} must be set"))?;

    let config = RunConfig {
        duration: Duration::from_secs_f64(args.hours * 3600.0),
        interval: Duration::from_secs(args.interval_secs),
        output: args.output,
        reasoner_ratio: args.reasoner_ratio,
        chat_model: args.chat_model,
        reasoner_model: args.reasoner_model,
        base_url: args.base_url,
        api_key,
    };
    config.validate()?;

    println!("Endpoint        → {}", config.base_url);
    println!("Store           → {}", config.output.display());
    println!(
        "Cadence         → one sample every {}s for {}h",
        args.interval_secs, args.hours
    );
    println!(
        "Models          → {} / {} (reasoner ratio {})",
        config.chat_model, config.reasoner_model, config.reasoner_ratio
    );
    println!();

    // ── 2. Wire up the engine ────────────────────────────────────
    let client = Arc::new(ChatClient::new(
        config.base_url.as_str(),
        config.api_key.as_str(),
    )?);
    let executor = ProbeExecutor::new(client, Box::new(RandomPrompts::new()));
    let selector = ModelSelector::new(config.reasoner_ratio);
    let store = SampleStore::open(&config.output)?;

    // ── 3. Cooperative shutdown on Ctrl-C ────────────────────────
    let stop = StopSignal::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt received, finishing the in-flight sample...");
                stop.trigger();
            }
        }
    });

    // ── 4. Sample until the deadline ─────────────────────────────
    let written = Sampler::new(config, executor, selector, store, stop)
        .run()
        .await?;

    println!();
    println!("Run complete — {written} samples written.");
    Ok(())
}

// ─── report ──────────────────────────────────────────────────────

fn report(args: ReportArgs) -> Result<()> {
    let rows = store::replay(&args.input)?;

    let group_by = if args.per_model {
        GroupBy::Model
    } else {
        GroupBy::All
    };
    let groups = summarize(&rows, group_by);
    let rolling =
        rolling_error_rate(&rows, chrono::Duration::minutes(args.bucket_mins.max(1)));

    if args.json {
        println!("{}", render::to_json(&groups, &rolling)?);
    } else {
        render::print_summary(&groups);
        render::print_rolling_overview(&rolling);
    }

    Ok(())
}
