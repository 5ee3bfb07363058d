use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "llm-probe", about = "Long-running latency probe for an OpenAI-compatible chat API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Continuously probe the API, appending one sample per interval
    Run(RunArgs),
    /// Replay a sample store and print aggregate statistics
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Total run duration in hours
    #[arg(long, default_value_t = 72.0)]
    pub hours: f64,

    /// Seconds to sleep between samples
    #[arg(long, default_value_t = 60)]
    pub interval_secs: u64,

    /// Sample store target
    #[arg(long, default_value = "probe_samples.csv")]
    pub output: PathBuf,

    /// Probability (0.0-1.0) of probing the reasoner variant
    #[arg(long, default_value_t = 0.0)]
    pub reasoner_ratio: f64,

    /// OpenAI-compatible endpoint base URL
    #[arg(long, default_value = "https://api.deepseek.com")]
    pub base_url: String,

    /// Model id for the default chat variant
    #[arg(long, default_value = "deepseek-chat")]
    pub chat_model: String,

    /// Model id for the reasoner variant
    #[arg(long, default_value = "deepseek-reasoner")]
    pub reasoner_model: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Sample store to replay
    #[arg(long, default_value = "probe_samples.csv")]
    pub input: PathBuf,

    /// Group statistics per model instead of one overall group
    #[arg(long)]
    pub per_model: bool,

    /// Rolling error-rate bucket width in minutes
    #[arg(long, default_value_t = crate::report::DEFAULT_BUCKET_MINS)]
    pub bucket_mins: i64,

    /// Emit statistics and the rolling series as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["llm-probe", "run"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.hours, 72.0);
                assert_eq!(args.interval_secs, 60);
                assert_eq!(args.output, PathBuf::from("probe_samples.csv"));
                assert_eq!(args.reasoner_ratio, 0.0);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn report_flags_parse() {
        let cli = Cli::parse_from([
            "llm-probe",
            "report",
            "--input",
            "old.csv",
            "--per-model",
            "--bucket-mins",
            "30",
            "--json",
        ]);
        match cli.command {
            Command::Report(args) => {
                assert_eq!(args.input, PathBuf::from("old.csv"));
                assert!(args.per_model);
                assert_eq!(args.bucket_mins, 30);
                assert!(args.json);
            }
            _ => panic!("expected report"),
        }
    }
}
