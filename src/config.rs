use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::model::ModelKind;

/// Everything one sampling run needs, owned explicitly — no ambient
/// globals. Built from the CLI surface plus the environment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Total wall-clock run length.
    pub duration: Duration,
    /// Sleep between samples.
    pub interval: Duration,
    /// Append target for the sample store.
    pub output: PathBuf,
    /// Probability of probing the reasoner variant on any iteration.
    pub reasoner_ratio: f64,
    /// API identifier per model kind, fixed at configuration time.
    pub chat_model: String,
    pub reasoner_model: String,
    /// OpenAI-compatible endpoint base, e.g. "https://api.deepseek.com".
    pub base_url: String,
    pub api_key: String,
}

impl RunConfig {
    pub fn model_id(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Chat => &self.chat_model,
            ModelKind::Reasoner => &self.reasoner_model,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reasoner_ratio) {
            bail!("reasoner ratio must be between 0.0 and 1.0");
        }
        if self.duration.is_zero() {
            bail!("run duration must be positive");
        }
        if self.api_key.is_empty() {
            bail!("API key must not be empty");
        }
        Ok(())
    }
}
