use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The backend variants a run can probe. Fixed at configuration time;
/// the concrete API identifier for each kind lives in `RunConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Chat,
    Reasoner,
}

/// Stateless-per-iteration weighted draw: each call is an independent
/// Bernoulli trial with the configured reasoner probability.
pub struct ModelSelector {
    reasoner_ratio: f64,
    rng: StdRng,
}

impl ModelSelector {
    /// `reasoner_ratio` must be in `0.0..=1.0` (validated by config).
    pub fn new(reasoner_ratio: f64) -> Self {
        Self {
            reasoner_ratio,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(reasoner_ratio: f64, seed: u64) -> Self {
        Self {
            reasoner_ratio,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn choose(&mut self) -> ModelKind {
        if self.rng.gen_bool(self.reasoner_ratio) {
            ModelKind::Reasoner
        } else {
            ModelKind::Chat
        }
    }
}
