use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Pluggable prompt source. The probe treats the text as opaque input;
/// no contract on content or length distribution.
pub trait PromptSource: Send {
    fn next_prompt(&mut self) -> String;
}

// ─── Log-uniform random prompts ──────────────────────────────────

/// Printable ASCII pool the generator draws from.
const CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 \
      !\"#$%&'()*+-./:;<=>?@[]^_`{|}~";

const MIN_LEN: usize = 10;
const MAX_LEN: usize = 1_000_000;

/// Random ASCII prompts with log-uniform length between 10 characters
/// and one million. The heavy tail deliberately pushes some probes past
/// the model's context window so overflow handling gets exercised in
/// real runs.
pub struct RandomPrompts {
    rng: StdRng,
}

impl RandomPrompts {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPrompts {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptSource for RandomPrompts {
    fn next_prompt(&mut self) -> String {
        let log_len = self
            .rng
            .gen_range((MIN_LEN as f64).ln()..=(MAX_LEN as f64).ln());
        let len = (log_len.exp() as usize).clamp(MIN_LEN, MAX_LEN);

        (0..len)
            .map(|_| CHARSET[self.rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_length_stays_in_bounds() {
        let mut source = RandomPrompts::with_seed(42);
        for _ in 0..50 {
            let len = source.next_prompt().len();
            assert!((MIN_LEN..=MAX_LEN).contains(&len), "len = {len}");
        }
    }

    #[test]
    fn prompt_lengths_vary_log_uniformly() {
        let mut source = RandomPrompts::with_seed(42);
        let lens: Vec<_> = (0..100).map(|_| source.next_prompt().len()).collect();
        // A log-uniform draw should produce both short and long prompts.
        assert!(lens.iter().any(|&l| l < 1_000));
        assert!(lens.iter().any(|&l| l > 10_000));
    }

    #[test]
    fn prompts_are_ascii() {
        let mut source = RandomPrompts::with_seed(1);
        assert!(source.next_prompt().is_ascii());
    }
}
