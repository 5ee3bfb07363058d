use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 ms → 1 hour, 3 significant figures. Probe
/// latencies live in the hundreds-of-ms to minutes band.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000;
const HIST_SIGFIG: u8 = 3;

/// A percentile breakdown for one latency series, in milliseconds.
/// Serialized straight into the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Extract a full percentile set from a histogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used when a group has no successes.
    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            count: 0,
        }
    }
}

/// Fresh histogram sized for millisecond latencies.
pub fn latency_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_yields_zeroes() {
        let hist = latency_histogram();
        assert_eq!(PercentileSet::from_histogram(&hist), PercentileSet::empty());
    }

    #[test]
    fn percentiles_order_sensibly() {
        let mut hist = latency_histogram();
        for v in [100u64, 200, 300, 400, 5000] {
            hist.record(v).unwrap();
        }

        let set = PercentileSet::from_histogram(&hist);
        assert_eq!(set.count, 5);
        assert!(set.min <= set.p50);
        assert!(set.p50 <= set.p95);
        assert!(set.p95 <= set.p99);
        assert!(set.p99 <= set.max);
    }
}
