//! Threshold and top-N selection over a sample set.

use std::cmp::Ordering;

use crate::config::Config;
use crate::model::{ProcessSample, SampleSet};

/// Applies the configured thresholds, then the top-N limit.
///
/// Thresholds are inclusive: a sample exactly at `min_rss_bytes` or
/// `min_cpu_percent` is kept. With `top_n == 0` the surviving samples keep
/// their input order; otherwise they are ordered by CPU percent descending,
/// ties broken by RSS descending, and truncated to `top_n`.
pub fn apply(samples: SampleSet, config: &Config) -> SampleSet {
    let mut kept: SampleSet = samples
        .into_iter()
        .filter(|s| passes_thresholds(s, config))
        .collect();

    if config.top_n > 0 {
        // Stable sort keeps input order for full ties.
        kept.sort_by(by_usage_desc);
        kept.truncate(config.top_n);
    }

    kept
}

fn passes_thresholds(sample: &ProcessSample, config: &Config) -> bool {
    sample.rss_bytes >= config.min_rss_bytes && sample.cpu_percent >= config.min_cpu_percent
}

/// Orders by CPU percent descending, then RSS descending.
pub fn by_usage_desc(a: &ProcessSample, b: &ProcessSample) -> Ordering {
    b.cpu_percent
        .total_cmp(&a.cpu_percent)
        .then_with(|| b.rss_bytes.cmp(&a.rss_bytes))
}
