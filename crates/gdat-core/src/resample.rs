//! Irregular samples -> uniform grid starting at t = 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{Channel, Sample};

/// Step selection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Upper bound applied to the observed modal step.
    pub max_step_ms: u32,
    /// Step used when a channel has no positive timestamp delta.
    pub default_step_ms: u32,
    /// The chosen step is rounded up until it divides this period.
    pub rate_base_ms: u32,
    /// Largest grid a single channel may produce.
    pub max_grid_len: u32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            max_step_ms: 100,
            default_step_ms: 100,
            rate_base_ms: 1000,
            max_grid_len: 20_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResampleError {
    #[error("grid of {len} points at {delta_ms} ms exceeds limit {limit}")]
    GridTooLong { len: u32, delta_ms: u32, limit: u32 },
}

/// Uniformly spaced view of a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resampled {
    pub delta_ms: u32,
    pub frequency_hz: u32,
    pub t_grid: Vec<u32>,
    pub v_interp: Vec<f64>,
}

impl Resampled {
    pub fn len(&self) -> usize {
        self.t_grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t_grid.is_empty()
    }

    /// Minimum and maximum of the interpolated values.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let first = *self.v_interp.first()?;
        Some(
            self.v_interp
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

/// Grid step for timestamp-sorted `samples`.
///
/// Takes the most frequent positive delta (smallest wins ties), caps it at
/// `max_step_ms` and `rate_base_ms`, then rounds up until it divides
/// `rate_base_ms`.
///
/// # Examples
/// ```
/// use gdat_core::{ResampleConfig, Sample, select_step_ms};
///
/// let samples: Vec<Sample> = [0, 7, 14, 21]
///     .into_iter()
///     .map(|timestamp_ms| Sample { timestamp_ms, value: 0.0 })
///     .collect();
/// // 7 ms does not divide 1000 ms; the next step that does is 8 ms.
/// assert_eq!(select_step_ms(&samples, &ResampleConfig::default()), 8);
/// ```
pub fn select_step_ms(samples: &[Sample], config: &ResampleConfig) -> u32 {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for pair in samples.windows(2) {
        let delta = pair[1].timestamp_ms.saturating_sub(pair[0].timestamp_ms);
        if delta > 0 {
            *counts.entry(delta).or_default() += 1;
        }
    }

    // Ascending keys: keep the first delta reaching the highest count.
    let mut modal: Option<(u32, usize)> = None;
    for (delta, count) in counts {
        if modal.is_none_or(|(_, best)| count > best) {
            modal = Some((delta, count));
        }
    }

    let mut step = modal
        .map(|(delta, _)| delta)
        .unwrap_or(config.default_step_ms)
        .min(config.max_step_ms)
        .min(config.rate_base_ms)
        .max(1);
    while config.rate_base_ms % step != 0 {
        step += 1;
    }
    step
}

/// Piecewise-linear value at `t`, flat beyond the first and last sample.
pub fn interpolate(samples: &[Sample], t: u32) -> Option<f64> {
    let first = samples.first()?;
    let last = samples.last()?;
    if t <= first.timestamp_ms {
        return Some(first.value);
    }
    if t >= last.timestamp_ms {
        return Some(last.value);
    }

    let upper = samples.partition_point(|s| s.timestamp_ms <= t);
    let (lo, hi) = (&samples[upper - 1], &samples[upper]);
    let span = (hi.timestamp_ms - lo.timestamp_ms) as f64;
    let frac = (t - lo.timestamp_ms) as f64 / span;
    Some(lo.value + (hi.value - lo.value) * frac)
}

/// Fill `channel.resampled` from its sorted samples. On error the channel
/// is left without a grid.
pub fn resample(channel: &mut Channel, config: &ResampleConfig) -> Result<(), ResampleError> {
    channel.resampled = Some(resample_samples(&channel.samples, config)?);
    Ok(())
}

pub fn resample_samples(
    samples: &[Sample],
    config: &ResampleConfig,
) -> Result<Resampled, ResampleError> {
    let delta_ms = select_step_ms(samples, config);
    let t_max = samples.last().map_or(0, |s| s.timestamp_ms);
    let count = t_max / delta_ms;
    if count > config.max_grid_len {
        return Err(ResampleError::GridTooLong {
            len: count,
            delta_ms,
            limit: config.max_grid_len,
        });
    }

    let t_grid: Vec<u32> = (0..count).map(|k| k * delta_ms).collect();
    let v_interp = t_grid
        .iter()
        .filter_map(|&t| interpolate(samples, t))
        .collect();

    Ok(Resampled {
        delta_ms,
        frequency_hz: config.rate_base_ms / delta_ms,
        t_grid,
        v_interp,
    })
}

#[cfg(test)]
mod tests {
    use super::{ResampleConfig, ResampleError, interpolate, resample_samples, select_step_ms};
    use crate::channel::Sample;

    fn samples(points: &[(u32, f64)]) -> Vec<Sample> {
        points
            .iter()
            .map(|&(timestamp_ms, value)| Sample {
                timestamp_ms,
                value,
            })
            .collect()
    }

    fn timestamps(ts: &[u32]) -> Vec<Sample> {
        samples(&ts.iter().map(|&t| (t, 0.0)).collect::<Vec<_>>())
    }

    #[test]
    fn modal_delta_wins() {
        let config = ResampleConfig::default();
        assert_eq!(select_step_ms(&timestamps(&[0, 10, 20, 30, 45]), &config), 10);
    }

    #[test]
    fn ties_pick_smallest_delta() {
        let config = ResampleConfig::default();
        assert_eq!(select_step_ms(&timestamps(&[0, 20, 25, 45, 50]), &config), 5);
    }

    #[test]
    fn single_sample_uses_default_step() {
        let config = ResampleConfig::default();
        assert_eq!(select_step_ms(&timestamps(&[42]), &config), 100);
        assert_eq!(select_step_ms(&timestamps(&[42, 42, 42]), &config), 100);
    }

    #[test]
    fn large_deltas_are_capped() {
        let config = ResampleConfig::default();
        assert_eq!(select_step_ms(&timestamps(&[0, 500, 1000]), &config), 100);
    }

    #[test]
    fn step_rounds_up_to_divisor_of_rate_base() {
        let config = ResampleConfig::default();
        assert_eq!(select_step_ms(&timestamps(&[0, 3, 6, 9]), &config), 4);
        assert_eq!(select_step_ms(&timestamps(&[0, 30, 60]), &config), 40);
        assert_eq!(select_step_ms(&timestamps(&[0, 60, 120]), &config), 100);
    }

    #[test]
    fn interpolation_clamps_and_blends() {
        let points = samples(&[(10, 1.0), (20, 3.0), (30, -1.0)]);
        assert_eq!(interpolate(&points, 0), Some(1.0));
        assert_eq!(interpolate(&points, 15), Some(2.0));
        assert_eq!(interpolate(&points, 20), Some(3.0));
        assert_eq!(interpolate(&points, 25), Some(1.0));
        assert_eq!(interpolate(&points, 99), Some(-1.0));
        assert_eq!(interpolate(&[], 5), None);
    }

    #[test]
    fn interpolation_handles_duplicate_timestamps() {
        let points = samples(&[(0, 0.0), (10, 1.0), (10, 5.0), (20, 5.0)]);
        assert_eq!(interpolate(&points, 10), Some(5.0));
        assert_eq!(interpolate(&points, 5), Some(0.5));
    }

    #[test]
    fn grid_excludes_final_multiple() {
        let points = samples(&[(0, 0.0), (10, 10.0), (20, 20.0), (30, 30.0), (35, 35.0)]);
        let resampled = resample_samples(&points, &ResampleConfig::default()).unwrap();
        assert_eq!(resampled.delta_ms, 10);
        assert_eq!(resampled.frequency_hz, 100);
        assert_eq!(resampled.t_grid, vec![0, 10, 20]);
        assert_eq!(resampled.v_interp, vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn grid_is_empty_when_span_is_below_one_step() {
        let resampled = resample_samples(&samples(&[(1, 10.0)]), &ResampleConfig::default()).unwrap();
        assert_eq!(resampled.delta_ms, 100);
        assert!(resampled.is_empty());
        assert_eq!(resampled.value_range(), None);
    }

    #[test]
    fn step_never_exceeds_rate_base() {
        let config = ResampleConfig {
            max_step_ms: 2000,
            ..ResampleConfig::default()
        };
        assert_eq!(select_step_ms(&timestamps(&[0, 1500, 3000]), &config), 1000);

        let config = ResampleConfig {
            default_step_ms: 5000,
            max_step_ms: 5000,
            rate_base_ms: 40,
            ..ResampleConfig::default()
        };
        assert_eq!(select_step_ms(&timestamps(&[7]), &config), 40);
        assert_eq!(select_step_ms(&timestamps(&[0, 30, 60]), &config), 40);
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let points = samples(&[(u32::MAX - 1, 1.0), (u32::MAX, 2.0)]);
        let err = resample_samples(&points, &ResampleConfig::default()).unwrap_err();
        assert_eq!(
            err,
            ResampleError::GridTooLong {
                len: u32::MAX,
                delta_ms: 1,
                limit: 20_000_000,
            }
        );

        let config = ResampleConfig {
            max_grid_len: 3,
            ..ResampleConfig::default()
        };
        let points = samples(&[(0, 0.0), (10, 1.0), (20, 2.0), (30, 3.0)]);
        assert_eq!(resample_samples(&points, &config).unwrap().len(), 3);
        let points = samples(&[(0, 0.0), (10, 1.0), (20, 2.0), (30, 3.0), (40, 4.0)]);
        assert!(resample_samples(&points, &config).is_err());
    }
}
