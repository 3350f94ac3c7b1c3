//! Fixed-point packing of resampled series.
//!
//! A channel is stored as integers plus a `(shift, scalar, divisor)` triple:
//!
//! ```text
//! encoded = value / 10^(-shift) / scalar * divisor
//! value   = encoded * 10^(-shift) * scalar / divisor
//! ```
//!
//! The general search picks the decade `exp` with
//! `8·10^exp <= abs_max < 8·10^(exp+1)`, sets `shift = 6 - exp` and
//! approximates `abs_max / (8·10^exp)` by `scalar / divisor` with both terms
//! bounded, so the largest magnitude encodes near `8·10^6`. Near-constant
//! series skip the search and use `scalar = divisor = 1` with a decimal
//! shift only.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::channel::Channel;
use crate::resample::ResampleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    /// Maximum relative round-trip error of the general search.
    pub tolerance: f64,
    /// Maximum relative round-trip error of the near-constant branch.
    pub constant_tolerance: f64,
    /// Bound on `|scalar|` and `|divisor|`.
    pub ratio_bound: i16,
    /// Bound on `|encoded|`.
    pub encoded_limit: i32,
    /// Leading digit of the target peak magnitude.
    pub target_mantissa: f64,
    /// Decimal shift when `exp == 0`; the target peak is
    /// `target_mantissa · 10^base_shift`.
    pub base_shift: i32,
    pub min_exponent: i32,
    pub max_exponent: i32,
    /// Series whose value range is at most this are near-constant.
    pub range_epsilon: f64,
    /// Relative error denominators are at least
    /// `max(relative_floor · abs_max, range_epsilon)`.
    pub relative_floor: f64,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.10,
            constant_tolerance: 1e-5,
            ratio_bound: 2047,
            encoded_limit: 8_388_607,
            target_mantissa: 8.0,
            base_shift: 6,
            min_exponent: -37,
            max_exponent: 37,
            range_epsilon: 1e-9,
            relative_floor: 1e-6,
        }
    }
}

impl QuantizerConfig {
    fn target_peak(&self) -> f64 {
        self.target_mantissa * 10f64.powi(self.base_shift)
    }

    fn shift_bounds(&self) -> (i32, i32) {
        (
            self.base_shift - self.max_exponent,
            self.base_shift - self.min_exponent,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantizeError {
    #[error("channel has not been resampled")]
    NotResampled,
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("non-finite value {value} at grid index {index}")]
    NonFinite { index: usize, value: f64 },
    #[error("magnitude {abs_max} outside the searchable exponent range")]
    OutOfRange { abs_max: f64 },
    #[error("no bounded rational approximation for {ratio}")]
    NoRationalApproximation { ratio: f64 },
    #[error("encoded value {encoded} exceeds limit {limit}")]
    EncodedOverflow { encoded: f64, limit: i32 },
    #[error("round-trip error {error} exceeds tolerance {tolerance}")]
    ToleranceExceeded { error: f64, tolerance: f64 },
}

/// The `(shift, scalar, divisor)` triple.
///
/// # Examples
/// ```
/// use gdat_core::Scaling;
///
/// let scaling = Scaling { shift: 2, scalar: 5, divisor: 2 };
/// assert_eq!(scaling.encode(12.5), 500.0);
/// assert_eq!(scaling.decode(500), 12.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scaling {
    pub shift: i32,
    pub scalar: i16,
    pub divisor: i16,
}

impl Scaling {
    pub const IDENTITY: Scaling = Scaling {
        shift: 0,
        scalar: 1,
        divisor: 1,
    };

    /// Forward transform before rounding.
    pub fn encode(&self, value: f64) -> f64 {
        value / 10f64.powi(-self.shift) / self.scalar as f64 * self.divisor as f64
    }

    pub fn decode(&self, encoded: i32) -> f64 {
        encoded as f64 * 10f64.powi(-self.shift) * self.scalar as f64 / self.divisor as f64
    }
}

/// Quantized representation of a resampled series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantized {
    pub scaling: Scaling,
    pub v_quantized: Vec<i32>,
    /// Largest measured relative round-trip error.
    pub max_error: f64,
    pub near_constant: bool,
}

impl Quantized {
    pub fn dequantize(&self) -> Vec<f64> {
        self.v_quantized
            .iter()
            .map(|&encoded| self.scaling.decode(encoded))
            .collect()
    }
}

/// A channel whose series could not be packed. The channel itself, with its
/// samples and resampled series, is handed back untouched.
#[derive(Debug, Error)]
#[error("quantization failed for channel {id} (min {v_min}, max {v_max}): {reason}")]
pub struct QuantizationFailure {
    pub id: u16,
    pub v_min: f64,
    pub v_max: f64,
    #[source]
    pub reason: QuantizeError,
    channel: Box<Channel>,
}

impl QuantizationFailure {
    pub(crate) fn new(channel: Channel, reason: QuantizeError) -> Self {
        let (v_min, v_max) = channel
            .resampled
            .as_ref()
            .and_then(|r| r.value_range())
            .or_else(|| channel.stats.map(|s| (s.v_min, s.v_max)))
            .unwrap_or((f64::NAN, f64::NAN));
        warn!(id = channel.id, v_min, v_max, %reason, "channel quantization failed");
        Self {
            id: channel.id,
            v_min,
            v_max,
            reason,
            channel: Box::new(channel),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn into_channel(self) -> Channel {
        *self.channel
    }
}

/// Quantize `channel.resampled` into `channel.quantized`.
pub fn quantize(mut channel: Channel, config: &QuantizerConfig) -> Result<Channel, QuantizationFailure> {
    let result = match &channel.resampled {
        Some(resampled) => quantize_series(&resampled.v_interp, config),
        None => Err(QuantizeError::NotResampled),
    };
    match result {
        Ok(quantized) => {
            channel.quantized = Some(quantized);
            Ok(channel)
        }
        Err(reason) => Err(QuantizationFailure::new(channel, reason)),
    }
}

/// Pick a scaling for `values`, encode them and verify the round trip.
pub fn quantize_series(values: &[f64], config: &QuantizerConfig) -> Result<Quantized, QuantizeError> {
    if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(QuantizeError::NonFinite { index, value });
    }
    let Some(&first) = values.first() else {
        return Ok(Quantized {
            scaling: Scaling::IDENTITY,
            v_quantized: Vec::new(),
            max_error: 0.0,
            near_constant: true,
        });
    };

    let (v_min, v_max) = values
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let abs_max = v_min.abs().max(v_max.abs());
    let near_constant = v_max - v_min <= config.range_epsilon;

    let (scaling, tolerance) = if near_constant {
        (constant_scaling(abs_max, config), config.constant_tolerance)
    } else {
        (general_scaling(abs_max, config)?, config.tolerance)
    };

    let limit = config.encoded_limit as f64;
    let mut v_quantized = Vec::with_capacity(values.len());
    for &value in values {
        let encoded = scaling.encode(value).round();
        if encoded.abs() > limit {
            return Err(QuantizeError::EncodedOverflow {
                encoded,
                limit: config.encoded_limit,
            });
        }
        v_quantized.push(encoded as i32);
    }

    let floor = (config.relative_floor * abs_max).max(config.range_epsilon);
    let max_error = values
        .iter()
        .zip(&v_quantized)
        .map(|(&value, &encoded)| (scaling.decode(encoded) - value).abs() / value.abs().max(floor))
        .fold(0.0, f64::max);
    if max_error > tolerance {
        return Err(QuantizeError::ToleranceExceeded {
            error: max_error,
            tolerance,
        });
    }

    Ok(Quantized {
        scaling,
        v_quantized,
        max_error,
        near_constant,
    })
}

fn general_scaling(abs_max: f64, config: &QuantizerConfig) -> Result<Scaling, QuantizeError> {
    let decade = |exp: i32| config.target_mantissa * 10f64.powi(exp);
    let exp = (config.min_exponent..=config.max_exponent)
        .find(|&exp| decade(exp) <= abs_max && abs_max < decade(exp + 1))
        .ok_or(QuantizeError::OutOfRange { abs_max })?;

    let scf = decade(exp) / abs_max;
    let ratio = 1.0 / scf;
    let (scalar, divisor) = best_rational(ratio, config.ratio_bound.max(0) as u32)
        .filter(|&(p, q)| ((p as f64 / q as f64) - ratio).abs() / ratio <= config.tolerance)
        .ok_or(QuantizeError::NoRationalApproximation { ratio })?;

    Ok(Scaling {
        shift: config.base_shift - exp,
        scalar: scalar as i16,
        divisor: divisor as i16,
    })
}

/// Largest decimal shift keeping `abs_max` at or below the target peak.
fn constant_scaling(abs_max: f64, config: &QuantizerConfig) -> Scaling {
    if abs_max == 0.0 {
        return Scaling::IDENTITY;
    }
    let (min_shift, max_shift) = config.shift_bounds();
    let target = config.target_peak();
    let fits = |shift: i32| abs_max * 10f64.powi(shift) <= target;

    let estimate = (target / abs_max).log10().floor();
    let mut shift = if estimate.is_finite() {
        (estimate as i32).clamp(min_shift, max_shift)
    } else {
        max_shift
    };
    while shift > min_shift && !fits(shift) {
        shift -= 1;
    }
    while shift < max_shift && fits(shift + 1) {
        shift += 1;
    }

    Scaling {
        shift,
        scalar: 1,
        divisor: 1,
    }
}

/// Closest fraction `p/q` to `x` with `1 <= q <= bound` and `p <= bound`.
///
/// Walks the continued-fraction convergents of `x` and, at the first one
/// that would break the bound, also considers the best semiconvergent.
/// Returns `None` for non-positive or non-finite `x`, or when the closest
/// bounded fraction is zero.
///
/// # Examples
/// ```
/// use gdat_core::best_rational;
///
/// assert_eq!(best_rational(0.75, 2047), Some((3, 4)));
/// assert_eq!(best_rational(std::f64::consts::PI, 200), Some((179, 57)));
/// assert_eq!(best_rational(1e-9, 2047), None);
/// ```
pub fn best_rational(x: f64, bound: u32) -> Option<(u32, u32)> {
    if !x.is_finite() || x <= 0.0 || bound == 0 {
        return None;
    }
    let bound = bound as u64;

    // (h, k) is the latest convergent, (h_prev, k_prev) the one before.
    let (mut h_prev, mut h) = (0u64, 1u64);
    let (mut k_prev, mut k) = (1u64, 0u64);
    let mut frac = x;

    for _ in 0..64 {
        let whole = frac.floor();
        let a = if whole > bound as f64 {
            bound + 1
        } else {
            whole as u64
        };
        let h_next = a * h + h_prev;
        let k_next = a * k + k_prev;

        if h_next > bound || k_next > bound {
            let t_h = (bound - h_prev).checked_div(h).unwrap_or(u64::MAX);
            let t_k = (bound - k_prev).checked_div(k).unwrap_or(u64::MAX);
            let t = t_h.min(t_k).min(a.saturating_sub(1));
            if t >= 1 {
                let semi = (t * h + h_prev, t * k + k_prev);
                if k == 0 || distance(x, semi) < distance(x, (h, k)) {
                    h = semi.0;
                    k = semi.1;
                }
            }
            break;
        }

        h_prev = h;
        h = h_next;
        k_prev = k;
        k = k_next;

        let rem = frac - whole;
        if rem <= f64::EPSILON * frac.max(1.0) {
            break;
        }
        frac = 1.0 / rem;
    }

    if h == 0 || k == 0 {
        return None;
    }
    Some((h as u32, k as u32))
}

fn distance(x: f64, (p, q): (u64, u64)) -> f64 {
    (x - p as f64 / q as f64).abs()
}
