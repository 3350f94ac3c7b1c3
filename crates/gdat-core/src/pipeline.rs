//! File-level driver: preamble, decode, resample, quantize.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::channel::Channel;
use crate::decode::{DecodeOutcome, ErrorCounts, decode, decode_sharded};
use crate::preamble::{Preamble, split_preamble};
use crate::quantize::{QuantizationFailure, QuantizeError, QuantizerConfig, quantize};
use crate::registry::ParameterRegistry;
use crate::resample::{ResampleConfig, resample};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed pipeline config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pipeline config: {0}")]
    Config(#[from] ConfigError),
}

/// A pipeline setting outside its usable range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("{field} ({value} ms) exceeds rate_base_ms ({rate_base_ms} ms)")]
    StepAboveRateBase {
        field: &'static str,
        value: u32,
        rate_base_ms: u32,
    },
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("min_exponent {min} is above max_exponent {max}")]
    ExponentRange { min: i32, max: i32 },
}

/// Knobs for one run. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub resample: ResampleConfig,
    pub quantize: QuantizerConfig,
    /// Decode shards; `1` decodes sequentially.
    pub shards: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resample: ResampleConfig::default(),
            quantize: QuantizerConfig::default(),
            shards: 1,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Reject settings the resampler or quantizer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resample = &self.resample;
        let counts = [
            ("shards", self.shards as u64),
            ("rate_base_ms", resample.rate_base_ms as u64),
            ("max_step_ms", resample.max_step_ms as u64),
            ("default_step_ms", resample.default_step_ms as u64),
            ("max_grid_len", resample.max_grid_len as u64),
            ("ratio_bound", self.quantize.ratio_bound.max(0) as u64),
            ("encoded_limit", self.quantize.encoded_limit.max(0) as u64),
        ];
        if let Some(&(field, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { field });
        }
        for (field, value) in [
            ("max_step_ms", resample.max_step_ms),
            ("default_step_ms", resample.default_step_ms),
        ] {
            if value > resample.rate_base_ms {
                return Err(ConfigError::StepAboveRateBase {
                    field,
                    value,
                    rate_base_ms: resample.rate_base_ms,
                });
            }
        }

        let quantize = &self.quantize;
        for (field, value) in [
            ("tolerance", quantize.tolerance),
            ("constant_tolerance", quantize.constant_tolerance),
            ("target_mantissa", quantize.target_mantissa),
            ("range_epsilon", quantize.range_epsilon),
            ("relative_floor", quantize.relative_floor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if quantize.min_exponent > quantize.max_exponent {
            return Err(ConfigError::ExponentRange {
                min: quantize.min_exponent,
                max: quantize.max_exponent,
            });
        }
        Ok(())
    }
}

/// A channel that kept its samples but got no quantized series.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedChannel {
    pub id: u16,
    pub v_min: f64,
    pub v_max: f64,
    pub reason: QuantizeError,
}

/// Everything recovered from one `.gdat` buffer.
#[derive(Debug, Clone)]
pub struct Capture {
    pub preamble: Option<Preamble>,
    pub input_bytes: u64,
    pub packets_seen: u64,
    pub packets_valid: u64,
    pub decode_errors: u64,
    pub errors: ErrorCounts,
    /// Every non-empty channel; `quantized` is `None` for the ids listed in
    /// `failures`, and `resampled` too when the grid was rejected.
    pub channels: BTreeMap<u16, Channel>,
    pub failures: Vec<FailedChannel>,
}

impl Capture {
    pub fn has_problems(&self) -> bool {
        self.decode_errors > 0 || !self.failures.is_empty()
    }
}

/// Resample then quantize every channel in parallel.
///
/// Failed channels stay in the returned map without a quantized series.
pub fn process(
    channels: BTreeMap<u16, Channel>,
    config: &PipelineConfig,
) -> (BTreeMap<u16, Channel>, Vec<FailedChannel>) {
    let results: Vec<_> = channels
        .into_par_iter()
        .map(|(_, channel)| process_channel(channel, config))
        .collect();

    let mut processed = BTreeMap::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(channel) => {
                processed.insert(channel.id, channel);
            }
            Err(failure) => {
                failures.push(FailedChannel {
                    id: failure.id,
                    v_min: failure.v_min,
                    v_max: failure.v_max,
                    reason: failure.reason.clone(),
                });
                let channel = failure.into_channel();
                processed.insert(channel.id, channel);
            }
        }
    }
    (processed, failures)
}

fn process_channel(mut channel: Channel, config: &PipelineConfig) -> Result<Channel, QuantizationFailure> {
    if let Err(err) = resample(&mut channel, &config.resample) {
        return Err(QuantizationFailure::new(channel, err.into()));
    }
    quantize(channel, &config.quantize)
}

/// Run the whole pipeline over an in-memory file image.
pub fn decode_bytes(bytes: &[u8], registry: &ParameterRegistry, config: &PipelineConfig) -> Capture {
    let (preamble, packets) = split_preamble(bytes);
    let DecodeOutcome {
        channels,
        packets_seen,
        packets_valid,
        decode_errors,
        errors,
    } = if config.shards > 1 {
        decode_sharded(packets, registry, config.shards)
    } else {
        decode(packets, registry)
    };

    let (channels, failures) = process(channels, config);
    info!(
        channels = channels.len(),
        failures = failures.len(),
        "processed channels"
    );
    Capture {
        preamble,
        input_bytes: bytes.len() as u64,
        packets_seen,
        packets_valid,
        decode_errors,
        errors,
        channels,
        failures,
    }
}

/// Read `path` and run [`decode_bytes`].
pub fn decode_file(
    path: &Path,
    registry: &ParameterRegistry,
    config: &PipelineConfig,
) -> Result<Capture, CaptureError> {
    let bytes = fs::read(path)?;
    info!(path = %path.display(), bytes = bytes.len(), "read capture");
    Ok(decode_bytes(&bytes, registry, config))
}

#[cfg(test)]
mod tests {
    use super::{CaptureError, ConfigError, PipelineConfig, decode_bytes};
    use crate::frame::escape::encode_packet;
    use crate::preamble::Preamble;
    use crate::quantize::{QuantizeError, QuantizerConfig};
    use crate::resample::{ResampleConfig, ResampleError};
    use crate::registry::{ParameterDescriptor, ParameterRegistry, WireFormat};
    use time::macros::datetime;

    fn registry() -> ParameterRegistry {
        ParameterRegistry::new([
            ParameterDescriptor {
                id: 1,
                name: "rpm".to_string(),
                unit: "1/min".to_string(),
                format: WireFormat::U16,
            },
            ParameterDescriptor {
                id: 2,
                name: "lambda".to_string(),
                unit: String::new(),
                format: WireFormat::F64,
            },
        ])
        .unwrap()
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config = PipelineConfig::from_json_str(r#"{"shards": 4, "quantize": {"tolerance": 0.05}}"#)
            .unwrap();
        assert_eq!(config.shards, 4);
        assert_eq!(config.quantize.tolerance, 0.05);
        assert_eq!(config.quantize.ratio_bound, 2047);
        assert_eq!(config.resample.max_step_ms, 100);
        assert!(PipelineConfig::from_json_str("[1]").is_err());
    }

    #[test]
    fn runs_every_stage() {
        let mut file = Preamble::for_time(datetime!(2024-05-06 07:08:09)).to_bytes();
        for k in 0..=20u32 {
            file.extend(encode_packet(k * 10, 1, &((k * 100) as u16).to_be_bytes()));
        }
        let capture = decode_bytes(&file, &registry(), &PipelineConfig::default());

        assert!(capture.preamble.as_ref().unwrap().recorded_at.is_some());
        assert_eq!(capture.packets_seen, 21);
        assert!(!capture.has_problems());
        let channel = &capture.channels[&1];
        let resampled = channel.resampled.as_ref().unwrap();
        assert_eq!(resampled.delta_ms, 10);
        assert_eq!(resampled.t_grid.len(), 20);
        let quantized = channel.quantized.as_ref().unwrap();
        assert_eq!(quantized.v_quantized.len(), 20);
        assert!(quantized.max_error <= 0.10);
    }

    #[test]
    fn quantization_failure_keeps_channel() {
        let mut stream = Vec::new();
        stream.extend(encode_packet(0, 2, &1.0f64.to_be_bytes()));
        stream.extend(encode_packet(100, 2, &f64::NAN.to_be_bytes()));
        stream.extend(encode_packet(200, 2, &1.0f64.to_be_bytes()));
        let capture = decode_bytes(&stream, &registry(), &PipelineConfig::default());

        assert_eq!(capture.failures.len(), 1);
        assert_eq!(capture.failures[0].id, 2);
        assert!(matches!(
            capture.failures[0].reason,
            QuantizeError::NonFinite { index: 1, .. }
        ));
        let channel = &capture.channels[&2];
        assert!(channel.resampled.is_some());
        assert!(channel.quantized.is_none());
        assert!(capture.has_problems());
    }

    #[test]
    fn sharded_config_matches_sequential() {
        let mut stream = Vec::new();
        for k in 0..300u32 {
            stream.extend(encode_packet(k * 7, 1, &(k as u16).to_be_bytes()));
        }
        let sequential = decode_bytes(&stream, &registry(), &PipelineConfig::default());
        let sharded = decode_bytes(
            &stream,
            &registry(),
            &PipelineConfig {
                shards: 5,
                ..PipelineConfig::default()
            },
        );
        assert_eq!(sequential.channels, sharded.channels);
        assert_eq!(sequential.errors, sharded.errors);
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let err = PipelineConfig::from_json_str(r#"{"resample": {"max_step_ms": 2000}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Config(ConfigError::StepAboveRateBase {
                field: "max_step_ms",
                value: 2000,
                rate_base_ms: 1000,
            })
        ));

        let rejected = [
            (r#"{"shards": 0}"#, "shards"),
            (r#"{"resample": {"rate_base_ms": 0}}"#, "rate_base_ms"),
            (r#"{"resample": {"default_step_ms": 0}}"#, "default_step_ms"),
            (r#"{"resample": {"max_grid_len": 0}}"#, "max_grid_len"),
            (r#"{"quantize": {"ratio_bound": -32768}}"#, "ratio_bound"),
            (r#"{"quantize": {"ratio_bound": 0}}"#, "ratio_bound"),
        ];
        for (json, expected) in rejected {
            match PipelineConfig::from_json_str(json) {
                Err(CaptureError::Config(ConfigError::Zero { field })) => {
                    assert_eq!(field, expected, "{json}")
                }
                other => panic!("{json}: {other:?}"),
            }
        }

        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"quantize": {"tolerance": 0.0}}"#),
            Err(CaptureError::Config(ConfigError::NotPositive { field: "tolerance", .. }))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"quantize": {"min_exponent": 3, "max_exponent": 2}}"#),
            Err(CaptureError::Config(ConfigError::ExponentRange { min: 3, max: 2 }))
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"shards": "many"}"#),
            Err(CaptureError::Json(_))
        ));
        assert!(
            PipelineConfig::from_json_str(r#"{"resample": {"max_step_ms": 1000, "rate_base_ms": 1000}}"#)
                .is_ok()
        );
    }

    #[test]
    fn slow_channel_with_wide_step_limit_finishes() {
        let mut stream = Vec::new();
        for k in 0..4u32 {
            stream.extend(encode_packet(k * 1500, 1, &(k as u16).to_be_bytes()));
        }
        let config = PipelineConfig {
            resample: ResampleConfig {
                max_step_ms: 2000,
                ..ResampleConfig::default()
            },
            ..PipelineConfig::default()
        };
        let capture = decode_bytes(&stream, &registry(), &config);
        let resampled = capture.channels[&1].resampled.as_ref().unwrap();
        assert_eq!(resampled.delta_ms, 1000);
        assert_eq!(resampled.t_grid, vec![0, 1000, 2000, 3000]);
    }

    #[test]
    fn search_failures_keep_channel() {
        let mut stream = Vec::new();
        for (k, value) in [-5.0, 0.123_456_7, 120.0].into_iter().enumerate() {
            stream.extend(encode_packet(k as u32 * 100, 2, &f64::to_be_bytes(value)));
        }
        stream.extend(encode_packet(300, 2, &120.0f64.to_be_bytes()));

        let cases = [
            QuantizerConfig {
                tolerance: 1e-9,
                ..QuantizerConfig::default()
            },
            QuantizerConfig {
                ratio_bound: 1,
                ..QuantizerConfig::default()
            },
        ];
        for quantize in cases {
            let config = PipelineConfig {
                quantize,
                ..PipelineConfig::default()
            };
            let capture = decode_bytes(&stream, &registry(), &config);
            assert_eq!(capture.failures.len(), 1);
            let failure = &capture.failures[0];
            assert_eq!(failure.id, 2);
            assert_eq!((failure.v_min, failure.v_max), (-5.0, 120.0));
            let channel = &capture.channels[&2];
            assert!(channel.resampled.is_some());
            assert!(channel.quantized.is_none());
            if config.quantize.ratio_bound == 1 {
                assert!(matches!(
                    failure.reason,
                    QuantizeError::NoRationalApproximation { .. }
                ));
            } else {
                assert!(matches!(
                    failure.reason,
                    QuantizeError::ToleranceExceeded { .. }
                ));
            }
        }
    }

    #[test]
    fn oversized_grid_becomes_channel_failure() {
        let mut stream = Vec::new();
        stream.extend(encode_packet(u32::MAX - 1, 1, &7u16.to_be_bytes()));
        stream.extend(encode_packet(u32::MAX, 1, &8u16.to_be_bytes()));
        stream.extend(encode_packet(0, 2, &1.0f64.to_be_bytes()));
        stream.extend(encode_packet(100, 2, &2.0f64.to_be_bytes()));
        let capture = decode_bytes(&stream, &registry(), &PipelineConfig::default());

        assert_eq!(capture.failures.len(), 1);
        let failure = &capture.failures[0];
        assert_eq!(failure.id, 1);
        assert!(matches!(
            failure.reason,
            QuantizeError::Resample(ResampleError::GridTooLong { delta_ms: 1, .. })
        ));
        assert_eq!((failure.v_min, failure.v_max), (7.0, 8.0));
        let channel = &capture.channels[&1];
        assert!(channel.resampled.is_none());
        assert_eq!(channel.samples.len(), 2);
        assert!(capture.channels[&2].quantized.is_some());
    }
}
