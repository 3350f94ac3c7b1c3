//! gdat core library for offline decoding of telemetry logger captures.
//!
//! A `.gdat` file is an optional RTC header followed by framed, byte-stuffed,
//! checksummed packets. Each packet carries a millisecond timestamp, a
//! channel id and one big-endian value whose wire format comes from a
//! parameter registry. The pipeline is:
//!
//! bytes -> [`frame`] (deframe, validate) -> [`decode_packet`] ->
//! [`ChannelSet`] -> [`resample`] -> [`quantize`] -> [`Report`].
//!
//! Decoding never aborts on bad packets: every rejected candidate is counted
//! in [`ErrorCounts`] and skipped. All file I/O lives in [`decode_file`] and
//! [`ParameterRegistry::load`]; everything else works on byte slices.
//!
//! Invariants:
//! - `packets_seen == packets_valid + decode_errors` for every buffer.
//! - Channel output is keyed and ordered by id, independent of sharding.
//! - A quantized series decodes back within the configured relative error.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use gdat_core::{ParameterRegistry, PipelineConfig, build_report, decode_file};
//!
//! let registry = ParameterRegistry::load(Path::new("parameters.json"))?;
//! let capture = decode_file(Path::new("run.gdat"), &registry, &PipelineConfig::default())?;
//! let report = build_report("run.gdat", &capture, false);
//! println!("{} channels", report.channels.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod channel;
mod decode;
pub mod frame;
#[cfg(feature = "generator")]
mod generator;
mod payload;
mod pipeline;
mod preamble;
mod quantize;
mod registry;
mod resample;

pub use channel::{Channel, ChannelSet, ChannelStats, Sample};
pub use decode::{DecodeErrorKind, DecodeOutcome, ErrorCounts, decode, decode_sharded};
#[cfg(feature = "generator")]
pub use generator::StreamGenerator;
pub use payload::{DecodedSample, PayloadError, decode_packet, decode_value};
pub use pipeline::{
    Capture, CaptureError, ConfigError, FailedChannel, PipelineConfig, decode_bytes, decode_file,
    process,
};
pub use preamble::{Preamble, split_preamble};
pub use quantize::{
    QuantizationFailure, QuantizeError, Quantized, QuantizerConfig, Scaling, best_rational,
    quantize, quantize_series,
};
pub use registry::{NumericKind, ParameterDescriptor, ParameterRegistry, RegistryError, WireFormat};
pub use resample::{
    ResampleConfig, ResampleError, Resampled, interpolate, resample, resample_samples,
    select_step_ms,
};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when the file carries no RTC header.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Decode report with channels in id order.
///
/// # Examples
/// ```
/// use gdat_core::make_stub_report;
///
/// let report = make_stub_report("run.gdat", 123);
/// assert_eq!(report.report_version, gdat_core::REPORT_VERSION);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    pub tool: ToolInfo,
    /// RFC3339 recording time, or [`DEFAULT_GENERATED_AT`].
    pub generated_at: String,
    pub input: InputInfo,
    /// Raw header label, when the file has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    pub decode: DecodeSummary,
    pub channels: Vec<ChannelSummary>,
    pub quantization_failures: Vec<QuantizationFailureSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the decoder.
    pub path: String,
    pub bytes: u64,
}

/// Packet accounting for the whole buffer.
///
/// # Examples
/// ```
/// use gdat_core::{DecodeSummary, ErrorCounts};
///
/// let summary = DecodeSummary {
///     packets_seen: 3,
///     packets_valid: 2,
///     decode_errors: 1,
///     errors: ErrorCounts { checksum_mismatch: 1, ..ErrorCounts::default() },
/// };
/// assert_eq!(summary.errors.total(), summary.decode_errors);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeSummary {
    pub packets_seen: u64,
    pub packets_valid: u64,
    pub decode_errors: u64,
    pub errors: ErrorCounts,
}

/// Per-channel summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: u16,
    pub name: String,
    pub unit: String,
    pub samples: u64,
    pub t_min_ms: u32,
    pub t_max_ms: u32,
    pub v_min: f64,
    pub v_max: f64,
    /// Uniform grid step, once resampled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_hz: Option<u32>,
    pub grid_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationSummary>,
    /// Full data, only with `include_series`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<ChannelSeries>,
}

/// Fixed-point triple plus the measured relative round-trip error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationSummary {
    pub shift: i32,
    pub scalar: i16,
    pub divisor: i16,
    pub max_error: f64,
    pub near_constant: bool,
}

/// Raw, interpolated and encoded data of one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSeries {
    pub t_raw: Vec<u32>,
    pub v_raw: Vec<f64>,
    pub t_grid: Vec<u32>,
    pub v_interp: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v_quantized: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationFailureSummary {
    pub id: u16,
    pub v_min: f64,
    pub v_max: f64,
    pub reason: String,
}

/// Build a stub report with base fields filled and empty aggregates.
///
/// # Examples
/// ```
/// use gdat_core::make_stub_report;
///
/// let report = make_stub_report("run.gdat", 123);
/// assert!(report.channels.is_empty());
/// assert_eq!(report.generated_at, gdat_core::DEFAULT_GENERATED_AT);
/// ```
pub fn make_stub_report(input_path: &str, input_bytes: u64) -> Report {
    Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "gdat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        preamble: None,
        decode: DecodeSummary::default(),
        channels: vec![],
        quantization_failures: vec![],
    }
}

/// Summarise a processed capture.
pub fn build_report(input_path: &str, capture: &Capture, include_series: bool) -> Report {
    let mut report = make_stub_report(input_path, capture.input_bytes);
    if let Some(preamble) = &capture.preamble {
        report.preamble = Some(preamble.label.clone());
        if let Some(at) = preamble.recorded_at_rfc3339() {
            report.generated_at = at;
        }
    }
    report.decode = DecodeSummary {
        packets_seen: capture.packets_seen,
        packets_valid: capture.packets_valid,
        decode_errors: capture.decode_errors,
        errors: capture.errors,
    };
    report.channels = capture
        .channels
        .values()
        .map(|channel| summarize_channel(channel, include_series))
        .collect();
    report.quantization_failures = capture
        .failures
        .iter()
        .map(|failure| QuantizationFailureSummary {
            id: failure.id,
            v_min: failure.v_min,
            v_max: failure.v_max,
            reason: failure.reason.to_string(),
        })
        .collect();
    report
}

fn summarize_channel(channel: &Channel, include_series: bool) -> ChannelSummary {
    let stats = channel.stats.or_else(|| ChannelStats::from_samples(&channel.samples));
    let resampled = channel.resampled.as_ref();
    let quantized = channel.quantized.as_ref();

    let series = include_series.then(|| ChannelSeries {
        t_raw: channel.samples.iter().map(|s| s.timestamp_ms).collect(),
        v_raw: channel.samples.iter().map(|s| s.value).collect(),
        t_grid: resampled.map(|r| r.t_grid.clone()).unwrap_or_default(),
        v_interp: resampled.map(|r| r.v_interp.clone()).unwrap_or_default(),
        v_quantized: quantized.map(|q| q.v_quantized.clone()).unwrap_or_default(),
    });

    ChannelSummary {
        id: channel.id,
        name: channel.name.clone(),
        unit: channel.unit.clone(),
        samples: channel.samples.len() as u64,
        t_min_ms: stats.map_or(0, |s| s.t_min),
        t_max_ms: stats.map_or(0, |s| s.t_max),
        v_min: stats.map_or(0.0, |s| s.v_min),
        v_max: stats.map_or(0.0, |s| s.v_max),
        delta_ms: resampled.map(|r| r.delta_ms),
        frequency_hz: resampled.map(|r| r.frequency_hz),
        grid_len: resampled.map_or(0, |r| r.len() as u64),
        quantization: quantized.map(|q| QuantizationSummary {
            shift: q.scaling.shift,
            scalar: q.scaling.scalar,
            divisor: q.scaling.divisor,
            max_error: q.max_error,
            near_constant: q.near_constant,
        }),
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_report, make_stub_report};
    use crate::frame::escape::encode_packet;
    use crate::pipeline::{PipelineConfig, decode_bytes};
    use crate::registry::{ParameterDescriptor, ParameterRegistry, WireFormat};

    fn registry() -> ParameterRegistry {
        ParameterRegistry::new([ParameterDescriptor {
            id: 4,
            name: "throttle".to_string(),
            unit: "%".to_string(),
            format: WireFormat::U8,
        }])
        .unwrap()
    }

    #[test]
    fn stub_report_serializes_without_optional_fields() {
        let json = serde_json::to_string(&make_stub_report("a.gdat", 0)).unwrap();
        assert!(json.contains("\"report_version\":1"));
        assert!(json.contains("\"name\":\"gdat\""));
        assert!(!json.contains("preamble"));
    }

    #[test]
    fn report_uses_recording_time_and_lists_channels() {
        let mut file = b"/PLM_2021-07-08-09-10-11.gdat:".to_vec();
        for k in 0..10u32 {
            file.extend(encode_packet(k * 50, 4, &[k as u8 * 10]));
        }
        let capture = decode_bytes(&file, &registry(), &PipelineConfig::default());
        let report = build_report("run.gdat", &capture, true);

        assert_eq!(report.generated_at, "2021-07-08T09:10:11Z");
        assert_eq!(report.preamble.as_deref(), Some("/PLM_2021-07-08-09-10-11"));
        assert_eq!(report.decode.packets_valid, 10);
        assert_eq!(report.channels.len(), 1);
        let channel = &report.channels[0];
        assert_eq!(channel.delta_ms, Some(50));
        assert_eq!(channel.frequency_hz, Some(20));
        assert_eq!(channel.grid_len, 9);
        assert!(channel.quantization.is_some());
        let series = channel.series.as_ref().unwrap();
        assert_eq!(series.t_raw.len(), 10);
        assert_eq!(series.v_quantized.len(), 9);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["channels"][0]["unit"], "%");
        assert!(json["quantization_failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn series_are_opt_in() {
        let file = encode_packet(0, 4, &[1]);
        let capture = decode_bytes(&file, &registry(), &PipelineConfig::default());
        let report = build_report("run.gdat", &capture, false);
        assert!(report.channels[0].series.is_none());
        assert_eq!(report.generated_at, super::DEFAULT_GENERATED_AT);
    }
}
