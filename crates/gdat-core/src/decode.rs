//! The decode pass: bytes -> candidates -> packets -> samples -> channels.
//!
//! Every per-packet failure is counted and skipped; decoding a buffer always
//! completes. The pass owns its `ChannelSet`, so nothing outlives a call.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::{Channel, ChannelSet};
use crate::frame::{Candidate, Deframer, FrameError, layout, validate};
use crate::payload::{DecodedSample, PayloadError, decode_packet};
use crate::registry::ParameterRegistry;

/// Error buckets counted by the decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    FramingIncomplete,
    TooShort,
    ChecksumMismatch,
    UnknownChannel,
    PayloadLengthMismatch,
}

impl From<&FrameError> for DecodeErrorKind {
    fn from(value: &FrameError) -> Self {
        match value {
            FrameError::MissingDelimiter | FrameError::DanglingEscape => {
                DecodeErrorKind::FramingIncomplete
            }
            FrameError::TooShort { .. } => DecodeErrorKind::TooShort,
            FrameError::ChecksumMismatch { .. } => DecodeErrorKind::ChecksumMismatch,
        }
    }
}

impl From<&PayloadError> for DecodeErrorKind {
    fn from(value: &PayloadError) -> Self {
        match value {
            PayloadError::UnknownChannel { .. } => DecodeErrorKind::UnknownChannel,
            PayloadError::LengthMismatch { .. } => DecodeErrorKind::PayloadLengthMismatch,
            PayloadError::Frame(frame) => frame.into(),
        }
    }
}

/// Per-kind error counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub framing_incomplete: u64,
    pub too_short: u64,
    pub checksum_mismatch: u64,
    pub unknown_channel: u64,
    pub payload_length_mismatch: u64,
}

impl ErrorCounts {
    pub fn add(&mut self, kind: DecodeErrorKind) {
        let counter = match kind {
            DecodeErrorKind::FramingIncomplete => &mut self.framing_incomplete,
            DecodeErrorKind::TooShort => &mut self.too_short,
            DecodeErrorKind::ChecksumMismatch => &mut self.checksum_mismatch,
            DecodeErrorKind::UnknownChannel => &mut self.unknown_channel,
            DecodeErrorKind::PayloadLengthMismatch => &mut self.payload_length_mismatch,
        };
        *counter += 1;
    }

    pub fn merge(&mut self, other: &ErrorCounts) {
        self.framing_incomplete += other.framing_incomplete;
        self.too_short += other.too_short;
        self.checksum_mismatch += other.checksum_mismatch;
        self.unknown_channel += other.unknown_channel;
        self.payload_length_mismatch += other.payload_length_mismatch;
    }

    pub fn total(&self) -> u64 {
        self.framing_incomplete
            + self.too_short
            + self.checksum_mismatch
            + self.unknown_channel
            + self.payload_length_mismatch
    }
}

/// Result of decoding one buffer.
///
/// `packets_seen == packets_valid + decode_errors` always holds.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    /// Non-empty channels, samples sorted by timestamp.
    pub channels: BTreeMap<u16, Channel>,
    pub packets_seen: u64,
    pub packets_valid: u64,
    pub decode_errors: u64,
    pub errors: ErrorCounts,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    seen: u64,
    valid: u64,
    errors: ErrorCounts,
}

impl Tally {
    fn merge(&mut self, other: &Tally) {
        self.seen += other.seen;
        self.valid += other.valid;
        self.errors.merge(&other.errors);
    }
}

/// Decode a complete packet buffer (preamble already stripped).
///
/// # Examples
/// ```
/// use gdat_core::frame::escape::encode_packet;
/// use gdat_core::{ParameterDescriptor, ParameterRegistry, WireFormat, decode};
///
/// let registry = ParameterRegistry::new([ParameterDescriptor {
///     id: 1,
///     name: "coolant".to_string(),
///     unit: "C".to_string(),
///     format: WireFormat::I16,
/// }])?;
/// let stream = encode_packet(1, 1, &10i16.to_be_bytes());
///
/// let outcome = decode(&stream, &registry);
/// assert_eq!(outcome.packets_seen, 1);
/// assert_eq!(outcome.decode_errors, 0);
/// assert_eq!(outcome.channels[&1].samples[0].value, 10.0);
/// # Ok::<(), gdat_core::RegistryError>(())
/// ```
pub fn decode(buffer: &[u8], registry: &ParameterRegistry) -> DecodeOutcome {
    let mut channels = ChannelSet::from_registry(registry);
    let tally = decode_into(buffer, registry, &mut channels);
    finish(channels, tally)
}

/// Decode in parallel over `shards` delimiter-aligned slices of `buffer`.
///
/// Each shard fills its own channel set; sets are concatenated in shard
/// order before the final sort, so the outcome equals [`decode`].
pub fn decode_sharded(buffer: &[u8], registry: &ParameterRegistry, shards: usize) -> DecodeOutcome {
    let bounds = shard_bounds(buffer, shards.max(1));
    let partials: Vec<(ChannelSet, Tally)> = bounds
        .par_windows(2)
        .map(|window| {
            let mut channels = ChannelSet::from_registry(registry);
            let tally = decode_into(&buffer[window[0]..window[1]], registry, &mut channels);
            (channels, tally)
        })
        .collect();

    let mut channels = ChannelSet::from_registry(registry);
    let mut tally = Tally::default();
    for (shard_channels, shard_tally) in partials {
        channels.merge(shard_channels);
        tally.merge(&shard_tally);
    }
    debug!(shards = bounds.len() - 1, "merged decode shards");
    finish(channels, tally)
}

fn decode_into(buffer: &[u8], registry: &ParameterRegistry, channels: &mut ChannelSet) -> Tally {
    let mut tally = Tally::default();
    for candidate in Deframer::new(buffer) {
        tally.seen += 1;
        match decode_candidate(&candidate, registry) {
            Ok(decoded) => {
                channels.push(decoded.id, decoded.sample);
                tally.valid += 1;
            }
            Err(kind) => tally.errors.add(kind),
        }
    }
    tally
}

fn decode_candidate(
    candidate: &Candidate,
    registry: &ParameterRegistry,
) -> Result<DecodedSample, DecodeErrorKind> {
    let framing = if !candidate.starts_with_delimiter() {
        Some(FrameError::MissingDelimiter)
    } else if candidate.dangling_escape {
        Some(FrameError::DanglingEscape)
    } else {
        None
    };
    if let Some(err) = framing {
        debug!(index = candidate.index, %err, "rejected candidate");
        return Err((&err).into());
    }

    let packet = validate(&candidate.bytes).map_err(|err| {
        debug!(index = candidate.index, %err, "rejected candidate");
        DecodeErrorKind::from(&err)
    })?;
    decode_packet(packet, registry).map_err(|err| {
        debug!(index = candidate.index, %err, "undecodable packet");
        DecodeErrorKind::from(&err)
    })
}

fn finish(channels: ChannelSet, tally: Tally) -> DecodeOutcome {
    let channels = channels.finish();
    let decode_errors = tally.errors.total();
    info!(
        packets = tally.seen,
        valid = tally.valid,
        errors = decode_errors,
        channels = channels.len(),
        "decoded packet stream"
    );
    DecodeOutcome {
        channels,
        packets_seen: tally.seen,
        packets_valid: tally.valid,
        decode_errors,
        errors: tally.errors,
    }
}

/// Shard start offsets (each on a delimiter, except the first) plus the
/// buffer length as the final bound.
fn shard_bounds(buffer: &[u8], shards: usize) -> Vec<usize> {
    let target = buffer.len().div_ceil(shards).max(1);
    let mut bounds = vec![0];
    let mut next = target;
    while next < buffer.len() {
        match buffer[next..].iter().position(|&b| b == layout::DELIMITER) {
            Some(offset) => {
                let at = next + offset;
                bounds.push(at);
                next = at + target;
            }
            None => break,
        }
    }
    bounds.push(buffer.len());
    bounds
}
