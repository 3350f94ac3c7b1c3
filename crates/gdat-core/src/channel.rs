//! Per-channel sample accumulation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::quantize::Quantized;
use crate::registry::{ParameterDescriptor, ParameterRegistry};
use crate::resample::Resampled;

/// One decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_ms: u32,
    pub value: f64,
}

/// Time and value bounds of a channel's raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    pub count: usize,
    pub t_min: u32,
    pub t_max: u32,
    pub v_min: f64,
    pub v_max: f64,
}

impl ChannelStats {
    /// Bounds over `samples`, or `None` when there are none.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        let first = samples.first()?;
        let init = ChannelStats {
            count: 0,
            t_min: first.timestamp_ms,
            t_max: first.timestamp_ms,
            v_min: first.value,
            v_max: first.value,
        };
        Some(samples.iter().fold(init, |mut stats, sample| {
            stats.count += 1;
            stats.t_min = stats.t_min.min(sample.timestamp_ms);
            stats.t_max = stats.t_max.max(sample.timestamp_ms);
            stats.v_min = stats.v_min.min(sample.value);
            stats.v_max = stats.v_max.max(sample.value);
            stats
        }))
    }
}

/// Full time series for one registry parameter.
///
/// `stats` is filled by [`ChannelSet::finish`], `resampled` by
/// [`crate::resample`] and `quantized` by [`crate::quantize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: u16,
    pub name: String,
    pub unit: String,
    pub samples: Vec<Sample>,
    pub stats: Option<ChannelStats>,
    pub resampled: Option<Resampled>,
    pub quantized: Option<Quantized>,
}

impl Channel {
    pub fn new(param: &ParameterDescriptor) -> Self {
        Self {
            id: param.id,
            name: param.name.clone(),
            unit: param.unit.clone(),
            samples: Vec::new(),
            stats: None,
            resampled: None,
            quantized: None,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Stable sort by timestamp and refresh `stats`.
    ///
    /// Samples sharing a timestamp keep their arrival order.
    pub fn finish(&mut self) {
        self.samples.sort_by_key(|sample| sample.timestamp_ms);
        self.stats = ChannelStats::from_samples(&self.samples);
    }
}

/// Channels of one decode run, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: BTreeMap<u16, Channel>,
}

impl ChannelSet {
    /// One empty channel per registry entry.
    pub fn from_registry(registry: &ParameterRegistry) -> Self {
        Self {
            channels: registry
                .iter()
                .map(|param| (param.id, Channel::new(param)))
                .collect(),
        }
    }

    /// Append a sample in arrival order. Returns `false` for unknown ids.
    pub fn push(&mut self, id: u16, sample: Sample) -> bool {
        match self.channels.get_mut(&id) {
            Some(channel) => {
                channel.push(sample);
                true
            }
            None => false,
        }
    }

    /// Concatenate `other`'s samples after ours, channel by channel.
    pub fn merge(&mut self, other: ChannelSet) {
        for (id, channel) in other.channels {
            match self.channels.get_mut(&id) {
                Some(existing) => existing.samples.extend(channel.samples),
                None => {
                    self.channels.insert(id, channel);
                }
            }
        }
    }

    /// Sort every channel, compute stats and drop channels without samples.
    pub fn finish(self) -> BTreeMap<u16, Channel> {
        self.channels
            .into_iter()
            .filter(|(_, channel)| !channel.samples.is_empty())
            .map(|(id, mut channel)| {
                channel.finish();
                (id, channel)
            })
            .collect()
    }

    pub fn get(&self, id: u16) -> Option<&Channel> {
        self.channels.get(&id)
    }
}
