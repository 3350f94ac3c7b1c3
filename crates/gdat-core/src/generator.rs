//! Synthetic `.gdat` streams for exercising the decoder.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::frame::escape::encode_packet;
use crate::preamble::Preamble;
use crate::registry::{NumericKind, ParameterDescriptor, ParameterRegistry};

/// Random packets for registry parameters on a simulated millisecond clock.
///
/// # Examples
/// ```
/// use gdat_core::{ParameterDescriptor, ParameterRegistry, StreamGenerator, WireFormat, decode};
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let registry = ParameterRegistry::new([ParameterDescriptor {
///     id: 7,
///     name: "oil".to_string(),
///     unit: "bar".to_string(),
///     format: WireFormat::F32,
/// }])?;
/// let stream = StreamGenerator::new(&registry, StdRng::seed_from_u64(1)).generate(512);
/// assert_eq!(decode(&stream, &registry).decode_errors, 0);
/// # Ok::<(), gdat_core::RegistryError>(())
/// ```
#[derive(Debug)]
pub struct StreamGenerator<R> {
    rng: R,
    params: Vec<ParameterDescriptor>,
    clock_ms: u32,
    max_step_ms: u32,
    float_range: (f64, f64),
}

impl<R: Rng> StreamGenerator<R> {
    pub fn new(registry: &ParameterRegistry, rng: R) -> Self {
        Self {
            rng,
            params: registry.iter().cloned().collect(),
            clock_ms: 0,
            max_step_ms: 20,
            float_range: (-100.0, 100.0),
        }
    }

    /// Largest clock advance between two packets.
    pub fn with_max_step_ms(mut self, max_step_ms: u32) -> Self {
        self.max_step_ms = max_step_ms;
        self
    }

    /// Half-open range for float parameters.
    pub fn with_float_range(mut self, low: f64, high: f64) -> Self {
        self.float_range = (low, high);
        self
    }

    pub fn clock_ms(&self) -> u32 {
        self.clock_ms
    }

    /// One escaped packet, or `None` for an empty registry.
    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        let param = self.params.choose(&mut self.rng)?.clone();
        self.clock_ms = self
            .clock_ms
            .saturating_add(self.rng.gen_range(0..=self.max_step_ms));
        let payload = self.payload(&param);
        Some(encode_packet(self.clock_ms, param.id, &payload))
    }

    /// Whole packets until at least `nbytes` are produced.
    pub fn generate(&mut self, nbytes: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(nbytes + 32);
        while out.len() < nbytes {
            match self.next_packet() {
                Some(packet) => out.extend(packet),
                None => break,
            }
        }
        out
    }

    /// [`generate`](Self::generate) behind a file header.
    pub fn generate_file(&mut self, preamble: &Preamble, nbytes: usize) -> Vec<u8> {
        let mut out = preamble.to_bytes();
        out.extend(self.generate(nbytes));
        out
    }

    fn payload(&mut self, param: &ParameterDescriptor) -> Vec<u8> {
        let format = param.format;
        match (format.kind(), format.width()) {
            (NumericKind::Float, 4) => {
                let value = self.float_value() as f32;
                value.to_be_bytes().to_vec()
            }
            (NumericKind::Float, _) => self.float_value().to_be_bytes().to_vec(),
            (NumericKind::Integer, width) => {
                let mut bytes = vec![0u8; width];
                self.rng.fill(&mut bytes[..]);
                bytes
            }
        }
    }

    fn float_value(&mut self) -> f64 {
        let (low, high) = self.float_range;
        self.rng.gen_range(low..high)
    }
}
