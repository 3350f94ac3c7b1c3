//! Payload decoding: validated packet + registry -> timestamped sample.

use thiserror::Error;

use crate::channel::Sample;
use crate::frame::{FrameError, PacketReader, RawPacket};
use crate::registry::{ParameterRegistry, WireFormat};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("unknown channel id {id}")]
    UnknownChannel { id: u16 },
    #[error("payload length mismatch for channel {id}: {format:?} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        id: u16,
        format: WireFormat,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Sample extracted from one packet, tagged with its channel id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedSample {
    pub id: u16,
    pub sample: Sample,
}

/// Decode a big-endian scalar of `format` into an `f64`.
///
/// Returns `None` when `payload` is not exactly `format.width()` bytes.
///
/// # Examples
/// ```
/// use gdat_core::{WireFormat, decode_value};
///
/// assert_eq!(decode_value(WireFormat::I16, &[0xFF, 0xF6]), Some(-10.0));
/// assert_eq!(decode_value(WireFormat::U16, &[0xFF, 0xF6]), Some(65526.0));
/// assert_eq!(decode_value(WireFormat::F32, &1.5f32.to_be_bytes()), Some(1.5));
/// assert_eq!(decode_value(WireFormat::U32, &[0x00]), None);
/// ```
pub fn decode_value(format: WireFormat, payload: &[u8]) -> Option<f64> {
    let value = match format {
        WireFormat::U8 => u8::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::I8 => i8::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::U16 => u16::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::I16 => i16::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::U32 => u32::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::I32 => i32::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::U64 => u64::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::I64 => i64::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::F32 => f32::from_be_bytes(payload.try_into().ok()?) as f64,
        WireFormat::F64 => f64::from_be_bytes(payload.try_into().ok()?),
    };
    Some(value)
}

/// Extract timestamp, id and value from a validated packet.
pub fn decode_packet(
    packet: RawPacket<'_>,
    registry: &ParameterRegistry,
) -> Result<DecodedSample, PayloadError> {
    let reader = PacketReader::new(packet);
    let timestamp_ms = reader.timestamp()?;
    let id = reader.id()?;
    let payload = reader.payload()?;

    let param = registry
        .get(id)
        .ok_or(PayloadError::UnknownChannel { id })?;
    let value = decode_value(param.format, payload).ok_or(PayloadError::LengthMismatch {
        id,
        format: param.format,
        expected: param.format.width(),
        actual: payload.len(),
    })?;

    Ok(DecodedSample {
        id,
        sample: Sample {
            timestamp_ms,
            value,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::{PayloadError, decode_packet, decode_value};
    use crate::frame::escape::build_packet;
    use crate::frame::validate;
    use crate::registry::{ParameterDescriptor, ParameterRegistry, WireFormat};

    fn registry(format: WireFormat) -> ParameterRegistry {
        ParameterRegistry::new([ParameterDescriptor {
            id: 1,
            name: "speed".to_string(),
            unit: "km/h".to_string(),
            format,
        }])
        .unwrap()
    }

    #[test]
    fn decodes_every_format() {
        assert_eq!(decode_value(WireFormat::U8, &[0xFE]), Some(254.0));
        assert_eq!(decode_value(WireFormat::I8, &[0xFE]), Some(-2.0));
        assert_eq!(
            decode_value(WireFormat::I32, &(-70_000i32).to_be_bytes()),
            Some(-70_000.0)
        );
        assert_eq!(
            decode_value(WireFormat::U32, &3_000_000_000u32.to_be_bytes()),
            Some(3_000_000_000.0)
        );
        assert_eq!(
            decode_value(WireFormat::I64, &(-5i64).to_be_bytes()),
            Some(-5.0)
        );
        assert_eq!(
            decode_value(WireFormat::U64, &(1u64 << 40).to_be_bytes()),
            Some((1u64 << 40) as f64)
        );
        assert_eq!(
            decode_value(WireFormat::F64, &(-0.25f64).to_be_bytes()),
            Some(-0.25)
        );
    }

    #[test]
    fn decodes_minimal_i16_packet() {
        let packet = build_packet(1, 1, &[0x00, 0x0A]);
        let decoded = decode_packet(validate(&packet).unwrap(), &registry(WireFormat::I16)).unwrap();
        assert_eq!(decoded.id, 1);
        assert_eq!(decoded.sample.timestamp_ms, 1);
        assert_eq!(decoded.sample.value, 10.0);
    }

    #[test]
    fn unknown_channel() {
        let packet = build_packet(1, 9, &[0x00, 0x0A]);
        let err = decode_packet(validate(&packet).unwrap(), &registry(WireFormat::I16)).unwrap_err();
        assert_eq!(err, PayloadError::UnknownChannel { id: 9 });
    }

    #[test]
    fn length_mismatch() {
        let packet = build_packet(1, 1, &[0x00, 0x0A, 0x00]);
        let err = decode_packet(validate(&packet).unwrap(), &registry(WireFormat::I16)).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::LengthMismatch {
                id: 1,
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }
}
