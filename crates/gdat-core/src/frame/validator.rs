use super::error::FrameError;
use super::layout;

/// A candidate that passed length and checksum validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket<'a> {
    bytes: &'a [u8],
}

impl<'a> RawPacket<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Additive 8-bit checksum over every byte but the last.
///
/// The sum wraps modulo 256 and includes the leading delimiter. It catches
/// single-byte corruption but not reordering of bytes.
///
/// # Examples
/// ```
/// use gdat_core::frame::checksum;
///
/// assert_eq!(checksum(&[0x7E, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x0A, 0x00]), 0x8A);
/// assert_eq!(checksum(&[0xFF, 0x02, 0x00]), 0x01);
/// ```
pub fn checksum(packet: &[u8]) -> u8 {
    let body = match packet.split_last() {
        Some((_, body)) => body,
        None => return 0,
    };
    body.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Check minimum length and checksum of an unescaped candidate.
pub fn validate(packet: &[u8]) -> Result<RawPacket<'_>, FrameError> {
    if packet.len() < layout::MIN_PACKET_LEN {
        return Err(FrameError::TooShort {
            needed: layout::MIN_PACKET_LEN,
            actual: packet.len(),
        });
    }
    let computed = checksum(packet);
    let received = packet[packet.len() - layout::CHECKSUM_LEN];
    if computed != received {
        return Err(FrameError::ChecksumMismatch { computed, received });
    }
    Ok(RawPacket { bytes: packet })
}
