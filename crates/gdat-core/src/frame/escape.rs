use super::layout;
use super::validator::checksum;

/// Byte-stuff `bytes` so neither the delimiter nor the escape byte appears.
///
/// # Examples
/// ```
/// use gdat_core::frame::{escape, unescape};
///
/// let stuffed = escape(&[0x01, 0x7E, 0x7D]);
/// assert_eq!(stuffed, vec![0x01, 0x7D, 0x5E, 0x7D, 0x5D]);
/// assert_eq!(unescape(&stuffed), vec![0x01, 0x7E, 0x7D]);
/// ```
pub fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8);
    escape_into(&mut out, bytes);
    out
}

pub(crate) fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        if byte == layout::DELIMITER || byte == layout::ESCAPE {
            out.push(layout::ESCAPE);
            out.push(byte ^ layout::ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }
}

/// Undo [`escape`]. A trailing lone escape byte is dropped.
pub fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut pending = false;
    for &byte in bytes {
        if pending {
            out.push(byte ^ layout::ESCAPE_XOR);
            pending = false;
        } else if byte == layout::ESCAPE {
            pending = true;
        } else {
            out.push(byte);
        }
    }
    out
}

/// Assemble an unescaped packet: delimiter, header, payload and checksum.
pub fn build_packet(timestamp: u32, id: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(layout::OVERHEAD_LEN + payload.len());
    packet.push(layout::DELIMITER);
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(payload);
    packet.push(0);
    let sum = checksum(&packet);
    if let Some(last) = packet.last_mut() {
        *last = sum;
    }
    packet
}

/// Assemble a packet and stuff everything after the delimiter, ready to be
/// appended to a stream.
pub fn encode_packet(timestamp: u32, id: u16, payload: &[u8]) -> Vec<u8> {
    let packet = build_packet(timestamp, id, payload);
    let mut out = Vec::with_capacity(packet.len() + 4);
    out.push(layout::DELIMITER);
    escape_into(&mut out, &packet[1..]);
    out
}

#[cfg(test)]
mod tests {
    use super::{build_packet, encode_packet, escape, unescape};
    use crate::frame::layout;

    #[test]
    fn unescape_inverts_escape_for_every_byte_value() {
        let bytes: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        assert_eq!(unescape(&escape(&bytes)), bytes);
    }

    #[test]
    fn escaped_output_never_contains_delimiter() {
        let bytes = vec![layout::DELIMITER; 16];
        let stuffed = escape(&bytes);
        assert_eq!(stuffed.len(), 32);
        assert!(!stuffed.contains(&layout::DELIMITER));
    }

    #[test]
    fn unescape_drops_trailing_escape() {
        assert_eq!(unescape(&[0x01, layout::ESCAPE]), vec![0x01]);
    }

    #[test]
    fn build_packet_appends_additive_checksum() {
        let packet = build_packet(1, 1, &[0x00, 0x0A]);
        assert_eq!(
            packet,
            vec![0x7E, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x0A, 0x8A]
        );
    }

    #[test]
    fn encode_packet_stuffs_body_only() {
        let encoded = encode_packet(0, 0x7E7D, &[0x7E]);
        assert_eq!(encoded[0], layout::DELIMITER);
        assert!(!encoded[1..].contains(&layout::DELIMITER));
        assert_eq!(unescape(&encoded[1..]), build_packet(0, 0x7E7D, &[0x7E])[1..]);
    }
}
