pub const DELIMITER: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
pub const ESCAPE_XOR: u8 = 0x20;

pub const TIMESTAMP_RANGE: std::ops::Range<usize> = 1..5;
pub const ID_RANGE: std::ops::Range<usize> = 5..7;
pub const PAYLOAD_OFFSET: usize = 7;
pub const CHECKSUM_LEN: usize = 1;

/// Header plus checksum with an empty payload.
pub const OVERHEAD_LEN: usize = PAYLOAD_OFFSET + CHECKSUM_LEN;
/// Smallest packet carrying at least one payload byte.
pub const MIN_PACKET_LEN: usize = OVERHEAD_LEN + 1;
