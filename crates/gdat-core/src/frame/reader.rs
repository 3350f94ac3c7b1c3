use super::error::FrameError;
use super::layout;
use super::validator::RawPacket;

/// Field access over a validated packet.
pub struct PacketReader<'a> {
    packet: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(packet: RawPacket<'a>) -> Self {
        Self {
            packet: packet.as_bytes(),
        }
    }

    pub fn timestamp(&self) -> Result<u32, FrameError> {
        self.read_u32_be(layout::TIMESTAMP_RANGE)
    }

    pub fn id(&self) -> Result<u16, FrameError> {
        self.read_u16_be(layout::ID_RANGE)
    }

    /// Bytes between the header and the checksum.
    pub fn payload(&self) -> Result<&'a [u8], FrameError> {
        let end = self
            .packet
            .len()
            .checked_sub(layout::CHECKSUM_LEN)
            .filter(|end| *end >= layout::PAYLOAD_OFFSET)
            .ok_or(FrameError::TooShort {
                needed: layout::OVERHEAD_LEN,
                actual: self.packet.len(),
            })?;
        self.read_slice(layout::PAYLOAD_OFFSET..end)
    }

    pub fn read_u16_be(&self, range: std::ops::Range<usize>) -> Result<u16, FrameError> {
        let bytes = self.read_slice(range)?;
        let bytes: [u8; 2] = bytes.try_into().map_err(|_| FrameError::TooShort {
            needed: 2,
            actual: bytes.len(),
        })?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_u32_be(&self, range: std::ops::Range<usize>) -> Result<u32, FrameError> {
        let bytes = self.read_slice(range)?;
        let bytes: [u8; 4] = bytes.try_into().map_err(|_| FrameError::TooShort {
            needed: 4,
            actual: bytes.len(),
        })?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_slice(&self, range: std::ops::Range<usize>) -> Result<&'a [u8], FrameError> {
        self.packet.get(range.clone()).ok_or(FrameError::TooShort {
            needed: range.end,
            actual: self.packet.len(),
        })
    }
}
