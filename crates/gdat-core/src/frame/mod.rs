//! Packet framing for `.gdat` streams.
//!
//! Follows the same layered structure as every wire format in this crate:
//! - `layout`: byte values, offsets and ranges (source of truth)
//! - `escape`: byte stuffing helpers and the packet builder
//! - `deframer`: delimiter scan and unescape into candidate packets
//! - `validator`: minimum length and additive checksum
//! - `reader`: safe big-endian access over a validated packet
//! - `error`: explicit rejection reasons
//!
//! Wire format (big endian, before stuffing):
//! `7E | timestamp:4 | id:2 | payload:N | checksum:1`. Any byte after the
//! delimiter equal to `7E` or `7D` is sent as `7D, byte ^ 0x20`, so `7E`
//! only ever marks a packet start.

pub mod deframer;
pub mod error;
pub mod escape;
pub mod layout;
pub mod reader;
pub mod validator;

pub use deframer::{Candidate, Deframer};
pub use error::FrameError;
pub use escape::{build_packet, escape, unescape};
pub use reader::PacketReader;
pub use validator::{RawPacket, checksum, validate};
