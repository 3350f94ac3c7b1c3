//! `.gdat` file header: `/PLM_YYYY-MM-DD-HH-MM-SS.gdat:` followed by packets.
//!
//! The header carries the logger's RTC time at file creation. It is optional
//! and only recognised before the first packet delimiter.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem};

use crate::frame::layout;

/// Separator between the header text and the packet data.
pub const SEPARATOR: &[u8] = b".gdat:";

const LABEL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("/PLM_[year]-[month]-[day]-[hour]-[minute]-[second]");

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    /// Header text before the separator, lossily decoded.
    pub label: String,
    /// Logger RTC time, when the label parses.
    pub recorded_at: Option<PrimitiveDateTime>,
}

impl Preamble {
    pub fn parse(label: &[u8]) -> Self {
        let label = String::from_utf8_lossy(label).into_owned();
        let recorded_at = PrimitiveDateTime::parse(&label, LABEL_FORMAT).ok();
        Self { label, recorded_at }
    }

    /// Header for a file recorded at `at`.
    pub fn for_time(at: PrimitiveDateTime) -> Self {
        let label = at
            .format(LABEL_FORMAT)
            .unwrap_or_else(|_| "/PLM_1970-01-01-00-00-00".to_string());
        Self {
            label,
            recorded_at: Some(at),
        }
    }

    /// Header stamped with the current UTC time.
    pub fn now_utc() -> Self {
        let now = OffsetDateTime::now_utc();
        Self::for_time(PrimitiveDateTime::new(now.date(), now.time()))
    }

    /// `recorded_at` as RFC 3339, read as UTC.
    pub fn recorded_at_rfc3339(&self) -> Option<String> {
        self.recorded_at
            .and_then(|at| at.assume_utc().format(&Rfc3339).ok())
    }

    /// Header bytes including the separator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.label.len() + SEPARATOR.len());
        out.extend_from_slice(self.label.as_bytes());
        out.extend_from_slice(SEPARATOR);
        out
    }
}

/// Split an optional header from the packet data.
///
/// The separator must appear before the first delimiter byte; otherwise the
/// whole buffer is packet data.
///
/// # Examples
/// ```
/// use gdat_core::split_preamble;
///
/// let file = b"/PLM_2024-03-09-14-05-59.gdat:\x7e\x00";
/// let (preamble, packets) = split_preamble(file);
/// let preamble = preamble.unwrap();
/// assert_eq!(preamble.recorded_at_rfc3339().as_deref(), Some("2024-03-09T14:05:59Z"));
/// assert_eq!(packets, b"\x7e\x00");
/// ```
pub fn split_preamble(bytes: &[u8]) -> (Option<Preamble>, &[u8]) {
    let head_len = bytes
        .iter()
        .position(|&b| b == layout::DELIMITER)
        .unwrap_or(bytes.len());
    let head = &bytes[..head_len];
    match head
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
    {
        Some(at) => (
            Some(Preamble::parse(&head[..at])),
            &bytes[at + SEPARATOR.len()..],
        ),
        None => (None, bytes),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{Preamble, split_preamble};

    #[test]
    fn parses_rtc_label() {
        let (preamble, rest) = split_preamble(b"/PLM_2023-12-31-23-59-01.gdat:\x7e\x01\x02");
        let preamble = preamble.unwrap();
        assert_eq!(preamble.label, "/PLM_2023-12-31-23-59-01");
        assert_eq!(preamble.recorded_at, Some(datetime!(2023-12-31 23:59:01)));
        assert_eq!(rest, b"\x7e\x01\x02");
    }

    #[test]
    fn unparsable_label_keeps_split() {
        let (preamble, rest) = split_preamble(b"/LOG_garbage.gdat:\x7e");
        let preamble = preamble.unwrap();
        assert_eq!(preamble.recorded_at, None);
        assert_eq!(preamble.recorded_at_rfc3339(), None);
        assert_eq!(rest, b"\x7e");
    }

    #[test]
    fn missing_separator_means_no_header() {
        let data = b"\x7e\x00\x00\x00\x01";
        let (preamble, rest) = split_preamble(data);
        assert!(preamble.is_none());
        assert_eq!(rest, data);
    }

    #[test]
    fn separator_inside_packet_data_is_ignored() {
        let mut data = vec![0x7E, 0x01];
        data.extend_from_slice(b".gdat:");
        let (preamble, rest) = split_preamble(&data);
        assert!(preamble.is_none());
        assert_eq!(rest, &data[..]);
    }

    #[test]
    fn header_round_trips() {
        let preamble = Preamble::for_time(datetime!(2024-01-02 03:04:05));
        assert_eq!(preamble.label, "/PLM_2024-01-02-03-04-05");
        let bytes = preamble.to_bytes();
        let (parsed, rest) = split_preamble(&bytes);
        assert_eq!(parsed, Some(preamble));
        assert!(rest.is_empty());
    }
}
