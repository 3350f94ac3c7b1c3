use super::layout;

/// One delimited, unescaped slice of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position of this candidate in the stream, counting from zero.
    pub index: usize,
    pub bytes: Vec<u8>,
    /// The candidate ended while an escape byte was still pending.
    pub dangling_escape: bool,
}

impl Candidate {
    pub fn starts_with_delimiter(&self) -> bool {
        self.bytes.first() == Some(&layout::DELIMITER)
    }
}

/// Lazy delimiter scan over a complete byte buffer.
///
/// Bytes before the first delimiter are yielded as a candidate of their own
/// (the recording started mid-packet); it lacks the delimiter and is rejected
/// downstream.
///
/// # Examples
/// ```
/// use gdat_core::frame::Deframer;
///
/// let stream = [0x7E, 0x01, 0x7D, 0x5E, 0x7E, 0x02];
/// let candidates: Vec<_> = Deframer::new(&stream).map(|c| c.bytes).collect();
/// assert_eq!(candidates, vec![vec![0x7E, 0x01, 0x7E], vec![0x7E, 0x02]]);
/// ```
pub struct Deframer<'a> {
    input: &'a [u8],
    pos: usize,
    emitted: usize,
}

impl<'a> Deframer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            emitted: 0,
        }
    }
}

impl Iterator for Deframer<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let mut bytes = Vec::new();
        let mut pending = false;

        while let Some(&byte) = self.input.get(self.pos) {
            if byte == layout::DELIMITER {
                if !bytes.is_empty() {
                    // Leave the delimiter for the next candidate.
                    break;
                }
                bytes.push(byte);
                pending = false;
            } else if byte == layout::ESCAPE {
                pending = true;
            } else if pending {
                bytes.push(byte ^ layout::ESCAPE_XOR);
                pending = false;
            } else {
                bytes.push(byte);
            }
            self.pos += 1;
        }

        if bytes.is_empty() {
            return None;
        }

        let index = self.emitted;
        self.emitted += 1;
        Some(Candidate {
            index,
            bytes,
            dangling_escape: pending,
        })
    }
}
