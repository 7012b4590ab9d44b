//! Incremental UTF-8 decoding of network reads.
//!
//! A read may end in the middle of a multi-byte character. The incomplete
//! tail (at most three bytes) is held back and completed by the next read.
//! Invalid sequences become U+FFFD; decoding never fails.

use std::borrow::Cow;

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back from the previous read.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let input: Cow<'_, [u8]> = if self.carry.is_empty() {
            Cow::Borrowed(bytes)
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(bytes);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // the prefix up to `valid` is known-good UTF-8, so this never replaces
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            rest = &rest[valid + bad..];
                        }
                        None => {
                            self.carry.extend_from_slice(&rest[valid..]);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream: an unfinished character becomes one U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            String::new()
        } else {
            self.carry.clear();
            REPLACEMENT.to_string()
        }
    }
}
