//! Merges raw byte-span token fragments back into UTF-8 tokens.
//!
//! The completions endpoint tokenizes on bytes, so a single character can be
//! split over several tokens. Such tokens arrive as `bytes:` followed by
//! `\xNN` escapes, e.g. `bytes:\xe2\x80` then `bytes:\x9d` for `”`.

use tracing::{debug, trace};

use crate::error::DecodeError;

pub const BYTES_MARKER: &str = "bytes:";
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// A token ready to be colored and rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub text: String,
    pub logprob: f64,
}

/// Outcome of feeding one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Emit(DecodedToken),
    /// The fragment was buffered awaiting its continuation.
    Pending,
    /// The stop string or end-of-text sentinel was reached.
    Stop,
}

#[derive(Debug)]
struct PendingFragment {
    bytes: Vec<u8>,
    /// Probability of the first fragment, which stands for the whole character.
    logprob: f64,
}

/// Stateful decoder holding at most one partial multi-byte token.
#[derive(Debug)]
pub struct Reassembler {
    stop: String,
    pending: Option<PendingFragment>,
}

impl Reassembler {
    /// Create a reassembler that stops at `stop` (ignored when empty) and at
    /// the end-of-text sentinel.
    pub fn new(stop: impl Into<String>) -> Self {
        Self {
            stop: stop.into(),
            pending: None,
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.pending.is_some()
    }

    pub fn feed(&mut self, fragment: &str, logprob: f64) -> Result<Step, DecodeError> {
        if fragment == END_OF_TEXT || (!self.stop.is_empty() && fragment == self.stop) {
            if let Some(p) = self.pending.take() {
                debug!(bytes = ?p.bytes, "dropping pending fragment at stop");
            }
            return Ok(Step::Stop);
        }

        let raw = fragment.strip_prefix(BYTES_MARKER);
        let Some(mut pending) = self.pending.take() else {
            return match raw {
                Some(escaped) => {
                    trace!(fragment, "buffering byte fragment");
                    self.pending = Some(PendingFragment {
                        bytes: unescape_bytes(escaped)?,
                        logprob,
                    });
                    Ok(Step::Pending)
                }
                None => Ok(Step::Emit(DecodedToken {
                    text: fragment.to_string(),
                    logprob,
                })),
            };
        };

        match raw {
            Some(escaped) => pending.bytes.extend(unescape_bytes(escaped)?),
            None => pending.bytes.extend_from_slice(fragment.as_bytes()),
        }
        let decoded = std::str::from_utf8(&pending.bytes)
            .map(str::to_string)
            .map_err(|e| e.error_len());
        match decoded {
            Ok(text) => Ok(Step::Emit(DecodedToken {
                text,
                logprob: pending.logprob,
            })),
            // A character split over more than two fragments.
            Err(None) => {
                self.pending = Some(pending);
                Ok(Step::Pending)
            }
            Err(Some(_)) => Err(DecodeError::InvalidUtf8(pending.bytes)),
        }
    }

    /// End of stream. Returns the bytes of a fragment that never completed.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.pending.take().map(|p| p.bytes)
    }
}

/// Turn the escaped text after a `bytes:` marker into raw bytes.
fn unescape_bytes(escaped: &str) -> Result<Vec<u8>, DecodeError> {
    let bad = || DecodeError::BadEscape(escaped.to_string());
    let mut out = Vec::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next().ok_or_else(bad)? {
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return Err(bad());
                }
                out.push(u8::from_str_radix(&hex, 16).map_err(|_| bad())?);
            }
            '\\' => out.push(b'\\'),
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            '\'' => out.push(b'\''),
            '"' => out.push(b'"'),
            _ => return Err(bad()),
        }
    }
    Ok(out)
}
