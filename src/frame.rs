//! Decoding of the completions endpoint's server-sent event stream.
//!
//! Transport chunks are split into `data:` lines by [`SseLines`] and each
//! line is turned into a [`StreamFrame`] by [`parse_frame`].

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::trace;

use crate::error::ParseError;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Tokens and log-probabilities carried by one stream event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamFrame {
    pub tokens: Vec<(String, f64)>,
    pub done: bool,
}

impl StreamFrame {
    fn done() -> Self {
        Self {
            tokens: Vec::new(),
            done: true,
        }
    }
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    logprobs: Option<Logprobs>,
}

/// The two logprob layouts the endpoint has been observed to send.
#[derive(Deserialize)]
#[serde(untagged)]
enum Logprobs {
    Parallel {
        tokens: Vec<String>,
        token_logprobs: Vec<Option<f64>>,
    },
    TopAlternatives {
        top_logprobs: Vec<BTreeMap<String, f64>>,
    },
}

impl Logprobs {
    fn into_pairs(self) -> Result<Vec<(String, f64)>, ParseError> {
        match self {
            Logprobs::Parallel {
                tokens,
                token_logprobs,
            } => {
                if tokens.len() != token_logprobs.len() {
                    return Err(ParseError::MismatchedLengths {
                        tokens: tokens.len(),
                        logprobs: token_logprobs.len(),
                    });
                }
                // The first token of an echoed prompt has no logprob.
                Ok(tokens
                    .into_iter()
                    .zip(token_logprobs.into_iter().map(|lp| lp.unwrap_or(0.0)))
                    .collect())
            }
            Logprobs::TopAlternatives { top_logprobs } => Ok(top_logprobs
                .into_iter()
                .filter_map(|alts| {
                    alts.into_iter()
                        .max_by(|a, b| a.1.total_cmp(&b.1))
                })
                .collect()),
        }
    }
}

/// Parse one `data:` line of the completion stream.
///
/// The terminal `[DONE]` event yields a frame with `done` set and no tokens.
pub fn parse_frame(chunk: &str) -> Result<StreamFrame, ParseError> {
    let payload = chunk
        .strip_prefix(DATA_PREFIX)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .unwrap_or(chunk);
    let trimmed = payload.trim();
    if trimmed == DONE_SENTINEL {
        return Ok(StreamFrame::done());
    }

    let parsed: CompletionChunk = serde_json::from_str(trimmed)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(ParseError::MissingChoices)?;
    let tokens = choice
        .logprobs
        .ok_or(ParseError::MissingLogprobs)?
        .into_pairs()?;
    trace!(count = tokens.len(), "parsed frame");
    Ok(StreamFrame {
        tokens,
        done: false,
    })
}

/// Reassembles `data:` lines from arbitrarily split transport chunks.
#[derive(Debug, Default)]
pub struct SseLines {
    buf: Vec<u8>,
}

impl SseLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every completed `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(data) = Self::data_line(&line[..pos])? {
                lines.push(data);
            }
        }
        Ok(lines)
    }

    /// Flush an unterminated trailing line once the stream has ended.
    pub fn finish(&mut self) -> Result<Option<String>, ParseError> {
        let rest = std::mem::take(&mut self.buf);
        Self::data_line(&rest)
    }

    fn data_line(raw: &[u8]) -> Result<Option<String>, ParseError> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if !raw.starts_with(DATA_PREFIX.as_bytes()) {
            return Ok(None);
        }
        let line = std::str::from_utf8(raw).map_err(|_| ParseError::NotUtf8)?;
        Ok(Some(line.to_string()))
    }
}
