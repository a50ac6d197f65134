use crate::document::StyledDocument;

/// A stream event whose payload is not a usable completion chunk.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("chunk payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("chunk has no choices")]
    MissingChoices,
    #[error("chunk has no logprobs")]
    MissingLogprobs,
    #[error("{tokens} tokens but {logprobs} token logprobs")]
    MismatchedLengths { tokens: usize, logprobs: usize },
    #[error("stream line is not valid UTF-8")]
    NotUtf8,
}

/// Reassembled byte fragments that do not form valid UTF-8 text.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed byte escape in {0:?}")]
    BadEscape(String),
    #[error("bytes {0:02x?} are not valid UTF-8")]
    InvalidUtf8(Vec<u8>),
}

/// Errors surfaced to callers of the completion client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed stream chunk: {0}")]
    Parse(#[from] ParseError),
    #[error("generation interrupted")]
    Interrupted { partial: StyledDocument },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completions endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the error ends the whole session rather than one generation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Configuration(_) | ClientError::Interrupted { .. })
    }
}
