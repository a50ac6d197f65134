//! Scripted completion streams for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::config::PromptRequest;
use crate::error::ClientError;
use crate::openai::{ChunkStream, CompletionSource};

/// `data:` line carrying the given tokens in the parallel-array layout.
pub fn data_line(tokens: &[(&str, f64)]) -> String {
    let (toks, lps): (Vec<&str>, Vec<f64>) = tokens.iter().copied().unzip();
    let payload = serde_json::json!({
        "choices": [{ "logprobs": { "tokens": toks, "token_logprobs": lps } }]
    });
    format!("data: {payload}\n\n")
}

pub const DONE_LINE: &str = "data: [DONE]\n\n";

/// Increments a counter when dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a [`ScriptedSource`] stream does after its scripted chunks.
#[derive(Clone)]
pub enum Tail {
    /// End the stream.
    End,
    /// Cancel the token, then never yield again.
    CancelAndHang(CancellationToken),
    /// Fail with a transport-level error.
    Fail,
}

/// [`CompletionSource`] replaying fixed transport chunks.
pub struct ScriptedSource {
    chunks: Vec<Bytes>,
    tail: Tail,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Bytes::from(c.into())).collect(),
            tail: Tail::End,
            opened: Arc::default(),
            released: Arc::default(),
        }
    }

    pub fn with_tail(mut self, tail: Tail) -> Self {
        self.tail = tail;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    async fn open(&self, _request: &PromptRequest) -> Result<ChunkStream, ClientError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let guard = ReleaseGuard(self.released.clone());
        let head = stream::iter(self.chunks.clone().into_iter().map(Ok));
        let tail = match self.tail.clone() {
            Tail::End => stream::empty().boxed(),
            Tail::CancelAndHang(token) => stream::once(async move {
                token.cancel();
                std::future::pending::<Result<Bytes, ClientError>>().await
            })
            .boxed(),
            Tail::Fail => stream::once(async {
                Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )))
            })
            .boxed(),
        };
        Ok(head
            .chain(tail)
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed())
    }
}
