//! The streaming decode-and-render loop.
//!
//! ```text
//! chunk -> SseLines -> parse_frame -> Reassembler -> token_color -> StyledDocument
//!                                                               \-> console
//! ```

use std::io::Write;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::color::token_color;
use crate::config::{PromptRequest, RenderOptions};
use crate::console;
use crate::document::{RenderedToken, StyledDocument};
use crate::error::ClientError;
use crate::frame::{SseLines, parse_frame};
use crate::openai::CompletionSource;
use crate::reassembler::{DecodedToken, Reassembler, Step};

/// Whether the chunk loop should keep reading.
enum Flow {
    Continue,
    Done,
}

/// Accumulates one generation: decoding state plus the document so far.
struct Generation<'a, W> {
    options: &'a RenderOptions,
    console: &'a mut W,
    reassembler: Reassembler,
    doc: StyledDocument,
}

impl<W: Write> Generation<'_, W> {
    fn handle_line(&mut self, line: &str) -> Result<Flow, ClientError> {
        let frame = parse_frame(line)?;
        if frame.done {
            return Ok(Flow::Done);
        }
        for (fragment, logprob) in frame.tokens {
            match self.reassembler.feed(&fragment, logprob) {
                Ok(Step::Emit(token)) => self.append(token)?,
                Ok(Step::Pending) => {}
                Ok(Step::Stop) => return Ok(Flow::Done),
                Err(e) => warn!(error = %e, fragment = %fragment, "dropping undecodable token"),
            }
        }
        Ok(Flow::Continue)
    }

    fn append(&mut self, token: DecodedToken) -> Result<(), ClientError> {
        let opts = self.options;
        let color = token_color(token.logprob, opts.bg, opts.accent, opts.include_coloring);
        trace!(token = %token.text, logprob = token.logprob, %color, "stream token");
        let rendered = RenderedToken {
            text: token.text,
            color,
            logprob: token.logprob,
        };
        console::print_token(&mut *self.console, &rendered)?;
        self.doc.push(rendered);
        Ok(())
    }

    fn finish(mut self) -> StyledDocument {
        if let Some(bytes) = self.reassembler.finish() {
            warn!(?bytes, "stream ended inside a multi-byte token; dropping it");
        }
        self.doc
    }
}

/// Stream one completion for `request`, printing tokens to `console` as they
/// arrive, and return the styled document.
///
/// Cancelling `cancel` stops reading and yields
/// [`ClientError::Interrupted`] holding what was rendered so far. The
/// connection is released on every return path.
pub async fn generate<W: Write>(
    source: &dyn CompletionSource,
    request: &PromptRequest,
    options: &RenderOptions,
    console: &mut W,
    cancel: &CancellationToken,
) -> Result<StyledDocument, ClientError> {
    let prompt = options.include_prompt.then(|| request.prompt.clone());
    if let Some(p) = &prompt {
        console::print_prompt(&mut *console, p)?;
    }
    let mut generation = Generation {
        options,
        console,
        reassembler: Reassembler::new(request.stop.clone()),
        doc: StyledDocument::new(prompt),
    };
    if cancel.is_cancelled() {
        return Err(ClientError::Interrupted {
            partial: generation.finish(),
        });
    }

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("completion request interrupted before the stream opened");
            return Err(ClientError::Interrupted { partial: generation.finish() });
        }
        opened = source.open(request) => opened?,
    };
    let mut lines = SseLines::new();
    'read: loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("completion stream interrupted");
                return Err(ClientError::Interrupted { partial: generation.finish() });
            }
            chunk = stream.next() => chunk,
        };
        let (batch, closed) = match next {
            Some(bytes) => (lines.push(&bytes?)?, false),
            None => (lines.finish()?.into_iter().collect::<Vec<_>>(), true),
        };
        for line in &batch {
            if let Flow::Done = generation.handle_line(line)? {
                break 'read;
            }
        }
        if closed {
            debug!("stream closed without [DONE]");
            break;
        }
    }
    drop(stream);

    let doc = generation.finish();
    debug!(response = %doc.completion(), tokens = doc.tokens.len(), "completion finished");
    Ok(doc)
}
