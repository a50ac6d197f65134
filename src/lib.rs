//! Streams a text completion token by token and highlights each token by the
//! model's confidence in it.
//!
//! A generation flows one way:
//! transport chunk → [`frame`] → [`reassembler`] → [`color`] →
//! [`document`] → {live [`console`], [`export`] → [`image`]}.
//! [`pipeline::generate`] drives one generation and [`Session`] chains them.

pub mod args;
pub mod color;
pub mod config;
pub mod console;
pub mod document;
pub mod error;
pub mod export;
pub mod frame;
pub mod image;
pub mod openai;
pub mod pipeline;
pub mod reassembler;
pub mod session;
#[cfg(test)]
pub mod test_helpers;

pub use color::{Rgb, token_color};
pub use config::{ApiConfig, OutputOptions, PromptRequest, RenderOptions, SessionSettings};
pub use document::{RenderedToken, StyledDocument};
pub use error::{ClientError, DecodeError, ParseError};
pub use export::{ArtifactName, Export, normalize_hex_colors};
pub use frame::{StreamFrame, parse_frame};
pub use openai::{CompletionSource, OpenAiCompletions};
pub use pipeline::generate;
pub use reassembler::Reassembler;
pub use session::{RoundReport, Session};
