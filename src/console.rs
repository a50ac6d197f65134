//! Live terminal output for a streaming generation.

use std::io::Write;

use crossterm::queue;
use crossterm::style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor};

use crate::document::RenderedToken;

/// Print the prompt in bold.
pub fn print_prompt<W: Write>(out: &mut W, prompt: &str) -> std::io::Result<()> {
    queue!(
        out,
        SetAttribute(Attribute::Bold),
        Print(prompt),
        SetAttribute(Attribute::Reset)
    )?;
    out.flush()
}

/// Print a token on its highlight color.
///
/// Colors are reset before every line break so the highlight does not bleed
/// to the end of the terminal line.
pub fn print_token<W: Write>(out: &mut W, token: &RenderedToken) -> std::io::Result<()> {
    for (i, segment) in token.text.split('\n').enumerate() {
        if i > 0 {
            queue!(out, Print('\n'))?;
        }
        if !segment.is_empty() {
            queue!(
                out,
                SetBackgroundColor(token.color.into()),
                Print(segment),
                ResetColor
            )?;
        }
    }
    out.flush()
}
