//! The styled result of one generation.

use crate::color::Rgb;

/// A decoded token with its resolved highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedToken {
    pub text: String,
    pub color: Rgb,
    pub logprob: f64,
}

/// Ordered tokens of a generation, optionally led by the prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledDocument {
    pub prompt: Option<String>,
    pub tokens: Vec<RenderedToken>,
}

impl StyledDocument {
    pub fn new(prompt: Option<String>) -> Self {
        Self {
            prompt,
            tokens: Vec::new(),
        }
    }

    pub fn push(&mut self, token: RenderedToken) {
        self.tokens.push(token);
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Generated text without the prompt.
    pub fn completion(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    /// Prompt and tokens concatenated without styling, outer whitespace trimmed.
    pub fn plain_text(&self) -> String {
        let mut out = self.prompt.clone().unwrap_or_default();
        out.push_str(&self.completion());
        out.trim().to_string()
    }

    /// HTML with one inline-styled span per token.
    ///
    /// Colors are written as `#rrggbb`; see
    /// [`normalize_hex_colors`](crate::export::normalize_hex_colors) for the
    /// form image rendering needs.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        if let Some(prompt) = &self.prompt {
            html.push_str("<span style=\"font-weight: bold\">");
            html.push_str(&escape_html(prompt));
            html.push_str("</span>");
        }
        for token in &self.tokens {
            html.push_str("<span style=\"background-color: ");
            html.push_str(&token.color.to_hex());
            html.push_str("\">");
            html.push_str(&escape_html(&token.text));
            html.push_str("</span>");
        }
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
