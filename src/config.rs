//! Immutable settings shared by every generation of a session.

use std::path::PathBuf;

use crate::color::Rgb;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "davinci";
pub const DEFAULT_WATERMARK: &str = "Generated via the OpenAI completions API";
pub const DEFAULT_BG: Rgb = Rgb::new(31, 36, 40);
pub const DEFAULT_ACCENT: Rgb = Rgb::new(0, 64, 0);

/// What to ask the completions endpoint for.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop: String,
    pub model: String,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 32,
            stop: String::new(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

/// How tokens are colored and whether the prompt leads the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub bg: Rgb,
    pub accent: Rgb,
    pub include_prompt: bool,
    pub include_coloring: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            bg: DEFAULT_BG,
            accent: DEFAULT_ACCENT,
            include_prompt: true,
            include_coloring: true,
        }
    }
}

/// Where artifacts go and whether an image is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub text_dir: PathBuf,
    pub image_dir: PathBuf,
    /// Overrides the content-addressed text path.
    pub text_path: Option<PathBuf>,
    /// Overrides the timestamped image path.
    pub image_path: Option<PathBuf>,
    pub image: bool,
    pub pngquant: bool,
    pub watermark: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            text_dir: PathBuf::from("txt_output"),
            image_dir: PathBuf::from("img_output"),
            text_path: None,
            image_path: None,
            image: false,
            pngquant: false,
            watermark: DEFAULT_WATERMARK.into(),
        }
    }
}

/// Endpoint location and credential.
#[derive(Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub api: ApiConfig,
    pub request: PromptRequest,
    pub render: RenderOptions,
    pub output: OutputOptions,
}
