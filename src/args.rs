use std::path::{Path, PathBuf};

use clap::Parser;
use cli_common::LogLevel;

use crate::color::Rgb;
use crate::config::{
    ApiConfig, DEFAULT_ACCENT, DEFAULT_API_BASE, DEFAULT_BG, DEFAULT_MODEL, DEFAULT_WATERMARK,
    OutputOptions, PromptRequest, RenderOptions, SessionSettings,
};
use crate::error::ClientError;

pub const DEFAULT_PROMPT: &str = "Once upon a time";

/// Command line arguments for the logprob-render binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "logprob-render",
    version,
    about = "Stream a completion with tokens highlighted by model confidence"
)]
pub struct Args {
    /// Prompt text, or a path to a file holding the prompt
    #[arg(short = 'p', long)]
    pub prompt: Option<String>,

    /// Sampling temperature
    #[arg(short = 't', long, default_value_t = 0.7, value_parser = parse_temperature)]
    pub temperature: f64,

    /// Maximum tokens to generate
    #[arg(short = 'n', long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_tokens: u32,

    /// Stop generating at this token
    #[arg(long, default_value = "")]
    pub stop: String,

    /// Engine to complete with
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Background color as r,g,b
    #[arg(long, default_value_t = RgbArg(DEFAULT_BG))]
    pub bg: RgbArg,

    /// Accent color as r,g,b, scaled by token probability
    #[arg(long, default_value_t = RgbArg(DEFAULT_ACCENT))]
    pub accent: RgbArg,

    /// Ask for the prompt when missing and offer to generate again
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Leave the prompt out of the output
    #[arg(long)]
    pub no_prompt: bool,

    /// Print every token on the plain background
    #[arg(long)]
    pub no_coloring: bool,

    /// Render a PNG of each generation with headless Chrome
    #[arg(long)]
    pub image: bool,

    /// Compress rendered PNGs with pngquant
    #[arg(long)]
    pub pngquant: bool,

    /// Text file to append generations to
    #[arg(long)]
    pub output_txt: Option<PathBuf>,

    /// Image file to write
    #[arg(long)]
    pub output_img: Option<PathBuf>,

    /// Footer text on rendered images
    #[arg(long, default_value = DEFAULT_WATERMARK)]
    pub watermark: String,

    /// API key for the completions endpoint
    #[arg(long, env = "OPENAI_API_SECRET_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the completions API
    #[arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Logging verbosity level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

/// [`Rgb`] as a CLI value: parsed from and printed as `r,g,b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbArg(pub Rgb);

impl std::str::FromStr for RgbArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl std::fmt::Display for RgbArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.0.r, self.0.g, self.0.b)
    }
}

fn parse_temperature(s: &str) -> Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=2.0).contains(&t) {
        Ok(t)
    } else {
        Err(format!("temperature {t} is outside 0..=2"))
    }
}

/// Use the contents of `arg` when it names a file, otherwise `arg` itself.
pub async fn resolve_prompt(arg: &str) -> std::io::Result<String> {
    let path = Path::new(arg);
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if is_file {
        tokio::fs::read_to_string(path).await
    } else {
        Ok(arg.to_string())
    }
}

impl Args {
    /// Validate the arguments into session settings. `prompt` is the already
    /// resolved prompt text.
    pub fn into_settings(self, prompt: String) -> Result<SessionSettings, ClientError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ClientError::Configuration(
                    "the OPENAI_API_SECRET_KEY environment variable has not been set".into(),
                )
            })?;
        Ok(SessionSettings {
            api: ApiConfig {
                base_url: self.api_base,
                api_key,
            },
            request: PromptRequest {
                prompt,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stop: self.stop,
                model: self.model,
            },
            render: RenderOptions {
                bg: self.bg.0,
                accent: self.accent.0,
                include_prompt: !self.no_prompt,
                include_coloring: !self.no_coloring,
            },
            output: OutputOptions {
                text_path: self.output_txt,
                image_path: self.output_img,
                image: self.image,
                pngquant: self.pngquant,
                watermark: self.watermark,
                ..OutputOptions::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["logprob-render", "--api-key", "sk-test"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_classic_client() {
        let args = parse(&[]);
        assert_eq!(args.temperature, 0.7);
        assert_eq!(args.max_tokens, 32);
        assert_eq!(args.stop, "");
        assert_eq!(args.model, "davinci");
        assert_eq!(args.bg.0, Rgb::new(31, 36, 40));
        assert_eq!(args.accent.0, Rgb::new(0, 64, 0));
        assert!(matches!(args.log_level, LogLevel::Info));
        assert!(!args.image && !args.interactive);
    }

    #[test]
    fn parses_colors_and_toggles() {
        let args = parse(&[
            "--bg", "0,0,0", "--accent", "255,0,128", "--no-prompt", "--no-coloring", "--image",
        ]);
        let settings = args.into_settings("p".into()).unwrap();
        assert_eq!(settings.render.bg, Rgb::new(0, 0, 0));
        assert_eq!(settings.render.accent, Rgb::new(255, 0, 128));
        assert!(!settings.render.include_prompt);
        assert!(!settings.render.include_coloring);
        assert!(settings.output.image);
    }

    #[test]
    fn rejects_out_of_range_values() {
        fn with(extra: &[&str]) -> Result<Args, clap::Error> {
            let mut argv = vec!["logprob-render", "--api-key", "k"];
            argv.extend_from_slice(extra);
            Args::try_parse_from(argv)
        }
        assert!(with(&["--temperature", "2.5"]).is_err());
        assert!(with(&["--temperature", "-0.1"]).is_err());
        assert!(with(&["--max-tokens", "0"]).is_err());
        assert!(with(&["--bg", "1,2"]).is_err());
        assert!(with(&["--temperature", "2"]).is_ok());
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let mut args = parse(&[]);
        args.api_key = None;
        assert!(matches!(
            args.into_settings("p".into()),
            Err(ClientError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn prompt_can_come_from_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("prompt.txt");
        std::fs::write(&file, "From a file").unwrap();
        assert_eq!(
            resolve_prompt(file.to_str().unwrap()).await.unwrap(),
            "From a file"
        );
        assert_eq!(resolve_prompt("Just text").await.unwrap(), "Just text");
        let dir_path = dir.path().to_str().unwrap();
        assert_eq!(resolve_prompt(dir_path).await.unwrap(), dir_path);
    }
}
