//! Plain-text and HTML artifacts for a finished generation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::document::StyledDocument;

pub const TEXT_SEPARATOR_WIDTH: usize = 20;

/// A standalone `#RRGGBB` literal: not part of an entity such as `&#123456;`,
/// not the tail of an identifier, not followed by more word characters.
static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<lead>^|[^&#\w])#(?P<hex>[0-9A-Fa-f]{6})\b").expect("valid regex")
});

/// Rewrite every `#RRGGBB` color to `rgb(r,g,b)`.
///
/// Headless browsers used for image rendering expect the functional form in
/// inline styles.
pub fn normalize_hex_colors(html: &str) -> String {
    HEX_COLOR_RE
        .replace_all(html, |caps: &Captures| {
            let hex = &caps["hex"];
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
            format!(
                "{}rgb({},{},{})",
                &caps["lead"],
                channel(0),
                channel(2),
                channel(4)
            )
        })
        .into_owned()
}

/// The text and HTML renderings of a document.
#[derive(Debug, Clone)]
pub struct Export {
    pub plain_text: String,
    pub html: String,
}

impl Export {
    pub fn from_document(doc: &StyledDocument) -> Self {
        Self {
            plain_text: doc.plain_text(),
            html: normalize_hex_colors(&doc.to_html()),
        }
    }

    /// HTML body for the image template; line breaks become `</br>`.
    pub fn image_html(&self) -> String {
        self.html.replace('\n', "</br>")
    }
}

/// Content-addressed naming for artifacts of a prompt/temperature pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub prompt_hash: String,
    pub temperature: String,
}

impl ArtifactName {
    pub fn new(prompt: &str, temperature: f64) -> Self {
        Self {
            prompt_hash: prompt_hash(prompt),
            temperature: temperature_tag(temperature),
        }
    }

    /// `{dir}/{hash}__{temp}.txt`
    pub fn text_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}__{}.txt", self.prompt_hash, self.temperature))
    }

    /// `{dir}/{YYYYmmdd_HHMMSS}__{hash}__{temp}.png`
    pub fn image_path(&self, dir: &Path, at: DateTime<Local>) -> PathBuf {
        dir.join(format!(
            "{}__{}__{}.png",
            at.format("%Y%m%d_%H%M%S"),
            self.prompt_hash,
            self.temperature
        ))
    }
}

/// First eight hex digits of the prompt's SHA-256.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(prompt.as_bytes()));
    digest[..8].to_string()
}

pub fn temperature_tag(temperature: f64) -> String {
    // Whole numbers keep their `.0`: 1.0 tags as `1_0`, not `1`.
    format!("{temperature:?}").replace('.', "_")
}

/// Append a generation to a text artifact, followed by a separator line.
pub async fn append_text_artifact(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let entry = format!("{text}\n{}\n", "=".repeat(TEXT_SEPARATOR_WIDTH));
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;
    debug!(path = %path.display(), "appended text artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::document::RenderedToken;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn rewrites_hex_to_rgb() {
        assert_eq!(normalize_hex_colors("#1F2428"), "rgb(31,36,40)");
        assert_eq!(
            normalize_hex_colors(r#"<span style="background-color: #1f2428">x</span>"#),
            r#"<span style="background-color: rgb(31,36,40)">x</span>"#
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let html = r#"<b style="color: #00ff00">a</b><i style="background-color: #102030">b</i>"#;
        let once = normalize_hex_colors(html);
        assert!(!once.contains('#'), "{once}");
        assert_eq!(normalize_hex_colors(&once), once);
    }

    #[test]
    fn leaves_non_color_hashes_alone() {
        let inputs = [
            "&#123456;",
            "issue #1234567",
            "id#abcdef",
            "##abcdef",
            "#12345g",
            "#zzzzzz\"",
        ];
        for input in inputs {
            assert_eq!(normalize_hex_colors(input), input);
        }
    }

    #[test]
    fn export_normalizes_document_html() {
        let mut doc = StyledDocument::new(None);
        doc.push(RenderedToken {
            text: "a\nb".into(),
            color: Rgb::new(31, 36, 40),
            logprob: 0.0,
        });
        let export = Export::from_document(&doc);
        assert_eq!(export.plain_text, "a\nb");
        assert!(export.html.contains("rgb(31,36,40)"));
        assert!(export.image_html().contains("a</br>b"));
    }

    #[test]
    fn artifact_names_are_deterministic() {
        let name = ArtifactName::new("Once upon a time", 0.7);
        assert_eq!(name.prompt_hash.len(), 8);
        assert_eq!(name, ArtifactName::new("Once upon a time", 0.7));
        assert_ne!(name.prompt_hash, prompt_hash("Once upon a time."));
        assert_eq!(name.temperature, "0_7");
        assert_eq!(temperature_tag(0.0), "0_0");
        assert_eq!(temperature_tag(1.0), "1_0");
        assert_eq!(temperature_tag(2.0), "2_0");
        assert_eq!(temperature_tag(1.25), "1_25");

        let text = name.text_path(Path::new("txt_output"));
        assert_eq!(
            text,
            PathBuf::from(format!("txt_output/{}__0_7.txt", name.prompt_hash))
        );
        let at = Local.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let img = name.image_path(Path::new("img_output"), at);
        assert_eq!(
            img,
            PathBuf::from(format!(
                "img_output/20210304_050607__{}__0_7.png",
                name.prompt_hash
            ))
        );
    }

    #[test]
    fn known_prompt_hash() {
        // sha256("abc") = ba7816bf...
        assert_eq!(prompt_hash("abc"), "ba7816bf");
    }

    #[tokio::test]
    async fn text_artifact_accumulates_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        append_text_artifact(&path, "first").await.unwrap();
        append_text_artifact(&path, "second").await.unwrap();
        let sep = "=".repeat(20);
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            format!("first\n{sep}\nsecond\n{sep}\n")
        );
    }
}
