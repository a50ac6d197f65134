//! A client session: shared configuration, the image renderer, and
//! one-at-a-time generation rounds that persist their artifacts.

use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SessionSettings;
use crate::document::StyledDocument;
use crate::error::ClientError;
use crate::export::{ArtifactName, Export, append_text_artifact};
use crate::image::{CANVAS_HEIGHT, CANVAS_WIDTH, ChromeRenderer, ImageJob, ImageRenderer};
use crate::openai::{CompletionSource, OpenAiCompletions};
use crate::pipeline;

/// What one round produced.
#[derive(Debug)]
pub struct RoundReport {
    pub document: StyledDocument,
    pub text_path: PathBuf,
    pub image_path: Option<PathBuf>,
}

pub struct Session {
    settings: SessionSettings,
    source: Box<dyn CompletionSource>,
    renderer: Option<Box<dyn ImageRenderer>>,
}

impl Session {
    /// Connect to the configured endpoint and, when images are requested,
    /// acquire a renderer. A renderer that cannot start disables images for
    /// the session.
    pub fn open(settings: SessionSettings) -> Result<Self, ClientError> {
        let source = OpenAiCompletions::new(settings.api.clone())?;
        let renderer: Option<Box<dyn ImageRenderer>> = if settings.output.image {
            match ChromeRenderer::launch() {
                Ok(r) => Some(Box::new(r)),
                Err(e) => {
                    warn!(error = %e, "image rendering unavailable; images disabled");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self::with_parts(settings, Box::new(source), renderer))
    }

    pub fn with_parts(
        settings: SessionSettings,
        source: Box<dyn CompletionSource>,
        renderer: Option<Box<dyn ImageRenderer>>,
    ) -> Self {
        Self {
            settings,
            source,
            renderer,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn images_enabled(&self) -> bool {
        self.renderer.is_some()
    }

    /// Run one generation, print it live to `console`, and write its
    /// artifacts. Rounds share nothing but the session settings.
    pub async fn generate_round<W: Write>(
        &self,
        console: &mut W,
        cancel: &CancellationToken,
    ) -> Result<RoundReport, ClientError> {
        let SessionSettings {
            request,
            render,
            output,
            ..
        } = &self.settings;
        let document =
            pipeline::generate(self.source.as_ref(), request, render, console, cancel).await?;
        writeln!(console)?;

        let export = Export::from_document(&document);
        let name = ArtifactName::new(&request.prompt, request.temperature);

        let image_path = match &self.renderer {
            Some(renderer) => {
                let path = output
                    .image_path
                    .clone()
                    .unwrap_or_else(|| name.image_path(&output.image_dir, Local::now()));
                let job = ImageJob {
                    html: export.image_html(),
                    accent: render.accent,
                    watermark: output.watermark.clone(),
                    width: CANVAS_WIDTH,
                    height: CANVAS_HEIGHT,
                    output: path.clone(),
                    pngquant: output.pngquant,
                };
                match renderer.render(&job).await {
                    Ok(()) => {
                        info!(path = %path.display(), "image written");
                        Some(path)
                    }
                    Err(e) => {
                        warn!(error = %e, "image rendering failed");
                        None
                    }
                }
            }
            None => None,
        };

        let text_path = output
            .text_path
            .clone()
            .unwrap_or_else(|| name.text_path(&output.text_dir));
        append_text_artifact(&text_path, &export.plain_text).await?;
        info!(path = %text_path.display(), "text written");

        Ok(RoundReport {
            document,
            text_path,
            image_path,
        })
    }

    /// Release the image renderer. This is the session's single
    /// finalization point and must run however the rounds ended.
    pub async fn close(mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.close().await {
                warn!(error = %e, "failed to release image renderer");
            }
        }
    }
}
