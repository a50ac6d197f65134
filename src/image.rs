//! Rasterizing exported HTML to PNG with a headless browser.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::color::Rgb;

pub const DARK_TEMPLATE: &str = include_str!("../templates/dark.html");
pub const CANVAS_WIDTH: u32 = 450;
pub const CANVAS_HEIGHT: u32 = 600;

const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Everything needed to render one image.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub html: String,
    pub accent: Rgb,
    pub watermark: String,
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
    pub pngquant: bool,
}

impl ImageJob {
    /// Fill the page template with this job's parameters.
    pub fn render_page(&self, template: &str) -> anyhow::Result<String> {
        let mut ctx = Context::new();
        ctx.insert("html", &self.html);
        ctx.insert("accent", &self.accent.to_string());
        ctx.insert("watermark", &self.watermark);
        ctx.insert("width", &self.width);
        ctx.insert("height", &self.height);
        Ok(Tera::one_off(template, &ctx, true)?)
    }
}

/// A session-scoped capability turning HTML into an image file.
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, job: &ImageJob) -> anyhow::Result<()>;

    /// Release whatever the renderer holds. Called once per session.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Renders through a headless Chromium or Chrome binary.
///
/// The browser is located once per session but started once per image, each
/// run being a short-lived `--screenshot` process. What the session holds is
/// the scratch profile directory shared by those runs; it is removed by
/// [`ImageRenderer::close`] or, failing that, on drop.
#[derive(Debug)]
pub struct ChromeRenderer {
    browser: PathBuf,
    workdir: Option<PathBuf>,
}

impl ChromeRenderer {
    /// Locate a browser (`CHROME_PATH` first, then `PATH`) and set up the
    /// session's scratch directory.
    pub fn launch() -> anyhow::Result<Self> {
        let browser = std::env::var_os("CHROME_PATH")
            .map(PathBuf::from)
            .filter(|p| p.is_file())
            .or_else(|| BROWSER_CANDIDATES.iter().find_map(|name| find_in_path(name)))
            .ok_or_else(|| anyhow::anyhow!("no headless Chrome or Chromium binary found"))?;
        let workdir = std::env::temp_dir().join(format!("logprob-render-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workdir)?;
        info!(browser = %browser.display(), "image rendering enabled");
        Ok(Self {
            browser,
            workdir: Some(workdir),
        })
    }

    fn workdir(&self) -> anyhow::Result<&Path> {
        self.workdir
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("renderer already closed"))
    }
}

#[async_trait]
impl ImageRenderer for ChromeRenderer {
    async fn render(&self, job: &ImageJob) -> anyhow::Result<()> {
        let workdir = self.workdir()?;
        let page = workdir.join(format!("{}.html", uuid::Uuid::new_v4()));
        tokio::fs::write(&page, job.render_page(DARK_TEMPLATE)?).await?;
        if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let output = std::path::absolute(&job.output)?;

        let status = Command::new(&self.browser)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg(format!("--user-data-dir={}", workdir.display()))
            .arg(format!("--window-size={},{}", job.width, job.height))
            .arg(format!("--screenshot={}", output.display()))
            .arg(format!("file://{}", page.display()))
            .kill_on_drop(true)
            .output()
            .await?
            .status;
        tokio::fs::remove_file(&page).await.ok();
        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.browser.display());
        }
        debug!(output = %output.display(), "screenshot written");

        if job.pngquant {
            compress_png(&output).await;
        }
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(dir) = self.workdir.take() {
            tokio::fs::remove_dir_all(&dir).await?;
            debug!(dir = %dir.display(), "image renderer released");
        }
        Ok(())
    }
}

impl Drop for ChromeRenderer {
    fn drop(&mut self) {
        if let Some(dir) = self.workdir.take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

/// Lossy in-place compression. Failures leave the original image untouched.
async fn compress_png(path: &Path) {
    let res = Command::new("pngquant")
        .args(["--force", "--skip-if-larger", "--ext", ".png"])
        .arg(path)
        .status()
        .await;
    match res {
        // 98/99 mean the result would not have been smaller or good enough.
        Ok(s) if s.success() || matches!(s.code(), Some(98 | 99)) => {}
        Ok(s) => warn!(status = %s, "pngquant failed"),
        Err(e) => warn!(error = %e, "pngquant unavailable"),
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
