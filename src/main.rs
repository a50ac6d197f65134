use std::io::IsTerminal;

use clap::Parser;
use crossterm::{execute, terminal};
use logprob_render::args::{Args, DEFAULT_PROMPT, resolve_prompt};
use logprob_render::{ClientError, Session};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Prompt text from the flag, the user, or the default.
async fn prompt_text(args: &Args) -> anyhow::Result<String> {
    if let Some(p) = &args.prompt {
        return Ok(resolve_prompt(p).await?);
    }
    if !args.interactive {
        return Ok(DEFAULT_PROMPT.to_string());
    }
    let text = tokio::task::spawn_blocking(|| {
        inquire::Text::new("Prompt:")
            .with_default(DEFAULT_PROMPT)
            .prompt()
    })
    .await??;
    Ok(text)
}

async fn again() -> bool {
    let answer = tokio::task::spawn_blocking(|| {
        inquire::Confirm::new("Generate again?")
            .with_default(true)
            .prompt()
    })
    .await;
    matches!(answer, Ok(Ok(true)))
}

/// Cancel `token` on Ctrl-C.
fn watch_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli_common::init_logging(args.log_level)?;

    let interactive = args.interactive;
    let prompt = prompt_text(&args).await?;
    let settings = args.into_settings(prompt)?;
    let session = Session::open(settings)?;

    let cancel = CancellationToken::new();
    watch_interrupt(cancel.clone());

    let mut stdout = std::io::stdout();
    let mut failure = None;
    loop {
        if session.settings().render.include_prompt && stdout.is_terminal() {
            if let Err(e) = execute!(
                stdout,
                terminal::Clear(terminal::ClearType::All),
                crossterm::cursor::MoveTo(0, 0)
            ) {
                debug!(error = %e, "could not clear the terminal");
            }
        }
        match session.generate_round(&mut stdout, &cancel).await {
            Ok(report) => {
                debug!(tokens = report.document.tokens.len(), "round complete");
            }
            Err(ClientError::Interrupted { partial }) => {
                println!();
                eprintln!("Interrupted after {} tokens.", partial.tokens.len());
                break;
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                eprintln!("Generation failed: {e}");
                if !interactive || e.is_fatal() {
                    failure = Some(e);
                    break;
                }
            }
        }
        if !interactive || cancel.is_cancelled() || !again().await {
            break;
        }
    }

    session.close().await;
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
