//! Run and Enter commands.
//!
//! Loads a document into a [`TextBuffer`], runs one block through the
//! pipeline and writes the document back when output was inserted. With an
//! interpreter process, output is collected until the process has been quiet
//! for a while.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use splice_core::{
    EditorSurface, OutputChunk, Pipeline, Position, RunOutcome, Status, TextBuffer,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::colors;
use crate::host::FsHost;
use crate::inspect::load_settings;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Line number (1-based)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub line: u64,

    /// Send the block to an interpreter process
    #[arg(long)]
    pub advanced: bool,

    /// Interpreter executable (implies --advanced)
    #[arg(long)]
    pub shell: Option<String>,

    /// Interpreter arguments
    #[arg(long, allow_hyphen_values = true)]
    pub shell_args: Option<String>,

    /// Milliseconds to wait for the first output
    #[arg(long, default_value = "5000")]
    pub wait_ms: u64,

    /// Milliseconds of silence after which output is considered complete
    #[arg(long, default_value = "300")]
    pub quiet_ms: u64,
}

/// What starts the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Run the block around the line.
    Cursor,
    /// Insert a line break after the line, then run the block it closes.
    Enter,
}

pub async fn execute(
    file: &Path,
    settings_path: Option<&Path>,
    args: &RunArgs,
    trigger: Trigger,
) -> anyhow::Result<()> {
    let mut settings = load_settings(settings_path)?;
    if args.advanced || args.shell.is_some() {
        settings.advanced_mode = true;
    }
    if let Some(shell) = &args.shell {
        settings.shell_path = shell.clone();
    }
    if let Some(shell_args) = &args.shell_args {
        settings.shell_args = shell_args.clone();
    }

    let text = tokio::fs::read_to_string(file).await?;
    let mut buffer = TextBuffer::new(text.clone());
    let line = args.line as usize - 1;
    if line >= buffer.line_count() {
        anyhow::bail!(
            "Line {} is past the end of {} ({} lines)",
            args.line,
            file.display(),
            buffer.line_count()
        );
    }

    if trigger == Trigger::Enter {
        let Some(end) = buffer.line_end(line) else {
            anyhow::bail!("Line {} does not exist", args.line);
        };
        buffer.replace_range("\n", end, end);
        buffer.set_cursor(Position::new(line + 1, 0));
    } else {
        buffer.set_cursor(Position::new(line, 0));
    }

    let host = FsHost::new(file.to_string_lossy());
    let (mut pipeline, mut rx) = Pipeline::new(Arc::new(settings), plugin_dir());

    pipeline.warm_up(&host).await?;
    let outcome = match trigger {
        Trigger::Cursor => pipeline.run_at_cursor(&host, &mut buffer).await,
        Trigger::Enter => pipeline.run_on_enter(&host, &mut buffer).await,
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            pipeline.unload().await;
            return Err(e.into());
        }
    };

    let written = match &outcome {
        RunOutcome::Dispatched { key } => {
            tracing::debug!("Collecting output from '{}'", key);
            let written = collect_output(&mut pipeline, &host, &mut buffer, &mut rx, args).await;
            if pipeline.status() == Status::Busy {
                println!("{}No output received{}", colors::YELLOW, colors::RESET);
            }
            written
        }
        RunOutcome::Inserted => 1,
        _ => 0,
    };
    pipeline.unload().await;

    match outcome {
        RunOutcome::NoBlock => anyhow::bail!("No code block found at line {}", args.line),
        RunOutcome::Ignored => anyhow::bail!("No interpreter session available"),
        RunOutcome::Skipped => {
            println!("{}Nothing to run{}", colors::YELLOW, colors::RESET);
            return Ok(());
        }
        _ => {}
    }

    if written > 0 && buffer.text() != text {
        tokio::fs::write(file, buffer.text()).await?;
        println!(
            "{}Updated{} {} {}({} output chunk(s)){}",
            colors::GREEN,
            colors::RESET,
            file.display(),
            colors::DIM,
            written,
            colors::RESET
        );
    }
    Ok(())
}

/// Feed process output into the buffer until it goes quiet.
///
/// Returns the number of chunks written.
async fn collect_output(
    pipeline: &mut Pipeline,
    host: &FsHost,
    buffer: &mut TextBuffer,
    rx: &mut UnboundedReceiver<OutputChunk>,
    args: &RunArgs,
) -> usize {
    let mut written = 0;
    loop {
        let limit = if pipeline.status() == Status::Busy {
            Duration::from_millis(args.wait_ms)
        } else {
            Duration::from_millis(args.quiet_ms)
        };

        match tokio::time::timeout(limit, rx.recv()).await {
            Ok(Some(chunk)) => {
                if matches!(
                    pipeline.handle_output(host, buffer, &chunk),
                    RunOutcome::Inserted | RunOutcome::Noticed
                ) {
                    written += 1;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    written
}

/// Directory `##plugin##` resolves to: the directory of this executable.
fn plugin_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
