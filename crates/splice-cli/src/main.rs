//! Splice CLI - run code blocks embedded in text documents.

mod colors;
mod host;
mod inspect;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "splice")]
#[command(about = "Run code blocks embedded in text documents and splice the output back")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the block around a line and write its output into the file
    Run {
        /// Path to the document
        file: PathBuf,

        #[command(flatten)]
        options: run::RunArgs,
    },

    /// Simulate pressing Enter at the end of a line and run the block it closes
    Enter {
        /// Path to the document
        file: PathBuf,

        #[command(flatten)]
        options: run::RunArgs,
    },

    /// Show the block around a line
    Locate {
        /// Path to the document
        file: PathBuf,

        /// Line number (1-based)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        line: u64,
    },

    /// Expand shortcuts in a command
    Expand {
        /// Command text
        content: String,
    },

    /// Print a document's frontmatter as JSON
    Frontmatter {
        /// Path to the document
        file: PathBuf,
    },

    /// Show the effective settings
    Settings {
        /// Print the settings file location instead
        #[arg(long)]
        path: bool,

        /// Write default settings if no settings file exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format splice-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(splice_err) = err.downcast_ref::<splice_core::Error>() {
            anyhow::anyhow!("{}", splice_err.with_hint())
        } else {
            err
        }
    };

    let settings_path = cli.settings.or_else(splice_core::Settings::default_path);

    match cli.command {
        Commands::Run { file, options } => {
            run::execute(&file, settings_path.as_deref(), &options, run::Trigger::Cursor)
                .await
                .map_err(format_error)?;
        }

        Commands::Enter { file, options } => {
            run::execute(&file, settings_path.as_deref(), &options, run::Trigger::Enter)
                .await
                .map_err(format_error)?;
        }

        Commands::Locate { file, line } => {
            inspect::locate(&file, settings_path.as_deref(), line as usize - 1)
                .map_err(format_error)?;
        }

        Commands::Expand { content } => {
            inspect::expand(&content, settings_path.as_deref()).map_err(format_error)?;
        }

        Commands::Frontmatter { file } => {
            inspect::frontmatter(&file).map_err(format_error)?;
        }

        Commands::Settings { path, init } => {
            inspect::settings(settings_path.as_deref(), path, init).map_err(format_error)?;
        }
    }

    Ok(())
}
