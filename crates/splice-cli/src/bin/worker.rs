//! Splice reference interpreter.
//!
//! Reads one message per line from stdin, plain text or a JSON envelope, and
//! evaluates the command with the calculator. Results go to stdout, one per
//! message; continuation lines are prefixed with ` >> `. The frontmatter,
//! context and note path of the last envelope stay available as the
//! `frontmatter`, `context` and `note_path` commands, and
//! `get_frontmatter(key)` reads a single value.

use std::io::{self, BufRead, Write};
use std::sync::LazyLock;

use regex::Regex;
use splice_core::{
    BlockLocator, CalcEvaluator, Evaluation, Evaluator, ExecutionContext, Frontmatter,
    IncomingMessage,
};

/// Environment variable overriding the block delimiter stripped from commands.
const DELIMITER_ENV: &str = "SPLICE_DELIMITER";

const CONTINUATION_PREFIX: &str = " >> ";

const COMMANDS: [&str; 5] = ["info", "frontmatter", "context", "note_path", "get_frontmatter"];

static GET_FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^get_frontmatter\(\s*["']?([^"')]*?)["']?\s*\)$"#).expect("valid regex")
});

#[derive(Default)]
struct Globals {
    frontmatter: Frontmatter,
    context: ExecutionContext,
}

struct Worker<W: Write> {
    out: W,
    locator: BlockLocator,
    calc: CalcEvaluator,
    globals: Globals,
}

impl<W: Write> Worker<W> {
    fn new(out: W, delimiter: &str) -> Self {
        Self {
            out,
            locator: BlockLocator::new(delimiter),
            calc: CalcEvaluator::new(),
            globals: Globals::default(),
        }
    }

    fn handle_line(&mut self, line: &str) -> io::Result<()> {
        let Some(message) = IncomingMessage::decode_line(line) else {
            return Ok(());
        };

        let command = match message {
            IncomingMessage::Structured(envelope) => {
                tracing::debug!("Envelope for '{}'", envelope.context.note_path);
                self.globals.frontmatter = envelope.frontmatter;
                self.globals.context = envelope.context;
                envelope.command
            }
            IncomingMessage::Plain(command) => command,
        };

        let command = self.locator.strip_selection(&command);
        if command.is_empty() {
            return Ok(());
        }
        self.run(&command)
    }

    fn run(&mut self, command: &str) -> io::Result<()> {
        match command {
            "info" => {
                let listing: String = COMMANDS.iter().map(|c| format!("\n{}", c)).collect();
                self.log(&format!(
                    "splice-worker {}\nAvailable objects:{}",
                    env!("CARGO_PKG_VERSION"),
                    listing
                ))
            }
            "frontmatter" => {
                let json = serde_json::to_string(&self.globals.frontmatter)?;
                self.log(&json)
            }
            "context" => {
                let json = serde_json::to_string(&self.globals.context)?;
                self.log(&json)
            }
            "note_path" => {
                let path = self.globals.context.note_path.clone();
                self.log(&path)
            }
            _ => {
                if let Some(caps) = GET_FRONTMATTER.captures(command) {
                    return match self.globals.frontmatter.get(caps[1].trim()) {
                        Some(value) => {
                            let value = value.to_string();
                            self.log(&value)
                        }
                        None => Ok(()),
                    };
                }

                match self.calc.evaluate(command) {
                    Evaluation::Value(value) => self.log(&value),
                    Evaluation::Fault(fault) => self.log(&format!("Error: {}", fault)),
                    Evaluation::Empty => Ok(()),
                }
            }
        }
    }

    /// Write one result, prefixing continuation lines.
    fn log(&mut self, text: &str) -> io::Result<()> {
        let text = text.replace('\r', "");
        let formatted = text.replace('\n', &format!("\n{}", CONTINUATION_PREFIX));
        writeln!(self.out, "{}", formatted)?;
        self.out.flush()
    }
}

fn main() -> io::Result<()> {
    // stderr is read back as output by the host.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let delimiter = std::env::var(DELIMITER_ENV).unwrap_or_else(|_| "%%%".to_string());
    let mut worker = Worker::new(io::stdout().lock(), &delimiter);

    for line in io::stdin().lock().lines() {
        let line = line?;
        if let Err(e) = worker.handle_line(&line) {
            tracing::warn!("Failed to handle message: {}", e);
        }
    }

    tracing::debug!("Input closed, exiting");
    Ok(())
}
