//! Execution pipeline.
//!
//! [`Pipeline`] wires the components together behind explicit commands:
//!
//! - [`Pipeline::run_at_cursor`]: run the selection or the block around the
//!   cursor
//! - [`Pipeline::run_on_enter`]: run the block closed by the line above the
//!   cursor
//! - [`Pipeline::handle_output`]: write interpreter output back
//! - [`Pipeline::warm_up`], [`Pipeline::restart_session`],
//!   [`Pipeline::stop_session`]: session lifecycle
//! - [`Pipeline::apply_settings`], [`Pipeline::unload`]: global lifecycle
//!
//! In-process results are written back before the command returns. Process
//! output arrives later on the receiver returned by [`Pipeline::new`] and is
//! handed back through [`Pipeline::handle_output`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::block::BlockLocator;
use crate::editor::{EditorSurface, Host};
use crate::error::Result;
use crate::eval::{CalcEvaluator, Evaluator};
use crate::frontmatter::{self, Frontmatter};
use crate::insert::{OutputStyle, insert_output};
use crate::protocol::ExecutionContext;
use crate::router::{Router, SessionKey, Transport};
use crate::session::{OutputChunk, SessionManager, SpawnSpec};
use crate::settings::Settings;
use crate::shortcut::ShortcutRules;

/// Busy indicator shown while a process is working on a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Busy,
}

/// The execution output is expected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExecution {
    /// Document that was active when the command was issued.
    pub document: Option<String>,
    /// Line the output is inserted below.
    pub line: usize,
}

/// What a command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No block around the cursor.
    NoBlock,
    /// Nothing to run.
    Skipped,
    /// Output was written into the document.
    Inserted,
    /// Output was shown as a notice.
    Noticed,
    /// The command produced no output.
    Nothing,
    /// The command was sent to the session under `key`.
    Dispatched { key: SessionKey },
    /// No session was available for the command.
    Ignored,
    /// The document changed underneath the command; nothing was written.
    Stale,
}

pub struct Pipeline {
    settings: Arc<Settings>,
    rules: ShortcutRules,
    locator: BlockLocator,
    style: OutputStyle,
    plugin_dir: PathBuf,
    sessions: SessionManager,
    evaluator: Box<dyn Evaluator>,
    pending: Option<PendingExecution>,
    status: Status,
}

impl Pipeline {
    /// Create a pipeline for a settings snapshot.
    ///
    /// `plugin_dir` replaces `##plugin##` in interpreter settings. Process
    /// output arrives on the returned receiver.
    pub fn new(
        settings: Arc<Settings>,
        plugin_dir: impl Into<PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<OutputChunk>) {
        let (sessions, rx) = SessionManager::new();
        let pipeline = Self {
            rules: settings.shortcut_rules(),
            locator: BlockLocator::new(&settings.delimiter),
            style: OutputStyle::from_settings(&settings),
            settings,
            plugin_dir: plugin_dir.into(),
            sessions,
            evaluator: Box::new(CalcEvaluator::new()),
            pending: None,
            status: Status::Idle,
        };
        (pipeline, rx)
    }

    /// Replace the in-process evaluator.
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn pending(&self) -> Option<&PendingExecution> {
        self.pending.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run the selection, or the block around the cursor.
    pub async fn run_at_cursor<H, S>(&mut self, host: &H, surface: &mut S) -> Result<RunOutcome>
    where
        H: Host,
        S: EditorSurface + ?Sized,
    {
        if let Some(selection) = surface.selection().filter(|s| !s.trim().is_empty()) {
            let content = self.locator.strip_selection(&selection);
            let anchor = surface.cursor().line;
            return self
                .execute(host, surface, &content, anchor, Some(selection))
                .await;
        }

        let lines = surface.lines();
        let cursor = surface.cursor();
        let Some(block) = self.locator.locate(&lines, cursor.line) else {
            host.notice("No code block found at the cursor");
            return Ok(RunOutcome::NoBlock);
        };

        tracing::debug!("Block at lines {}..={}", block.start_line, block.end_line);
        self.execute(host, surface, &block.content, block.end_line, None)
            .await
    }

    /// Run the block closed by the delimiter just above the cursor line.
    ///
    /// Call after a line break was inserted; the cursor sits on the new line.
    pub async fn run_on_enter<H, S>(&mut self, host: &H, surface: &mut S) -> Result<RunOutcome>
    where
        H: Host,
        S: EditorSurface + ?Sized,
    {
        if !self.settings.execute_on_enter {
            return Ok(RunOutcome::Skipped);
        }

        let lines = surface.lines();
        let Some(block) = self.locator.closed_above(&lines, surface.cursor().line) else {
            return Ok(RunOutcome::Skipped);
        };
        self.execute(host, surface, &block.content, block.end_line, None)
            .await
    }

    async fn execute<H, S>(
        &mut self,
        host: &H,
        surface: &mut S,
        content: &str,
        anchor_line: usize,
        selected_text: Option<String>,
    ) -> Result<RunOutcome>
    where
        H: Host,
        S: EditorSurface + ?Sized,
    {
        if content.trim().is_empty() {
            return Ok(RunOutcome::Skipped);
        }

        let command = self.rules.expand(content);
        let cursor_line = surface.cursor().line;

        let Some(end) = surface.line_end(anchor_line) else {
            tracing::debug!("Anchor line {} no longer exists", anchor_line);
            return Ok(RunOutcome::Stale);
        };

        let document = host.active_document();
        let router = Router::new(&self.settings, host.is_mobile());
        let key = router.route_key(document.as_deref());

        let structured = match router.transport() {
            Transport::InProcess => {
                surface.set_cursor(end);
                self.pending = Some(PendingExecution {
                    document,
                    line: anchor_line,
                });
                let output = self.evaluator.evaluate(&command).into_output();
                return Ok(match output {
                    Some(text) => self.deliver(host, surface, &text),
                    None => RunOutcome::Nothing,
                });
            }
            Transport::Process { structured } => structured,
        };

        if !self.sessions.contains(&key) {
            tracing::debug!("No session '{}', command ignored", key);
            return Ok(RunOutcome::Ignored);
        }

        let frontmatter = if structured {
            let frontmatter = self.read_frontmatter(host, document.as_deref()).await;
            if host.active_document() != document {
                tracing::debug!("Active document changed while reading frontmatter");
                return Ok(RunOutcome::Stale);
            }
            frontmatter
        } else {
            None
        };

        let context = ExecutionContext {
            note_path: document.clone().unwrap_or_default(),
            cursor_line,
            selected_text,
        };
        let payload = router.message(&command, frontmatter, context).encode()?;

        self.pending = Some(PendingExecution {
            document,
            line: anchor_line,
        });
        match self.sessions.send(&key, &payload).await {
            Ok(true) => {
                tracing::debug!("Dispatched {} bytes to '{}'", payload.len(), key);
                surface.set_cursor(end);
                self.status = Status::Busy;
                Ok(RunOutcome::Dispatched { key })
            }
            Ok(false) => Ok(RunOutcome::Ignored),
            Err(e) => {
                tracing::warn!("Failed to send to '{}': {}", key, e);
                Ok(RunOutcome::Ignored)
            }
        }
    }

    async fn read_frontmatter<H: Host>(&self, host: &H, document: Option<&str>) -> Option<Frontmatter> {
        let path = document?;
        match host.read_document(path).await {
            Ok(text) => Some(frontmatter::extract(&text)),
            Err(e) => {
                tracing::warn!("Could not read frontmatter: {}", e);
                None
            }
        }
    }

    fn deliver<H, S>(&self, host: &H, surface: &mut S, text: &str) -> RunOutcome
    where
        H: Host,
        S: EditorSurface + ?Sized,
    {
        if self.settings.notice_output {
            host.notice(text.trim_end());
            return RunOutcome::Noticed;
        }
        match insert_output(surface, text, &self.style) {
            Some(_) => RunOutcome::Inserted,
            None => RunOutcome::Stale,
        }
    }

    /// Write a chunk of process output into the document.
    ///
    /// Output is only written while the document that issued the pending
    /// execution is still active.
    pub fn handle_output<H, S>(&mut self, host: &H, surface: &mut S, chunk: &OutputChunk) -> RunOutcome
    where
        H: Host,
        S: EditorSurface + ?Sized,
    {
        let Some(text) = self.sessions.drain(chunk) else {
            return RunOutcome::Nothing;
        };
        self.status = Status::Idle;

        let Some(pending) = &self.pending else {
            tracing::debug!("Output from '{}' with nothing pending", chunk.key);
            return RunOutcome::Nothing;
        };
        if host.active_document() != pending.document {
            tracing::debug!("Active document changed, output from '{}' dropped", chunk.key);
            return RunOutcome::Stale;
        }

        self.deliver(host, surface, &text)
    }

    /// Make sure the session for the active document is running.
    ///
    /// Returns the id of a newly started session, or `None` when no start
    /// was needed. Start failures are shown as a notice and returned.
    pub async fn warm_up<H: Host>(&mut self, host: &H) -> Result<Option<Uuid>> {
        let router = Router::new(&self.settings, host.is_mobile());
        if router.transport() == Transport::InProcess {
            return Ok(None);
        }

        let key = router.route_key(host.active_document().as_deref());
        if self.sessions.is_alive(&key) {
            return Ok(None);
        }
        self.start_session(host, &key).await.map(Some)
    }

    /// Tear down and re-create the session for the active document.
    pub async fn restart_session<H: Host>(&mut self, host: &H) -> Result<Option<Uuid>> {
        let router = Router::new(&self.settings, host.is_mobile());
        if router.transport() == Transport::InProcess {
            return Ok(None);
        }

        let key = router.route_key(host.active_document().as_deref());
        self.status = Status::Busy;
        self.sessions.stop(&key).await;
        let started = self.start_session(host, &key).await;
        self.status = Status::Idle;
        started.map(Some)
    }

    /// Tear down the session for the active document.
    ///
    /// Commands routed to it are ignored until the next warm-up.
    pub async fn stop_session<H: Host>(&mut self, host: &H) -> bool {
        let router = Router::new(&self.settings, host.is_mobile());
        let key = router.route_key(host.active_document().as_deref());
        self.sessions.stop(&key).await
    }

    async fn start_session<H: Host>(&mut self, host: &H, key: &SessionKey) -> Result<Uuid> {
        let started = match SpawnSpec::from_settings(&self.settings, &self.plugin_dir) {
            Ok(spec) => self.sessions.start(key, &spec).await,
            Err(e) => Err(e),
        };
        started.inspect_err(|e| {
            tracing::warn!("Session '{}' not started: {}", key, e);
            host.notice(&e.with_hint());
        })
    }

    /// Switch to a new settings snapshot. Every session is stopped.
    pub async fn apply_settings(&mut self, settings: Arc<Settings>) {
        self.sessions.stop_all().await;
        self.rules = settings.shortcut_rules();
        self.locator = BlockLocator::new(&settings.delimiter);
        self.style = OutputStyle::from_settings(&settings);
        self.settings = settings;
        self.pending = None;
        self.status = Status::Idle;
    }

    /// Stop every session.
    pub async fn unload(&mut self) {
        self.sessions.stop_all().await;
        self.pending = None;
        self.status = Status::Idle;
    }
}
