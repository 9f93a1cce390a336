//! Interpreter process sessions.
//!
//! [`SessionManager`] owns every running interpreter, keyed by
//! [`SessionKey`]. Each session gets its own reader tasks for stdout and
//! stderr that forward raw chunks over one shared channel; the owner of the
//! receiving end feeds chunks back through [`SessionManager::drain`], which
//! applies start-up suppression and the cleanup pattern.
//!
//! Chunks carry the id of the session that produced them, so output from a
//! session that has since been stopped or replaced is recognized and dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::router::SessionKey;
use crate::settings::{PLUGIN_DIR_PLACEHOLDER, Settings};

/// How long a stopping process may take to exit on its own before it is
/// killed.
pub const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

const READ_BUFFER_SIZE: usize = 4096;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A raw piece of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub key: SessionKey,
    pub session_id: Uuid,
    pub stream: OutputStream,
    pub text: String,
}

/// Everything needed to start an interpreter.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub startup: Option<String>,
    pub teardown: Option<String>,
    /// Number of output chunks discarded after start.
    pub suppressed: usize,
    pub cleanup: Option<Regex>,
}

impl SpawnSpec {
    /// Build a spawn spec from settings.
    ///
    /// `##plugin##` in the shell path, arguments and environment values is
    /// replaced by `plugin_dir`. The program is looked up on `PATH`; if the
    /// lookup fails the configured path is used as is.
    pub fn from_settings(settings: &Settings, plugin_dir: &Path) -> Result<Self> {
        let dir = plugin_dir.to_string_lossy();
        let resolve = |text: &str| text.replace(PLUGIN_DIR_PLACEHOLDER, &dir);

        let shell = resolve(settings.shell_path.trim());
        let program = which::which(&shell).unwrap_or_else(|_| PathBuf::from(&shell));

        let non_empty = |text: &str| {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        };

        Ok(Self {
            program,
            args: settings.args()?.iter().map(|arg| resolve(arg)).collect(),
            env: settings
                .env_vars()
                .into_iter()
                .map(|(key, value)| (key, resolve(&value)))
                .collect(),
            startup: non_empty(&settings.startup_command),
            teardown: non_empty(&settings.teardown_command),
            suppressed: settings.suppressed_lines,
            cleanup: settings.cleanup_pattern()?,
        })
    }
}

/// Observed state of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// The process exited on its own; the record stays until stopped.
    Exited,
}

struct Session {
    id: Uuid,
    child: Child,
    stdin: Option<ChildStdin>,
    readers: Vec<JoinHandle<()>>,
    teardown: Option<String>,
    suppress_remaining: usize,
    cleanup: Option<Regex>,
}

/// Keyed registry of interpreter sessions.
pub struct SessionManager {
    sessions: FxHashMap<SessionKey, Session>,
    tx: mpsc::UnboundedSender<OutputChunk>,
}

impl SessionManager {
    /// Create a manager and the receiver its sessions' output arrives on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            sessions: FxHashMap::default(),
            tx,
        };
        (manager, rx)
    }

    /// Start a session for `key`, stopping any session already using it.
    ///
    /// Returns the new session's id.
    pub async fn start(&mut self, key: &SessionKey, spec: &SpawnSpec) -> Result<Uuid> {
        if self.sessions.contains_key(key) {
            self.stop(key).await;
        }

        tracing::info!("Starting session '{}': {}", key, spec.program.display());

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn {
                program: spec.program.display().to_string(),
                message: e.to_string(),
            })?;

        let id = Uuid::new_v4();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.forward(key, id, OutputStream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.forward(key, id, OutputStream::Stderr, stderr));
        }

        let mut session = Session {
            id,
            stdin: child.stdin.take(),
            child,
            readers,
            teardown: spec.teardown.clone(),
            suppress_remaining: spec.suppressed,
            cleanup: spec.cleanup.clone(),
        };

        if let Some(startup) = &spec.startup
            && let Err(e) = write_line(&mut session, startup).await
        {
            tracing::warn!("Failed to send startup command to '{}': {}", key, e);
        }

        self.sessions.insert(key.clone(), session);
        Ok(id)
    }

    /// Spawn a task forwarding everything read from `pipe` as chunks.
    fn forward<R>(
        &self,
        key: &SessionKey,
        id: Uuid,
        stream: OutputStream,
        mut pipe: R,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.tx.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let mut decoder = Utf8Decoder::default();
            loop {
                let text = match pipe.read(&mut buf).await {
                    Ok(0) => decoder.finish(),
                    Ok(n) => decoder.decode(&buf[..n]),
                    Err(e) => {
                        tracing::debug!("Read from '{}' {:?} failed: {}", key, stream, e);
                        decoder.finish()
                    }
                };
                let done = decoder.is_finished();
                if !text.is_empty() {
                    let chunk = OutputChunk {
                        key: key.clone(),
                        session_id: id,
                        stream,
                        text,
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                if done {
                    break;
                }
            }
        })
    }

    /// Send raw text to a session.
    ///
    /// Returns `Ok(false)` when no session is registered under `key`.
    pub async fn send(&mut self, key: &SessionKey, payload: &str) -> Result<bool> {
        let Some(session) = self.sessions.get_mut(key) else {
            tracing::debug!("No session '{}', message dropped", key);
            return Ok(false);
        };
        let stdin = session
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Session(format!("session '{}' has no input", key)))?;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.flush().await?;
        Ok(true)
    }

    /// Send `text` followed by a line break.
    pub async fn send_line(&mut self, key: &SessionKey, text: &str) -> Result<bool> {
        self.send(key, &format!("{}\n", text)).await
    }

    /// Stop the session under `key`.
    ///
    /// The teardown command is sent, the process gets a short grace period
    /// to exit and is then killed. Every failure along the way is logged and
    /// swallowed; the record is removed regardless. Returns whether a
    /// session existed.
    pub async fn stop(&mut self, key: &SessionKey) -> bool {
        let Some(mut session) = self.sessions.remove(key) else {
            return false;
        };
        tracing::info!("Stopping session '{}'", key);

        if let Some(teardown) = session.teardown.clone()
            && let Err(e) = write_line(&mut session, &teardown).await
        {
            tracing::debug!("Teardown for '{}' failed: {}", key, e);
        }
        drop(session.stdin.take());

        match tokio::time::timeout(TEARDOWN_GRACE, session.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Session '{}' exited: {}", key, status),
            Ok(Err(e)) => tracing::debug!("Waiting for '{}' failed: {}", key, e),
            Err(_) => {
                if let Err(e) = session.child.kill().await {
                    tracing::warn!("Failed to kill session '{}': {}", key, e);
                }
            }
        }

        for reader in session.readers {
            reader.abort();
        }
        true
    }

    /// Stop and start the session under `key`.
    pub async fn restart(&mut self, key: &SessionKey, spec: &SpawnSpec) -> Result<Uuid> {
        self.stop(key).await;
        self.start(key, spec).await
    }

    /// Stop every session.
    pub async fn stop_all(&mut self) {
        let keys: Vec<SessionKey> = self.sessions.keys().cloned().collect();
        for key in keys {
            self.stop(&key).await;
        }
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn state(&mut self, key: &SessionKey) -> Option<SessionState> {
        let session = self.sessions.get_mut(key)?;
        Some(match session.child.try_wait() {
            Ok(None) => SessionState::Running,
            _ => SessionState::Exited,
        })
    }

    /// Id of the session under `key`.
    pub fn session_id(&self, key: &SessionKey) -> Option<Uuid> {
        self.sessions.get(key).map(|session| session.id)
    }

    /// Whether the process under `key` is still running.
    pub fn is_alive(&mut self, key: &SessionKey) -> bool {
        self.state(key) == Some(SessionState::Running)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Turn a raw chunk into insertable text.
    ///
    /// Chunks from unknown or replaced sessions are dropped, as are the
    /// first `suppressed` chunks of each session. The cleanup pattern is
    /// stripped from every line; whitespace-only results are dropped.
    pub fn drain(&mut self, chunk: &OutputChunk) -> Option<String> {
        let session = self.sessions.get_mut(&chunk.key)?;
        if session.id != chunk.session_id {
            tracing::debug!("Dropping output from replaced session '{}'", chunk.key);
            return None;
        }

        if session.suppress_remaining > 0 {
            session.suppress_remaining -= 1;
            tracing::debug!(
                "Suppressed chunk from '{}' ({} left)",
                chunk.key,
                session.suppress_remaining
            );
            return None;
        }

        let text = clean_output(&chunk.text, session.cleanup.as_ref());
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Incremental UTF-8 decoding across pipe reads.
///
/// A character split between two reads is held back until its remaining
/// bytes arrive. Invalid sequences become U+FFFD.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
    finished: bool,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is held back; the stream is over.
    fn finish(&mut self) -> String {
        self.finished = true;
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Strip `pattern` from every line of `text`.
pub fn clean_output(text: &str, pattern: Option<&Regex>) -> String {
    let Some(pattern) = pattern else {
        return text.to_string();
    };
    text.split('\n')
        .map(|line| pattern.replace_all(line, ""))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn write_line(session: &mut Session, text: &str) -> Result<()> {
    let stdin = session
        .stdin
        .as_mut()
        .ok_or_else(|| Error::Session("session has no input".to_string()))?;
    stdin.write_all(format!("{}\n", text).as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}
