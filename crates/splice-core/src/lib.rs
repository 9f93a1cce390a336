//! Core pipeline for Splice, inline code execution in text documents.
//!
//! This crate provides:
//! - Frontmatter extraction and shortcut expansion
//! - Block location around the cursor or after Enter
//! - Routing to an in-process evaluator or an interpreter process
//! - Keyed interpreter sessions with output draining
//! - Output insertion back into the document

pub mod block;
pub mod editor;
pub mod error;
pub mod eval;
pub mod frontmatter;
pub mod insert;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod session;
pub mod settings;
pub mod shortcut;

pub use block::{Block, BlockLocator};
pub use editor::{EditorSurface, Host, MemoryHost, Position, TextBuffer};
pub use error::{Error, Result};
pub use eval::{CalcEvaluator, DisabledEvaluator, Evaluation, Evaluator};
pub use frontmatter::{Frontmatter, FrontmatterValue};
pub use insert::{Insertion, OutputStyle, format_output, insert_output};
pub use pipeline::{PendingExecution, Pipeline, RunOutcome, Status};
pub use protocol::{Envelope, ExecutionContext, IncomingMessage, OutboundMessage};
pub use router::{GLOBAL_SESSION_KEY, IN_PROCESS_KEY, Router, SessionKey, Transport};
pub use session::{OutputChunk, OutputStream, SessionManager, SessionState, SpawnSpec};
pub use settings::Settings;
pub use shortcut::{ShortcutRule, ShortcutRules};
