//! Editor-host collaborators.
//!
//! The pipeline never talks to a concrete editor. It needs an
//! [`EditorSurface`] for the document being edited and a [`Host`] for
//! everything around it (which document is active, reading files, showing
//! notices). [`TextBuffer`] and [`MemoryHost`] are in-memory implementations
//! used by the CLI and the tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;

use crate::error::{Error, Result};

/// A position in a document. `ch` counts characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// The editable surface of the active document.
pub trait EditorSurface {
    /// Current cursor position.
    fn cursor(&self) -> Position;

    /// Move the cursor.
    fn set_cursor(&mut self, pos: Position);

    /// Currently selected text, if any.
    fn selection(&self) -> Option<String>;

    /// Number of lines in the document.
    fn line_count(&self) -> usize;

    /// Text of one line, without its line break.
    fn line(&self, index: usize) -> Option<String>;

    /// Replace the text between `from` and `to` with `text`.
    ///
    /// Returns `false` when the range no longer exists in the document.
    fn replace_range(&mut self, text: &str, from: Position, to: Position) -> bool;

    /// All lines of the document.
    fn lines(&self) -> Vec<String> {
        (0..self.line_count()).filter_map(|i| self.line(i)).collect()
    }

    /// Position just past the last character of `line`.
    fn line_end(&self, line: usize) -> Option<Position> {
        self.line(line)
            .map(|text| Position::new(line, text.chars().count()))
    }
}

/// Everything the pipeline needs from the editor host besides the surface.
pub trait Host {
    /// Path of the active document, `None` when no document is open.
    fn active_document(&self) -> Option<String>;

    /// Read a document's full text.
    fn read_document(&self, path: &str) -> impl Future<Output = Result<String>>;

    /// Show a transient message to the user.
    fn notice(&self, message: &str);

    /// Whether the host runs on a mobile platform.
    fn is_mobile(&self) -> bool {
        false
    }
}

/// In-memory editor surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: Position,
    selection: Option<(Position, Position)>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Full document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Select the text between two positions.
    pub fn select(&mut self, from: Position, to: Position) {
        self.selection = Some((from.min(to), from.max(to)));
        self.cursor = to;
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Byte offset of `pos`; `ch` past the end of a line clamps to its end.
    fn offset(&self, pos: Position) -> Option<usize> {
        let mut start = 0;
        for (i, line) in self.text.split('\n').enumerate() {
            if i == pos.line {
                let byte = line
                    .char_indices()
                    .nth(pos.ch)
                    .map_or(line.len(), |(b, _)| b);
                return Some(start + byte);
            }
            start += line.len() + 1;
        }
        None
    }
}

impl EditorSurface for TextBuffer {
    fn cursor(&self) -> Position {
        self.cursor
    }

    fn set_cursor(&mut self, pos: Position) {
        self.cursor = pos;
        self.selection = None;
    }

    fn selection(&self) -> Option<String> {
        let (from, to) = self.selection?;
        let start = self.offset(from)?;
        let end = self.offset(to)?;
        (start < end).then(|| self.text[start..end].to_string())
    }

    fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    fn line(&self, index: usize) -> Option<String> {
        self.text.split('\n').nth(index).map(str::to_string)
    }

    fn replace_range(&mut self, text: &str, from: Position, to: Position) -> bool {
        let (Some(start), Some(end)) = (self.offset(from), self.offset(to)) else {
            return false;
        };
        if start > end {
            return false;
        }
        self.text.replace_range(start..end, text);
        self.selection = None;
        true
    }
}

/// In-memory host: documents keyed by path plus a recorded notice log.
#[derive(Debug, Default)]
pub struct MemoryHost {
    active: RefCell<Option<String>>,
    documents: RefCell<HashMap<String, String>>,
    notices: RefCell<Vec<String>>,
    mobile: Cell<bool>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host with one open document.
    pub fn with_document(path: &str, text: &str) -> Self {
        let host = Self::new();
        host.insert_document(path, text);
        host.set_active(Some(path));
        host
    }

    pub fn set_active(&self, path: Option<&str>) {
        *self.active.borrow_mut() = path.map(str::to_string);
    }

    pub fn insert_document(&self, path: &str, text: &str) {
        self.documents
            .borrow_mut()
            .insert(path.to_string(), text.to_string());
    }

    pub fn set_mobile(&self, mobile: bool) {
        self.mobile.set(mobile);
    }

    /// Notices shown so far, oldest first.
    pub fn notices(&self) -> Vec<String> {
        self.notices.borrow().clone()
    }
}

impl Host for MemoryHost {
    fn active_document(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    async fn read_document(&self, path: &str) -> Result<String> {
        self.documents
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Document {
                path: path.to_string(),
                message: "no such document".to_string(),
            })
    }

    fn notice(&self, message: &str) {
        tracing::debug!("notice: {}", message);
        self.notices.borrow_mut().push(message.to_string());
    }

    fn is_mobile(&self) -> bool {
        self.mobile.get()
    }
}
