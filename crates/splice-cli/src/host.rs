//! Host backed by the filesystem.
//!
//! The document given on the command line is the active document; notices
//! are printed to stderr as they arrive.

use splice_core::{Error, Host, Result};

use crate::colors;

pub struct FsHost {
    document: String,
}

impl FsHost {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl Host for FsHost {
    fn active_document(&self) -> Option<String> {
        Some(self.document.clone())
    }

    async fn read_document(&self, path: &str) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Document {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    fn notice(&self, message: &str) {
        eprintln!("{}{}{}", colors::CYAN, message, colors::RESET);
    }
}
