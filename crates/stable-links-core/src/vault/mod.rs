//! The document collection the pipeline works against.
//!
//! A [`Vault`] enumerates documents, reads and writes their text, and offers an
//! atomic per-document read-modify-write. Documents are identified by a
//! `/`-separated path relative to the vault root, e.g. `Notes/effort.md`.

mod fs;
mod memory;

pub use fs::FsVault;
pub use memory::MemoryVault;

use crate::error::Result;
use async_trait::async_trait;

/// Mutation applied by [`Vault::modify`]. Returns the new content, or `None`
/// to leave the document untouched.
pub type ContentEdit = Box<dyn FnOnce(&str) -> Option<String> + Send>;

/// A change notification delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    Created(String),
    Modified(String),
    Deleted(String),
    /// `from` is `None` when the host only reported the destination.
    Renamed { from: Option<String>, to: String },
}

#[async_trait]
pub trait Vault: Send + Sync {
    /// Every document path, text or not, in a deterministic order.
    async fn list_all_documents(&self) -> Result<Vec<String>>;

    /// The text-format subset of [`Vault::list_all_documents`], same order.
    async fn list_text_documents(&self) -> Result<Vec<String>> {
        Ok(self
            .list_all_documents()
            .await?
            .into_iter()
            .filter(|p| self.is_text_document(p))
            .collect())
    }

    async fn read(&self, path: &str) -> Result<String>;

    /// Replace a document's content outright. The pipeline itself only
    /// writes through [`Vault::modify`]; this is for hosts and tooling.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Atomic read-modify-write of one document. Returns whether it was written.
    async fn modify(&self, path: &str, edit: ContentEdit) -> Result<bool>;

    fn is_text_document(&self, path: &str) -> bool;
}

/// File name without its last extension: `Notes/my.effort.md` -> `my.effort`.
pub fn base_name(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    let stem = match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Extension of the last path segment, if any.
pub(crate) fn extension(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(&file_name[dot + 1..]),
    }
}
