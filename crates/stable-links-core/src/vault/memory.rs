use super::{extension, ContentEdit, Vault, VaultEvent};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

/// In-memory vault for embedding and tests.
///
/// Documents are enumerated in path order. Host-style helpers (`create`,
/// `delete`, `rename`, `edit`) emit [`VaultEvent`]s to the optional sender so
/// a pipeline worker can be driven without a real filesystem.
pub struct MemoryVault {
    docs: RwLock<BTreeMap<String, String>>,
    text_extensions: Vec<String>,
    events: Option<mpsc::UnboundedSender<VaultEvent>>,
    writes: DashMap<String, usize>,
    failing: DashSet<String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            text_extensions: vec!["md".to_string()],
            events: None,
            writes: DashMap::new(),
            failing: DashSet::new(),
        }
    }

    /// A vault whose host-style helpers report changes on the returned channel.
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<VaultEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut vault = Self::new();
        vault.events = Some(tx);
        (vault, rx)
    }

    /// Seed a document without emitting an event (pre-existing content).
    pub fn insert(&self, path: &str, content: &str) {
        self.docs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), content.to_string());
    }

    /// Create a document and emit `Created`.
    pub fn create(&self, path: &str, content: &str) {
        self.insert(path, content);
        self.emit(VaultEvent::Created(path.to_string()));
    }

    /// Replace a document's content as an outside editor would, emitting `Modified`.
    pub fn edit(&self, path: &str, content: &str) {
        self.insert(path, content);
        self.emit(VaultEvent::Modified(path.to_string()));
    }

    pub fn delete(&self, path: &str) {
        self.docs.write().unwrap_or_else(|e| e.into_inner()).remove(path);
        self.emit(VaultEvent::Deleted(path.to_string()));
    }

    pub fn rename(&self, from: &str, to: &str) {
        {
            let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
            if let Some(content) = docs.remove(from) {
                docs.insert(to.to_string(), content);
            }
        }
        self.emit(VaultEvent::Renamed {
            from: Some(from.to_string()),
            to: to.to_string(),
        });
    }

    /// Current content, bypassing the trait (no failure injection).
    pub fn content(&self, path: &str) -> Option<String> {
        self.docs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// How many times the pipeline wrote this document.
    pub fn write_count(&self, path: &str) -> usize {
        self.writes.get(path).map(|c| *c).unwrap_or(0)
    }

    /// Make every read and write of `path` fail with an I/O error.
    pub fn fail_io_for(&self, path: &str) {
        self.failing.insert(path.to_string());
    }

    fn emit(&self, event: VaultEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::debug!("Memory vault event receiver dropped");
            }
        }
    }

    fn check_failing(&self, path: &str) -> Result<()> {
        if self.failing.contains(path) {
            return Err(VaultError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "injected failure"),
            ));
        }
        Ok(())
    }

    fn record_write(&self, path: &str) {
        *self.writes.entry(path.to_string()).or_insert(0) += 1;
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn list_all_documents(&self) -> Result<Vec<String>> {
        Ok(self
            .docs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }

    async fn read(&self, path: &str) -> Result<String> {
        self.check_failing(path)?;
        self.content(path)
            .ok_or_else(|| VaultError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.check_failing(path)?;
        self.insert(path, content);
        self.record_write(path);
        Ok(())
    }

    async fn modify(&self, path: &str, edit: ContentEdit) -> Result<bool> {
        self.check_failing(path)?;
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        let current = docs
            .get_mut(path)
            .ok_or_else(|| VaultError::NotFound(path.to_string()))?;
        match edit(current.as_str()) {
            Some(updated) => {
                *current = updated;
                drop(docs);
                self.record_write(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_text_document(&self, path: &str) -> bool {
        extension(path)
            .map(|ext| self.text_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_documents_in_path_order() {
        let vault = MemoryVault::new();
        vault.insert("b.md", "");
        vault.insert("a.md", "");
        vault.insert("img.png", "");
        assert_eq!(vault.list_all_documents().await.unwrap(), vec!["a.md", "b.md", "img.png"]);
        assert_eq!(vault.list_text_documents().await.unwrap(), vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn modify_skips_write_when_edit_declines() {
        let vault = MemoryVault::new();
        vault.insert("a.md", "hello");
        let written = vault.modify("a.md", Box::new(|_: &str| None)).await.unwrap();
        assert!(!written);
        assert_eq!(vault.write_count("a.md"), 0);

        let written = vault
            .modify("a.md", Box::new(|text: &str| Some(format!("{text}!"))))
            .await
            .unwrap();
        assert!(written);
        assert_eq!(vault.content("a.md").as_deref(), Some("hello!"));
        assert_eq!(vault.write_count("a.md"), 1);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let vault = MemoryVault::new();
        assert!(matches!(vault.read("nope.md").await, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_io_error() {
        let vault = MemoryVault::new();
        vault.insert("a.md", "x");
        vault.fail_io_for("a.md");
        assert!(matches!(vault.read("a.md").await, Err(VaultError::Io { .. })));
    }

    #[tokio::test]
    async fn host_helpers_emit_events() {
        let (vault, mut rx) = MemoryVault::with_events();
        vault.create("a.md", "");
        vault.edit("a.md", "x");
        vault.rename("a.md", "b.md");
        vault.delete("b.md");
        assert_eq!(rx.recv().await, Some(VaultEvent::Created("a.md".into())));
        assert_eq!(rx.recv().await, Some(VaultEvent::Modified("a.md".into())));
        assert_eq!(
            rx.recv().await,
            Some(VaultEvent::Renamed { from: Some("a.md".into()), to: "b.md".into() })
        );
        assert_eq!(rx.recv().await, Some(VaultEvent::Deleted("b.md".into())));
    }
}
