use super::{extension, ContentEdit, Vault};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::WalkDir;

/// A vault backed by a directory tree.
///
/// Hidden entries (`.obsidian`, `.git`, `.trash`, dotfiles) are never listed.
/// Writes to one document are serialised through a per-path mutex so
/// [`Vault::modify`] is atomic with respect to this process.
pub struct FsVault {
    root: PathBuf,
    text_extensions: Vec<String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Resolve `path` to an absolute path without symlinks. A path that no longer
/// exists (a deleted file) is resolved through its parent directory.
fn canonical(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return Some(resolved);
    }
    let parent = std::fs::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

impl FsVault {
    /// The root is canonicalized when it exists, so relative roots such as `.`
    /// and symlinked roots match the absolute paths a watcher reports.
    pub fn new(root: impl Into<PathBuf>, text_extensions: Vec<String>) -> Self {
        let root = root.into();
        Self {
            root: std::fs::canonicalize(&root).unwrap_or(root),
            text_extensions,
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an absolute path reported by a watcher to a vault document path.
    /// Returns `None` for paths outside the root or under hidden entries.
    pub fn document_path(&self, absolute: &Path) -> Option<String> {
        let resolved;
        let relative = match absolute.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(_) => {
                resolved = canonical(absolute)?;
                resolved.strip_prefix(&self.root).ok()?
            }
        };
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment.to_str()?;
                    if segment.starts_with('.') {
                        return None;
                    }
                    segments.push(segment);
                }
                _ => return None,
            }
        }
        if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        }
    }

    fn absolute(&self, path: &str) -> PathBuf {
        path.split('/').fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn walk(root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });
        for entry in walker {
            let entry = entry.map_err(|source| VaultError::Walk {
                root: root.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn list_all_documents(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || Self::walk(&root))
            .await
            .map_err(|e| VaultError::io(&self.root, std::io::Error::other(e)))??;
        Ok(files
            .iter()
            .filter_map(|file| self.document_path(file))
            .collect())
    }

    async fn read(&self, path: &str) -> Result<String> {
        let absolute = self.absolute(path);
        tokio::fs::read_to_string(&absolute)
            .await
            .map_err(|e| VaultError::io(absolute, e))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        let absolute = self.absolute(path);
        tokio::fs::write(&absolute, content)
            .await
            .map_err(|e| VaultError::io(absolute, e))
    }

    async fn modify(&self, path: &str, edit: ContentEdit) -> Result<bool> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        let absolute = self.absolute(path);
        let current = tokio::fs::read_to_string(&absolute)
            .await
            .map_err(|e| VaultError::io(&absolute, e))?;
        match edit(current.as_str()) {
            Some(updated) => {
                tokio::fs::write(&absolute, updated)
                    .await
                    .map_err(|e| VaultError::io(&absolute, e))?;
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
