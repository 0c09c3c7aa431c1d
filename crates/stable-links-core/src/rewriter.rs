use crate::error::Result;
use crate::link_parser::{apply_edits, compute_label_edits, may_reference, ScanOptions};
use crate::vault::Vault;
use std::sync::Arc;

/// Add `|label` to `content`'s bare references to `target`.
/// Returns `None` when nothing changes.
pub fn label_bare_references(content: &str, target: &str, options: ScanOptions) -> Option<String> {
    let edits = compute_label_edits(content, target, options);
    if edits.is_empty() {
        return None;
    }
    let mut text = content.to_string();
    apply_edits(&mut text, &edits);
    Some(text)
}

/// Turns bare `[[target]]` references into `[[target|target]]` across the vault.
pub struct LinkRewriter {
    vault: Arc<dyn Vault>,
    options: ScanOptions,
}

impl LinkRewriter {
    pub fn new(vault: Arc<dyn Vault>, options: ScanOptions) -> Self {
        Self { vault, options }
    }

    /// Rewrite bare references to `target` in every text document except
    /// `exclude`. Returns how many documents were written.
    ///
    /// Each document is handled on its own: a read or write failure is logged
    /// and the pass moves on to the next document.
    pub async fn rewrite(&self, target: &str, exclude: &str) -> Result<usize> {
        if target.is_empty() {
            return Ok(0);
        }

        let paths = self.vault.list_text_documents().await?;
        let mut patched = 0;
        for path in paths.iter().filter(|p| p.as_str() != exclude) {
            let content = match self.vault.read(path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping {} while rewriting [[{}]]: {}", path, target, e);
                    continue;
                }
            };
            if !may_reference(&content, target) {
                continue;
            }

            // Recompute under the vault's per-document lock so edits made since
            // the read above are not clobbered.
            let owned_target = target.to_string();
            let options = self.options;
            let written = self
                .vault
                .modify(
                    path,
                    Box::new(move |current: &str| label_bare_references(current, &owned_target, options)),
                )
                .await;

            match written {
                Ok(true) => {
                    tracing::info!("Labelled references to [[{}]] in {}", target, path);
                    patched += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to rewrite {} for [[{}]]: {}", path, target, e),
            }
        }

        Ok(patched)
    }
}
