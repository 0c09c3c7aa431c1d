use crate::error::Result;
use crate::frontmatter::{merge_alias, MergeOutcome};
use crate::vault::Vault;
use std::sync::Arc;

/// Adds discovered labels to a note's `aliases` metadata.
pub struct AliasMerger {
    vault: Arc<dyn Vault>,
}

impl AliasMerger {
    pub fn new(vault: Arc<dyn Vault>) -> Self {
        Self { vault }
    }

    /// Ensure `label` is listed in `path`'s aliases. Returns whether the
    /// document was written.
    ///
    /// Runs through the vault's atomic read-modify-write. A metadata block we
    /// cannot understand is logged and left as is; that is not an error.
    pub async fn merge(&self, path: &str, label: &str) -> Result<bool> {
        let owned_path = path.to_string();
        let owned_label = label.to_string();
        let written = self
            .vault
            .modify(
                path,
                Box::new(move |content: &str| match merge_alias(content, &owned_label) {
                    MergeOutcome::Updated(text) => Some(text),
                    MergeOutcome::Unchanged => None,
                    MergeOutcome::Malformed(reason) => {
                        tracing::warn!(
                            "Not adding alias {:?} to {}: {}",
                            owned_label, owned_path, reason
                        );
                        None
                    }
                }),
            )
            .await?;

        if written {
            tracing::info!("Added alias {:?} to {}", label, path);
        } else {
            tracing::debug!("Alias {:?} already present or skipped in {}", label, path);
        }
        Ok(written)
    }
}
