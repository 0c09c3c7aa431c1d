use crate::error::Result;
use crate::link_parser::{may_reference, references_to, ScanOptions};
use crate::vault::Vault;
use std::sync::Arc;

/// Labels discovered for one target name during one pass over the vault.
///
/// `labels` keeps first-seen order (vault enumeration order, then document
/// order) and holds each exact string once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMatch {
    pub found: bool,
    pub labels: Vec<String>,
}

impl LinkMatch {
    fn record(&mut self, label: &str) {
        self.found = true;
        // `[[T|]]` counts as a reference but has nothing to offer as an alias.
        if label.is_empty() || self.labels.iter().any(|l| l == label) {
            return;
        }
        self.labels.push(label.to_string());
    }

    /// Fold the references to `target` in one document into this match.
    pub fn scan(&mut self, markdown: &str, target: &str, options: ScanOptions) {
        if !may_reference(markdown, target) {
            return;
        }
        for occurrence in references_to(markdown, target, options) {
            self.record(occurrence.display_text());
        }
    }
}

/// Finds every reference to a name across the vault.
pub struct LinkMatcher {
    vault: Arc<dyn Vault>,
    options: ScanOptions,
}

impl LinkMatcher {
    pub fn new(vault: Arc<dyn Vault>, options: ScanOptions) -> Self {
        Self { vault, options }
    }

    /// Scan every text document except `exclude` for references to `target`.
    ///
    /// A document that cannot be read is logged and skipped; only failure to
    /// enumerate the vault is returned as an error.
    pub async fn find(&self, target: &str, exclude: &str) -> Result<LinkMatch> {
        let mut result = LinkMatch::default();
        if target.is_empty() {
            tracing::warn!("Refusing to match an empty target name");
            return Ok(result);
        }

        let paths = self.vault.list_text_documents().await?;
        let mut scanned = 0;
        for path in paths.iter().filter(|p| p.as_str() != exclude) {
            let content = match self.vault.read(path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping {} while matching [[{}]]: {}", path, target, e);
                    continue;
                }
            };
            scanned += 1;
            result.scan(&content, target, self.options);
        }

        tracing::debug!(
            "Matched [[{}]] across {} documents: found={}, labels={:?}",
            target, scanned, result.found, result.labels
        );
        Ok(result)
    }
}
