use crate::alias_merger::AliasMerger;
use crate::error::{PipelineError, VaultError};
use crate::link_parser::ScanOptions;
use crate::matcher::{LinkMatch, LinkMatcher};
use crate::rewriter::{label_bare_references, LinkRewriter};
use crate::settings::Settings;
use crate::stabilizer::{StabilizationWaiter, Stabilized};
use crate::tracker::{Creation, CreationTracker};
use crate::vault::{base_name, Vault, VaultEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Duration;

/// What one pipeline run did for a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub path: String,
    pub target: String,
    /// `None` when the run skipped the stabilization wait.
    pub stabilized: Option<Stabilized>,
    pub labels: Vec<String>,
    pub patched: usize,
    pub aliases_added: usize,
}

/// What a run would do, without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub target: String,
    pub found: LinkMatch,
    /// Documents whose bare references would be labelled.
    pub to_patch: Vec<String>,
}

/// Wires tracker, waiter, matcher, rewriter and merger into the
/// new-document flow: stabilize, match, rewrite, merge aliases.
pub struct AliasPipeline {
    vault: Arc<dyn Vault>,
    tracker: CreationTracker,
    waiter: StabilizationWaiter,
    matcher: LinkMatcher,
    rewriter: LinkRewriter,
    merger: AliasMerger,
    options: ScanOptions,
    quiet_period: Duration,
    max_wait: Duration,
}

impl AliasPipeline {
    pub fn new(vault: Arc<dyn Vault>, settings: &Settings) -> Self {
        let options = settings.scan_options();
        Self {
            tracker: CreationTracker::new(vault.clone()),
            waiter: StabilizationWaiter::new(),
            matcher: LinkMatcher::new(vault.clone(), options),
            rewriter: LinkRewriter::new(vault.clone(), options),
            merger: AliasMerger::new(vault.clone()),
            vault,
            options,
            quiet_period: settings.quiet_period(),
            max_wait: settings.max_wait(),
        }
    }

    /// Take the known-documents snapshot. Call once the host is ready.
    pub async fn startup(&self) -> Result<usize, VaultError> {
        self.tracker.snapshot().await
    }

    /// Apply one notification to tracker and waiter. Returns the path of a
    /// novel text document that should go through the pipeline.
    pub fn dispatch(&self, event: VaultEvent) -> Option<String> {
        match event {
            VaultEvent::Created(path) => match self.tracker.on_created(&path) {
                Creation::Novel if self.vault.is_text_document(&path) => Some(path),
                Creation::Novel => {
                    tracing::debug!("Ignoring new non-text document {}", path);
                    None
                }
                Creation::AlreadyKnown => {
                    tracing::debug!("Ignoring creation of already known {}", path);
                    None
                }
                Creation::BeforeReady => {
                    tracing::debug!("Ignoring creation of {} before startup snapshot", path);
                    None
                }
            },
            VaultEvent::Modified(path) => {
                self.waiter.on_document_modified(&path);
                None
            }
            VaultEvent::Deleted(path) => {
                self.tracker.on_deleted(&path);
                None
            }
            VaultEvent::Renamed { from, to } => {
                self.tracker.on_renamed(from.as_deref(), &to);
                None
            }
        }
    }

    /// Full flow for a freshly created document, including the stabilization wait.
    pub async fn process_new_document(&self, path: &str) -> Result<PipelineReport, PipelineError> {
        let target = target_name(path)?;
        let stabilized = self
            .waiter
            .await_stable(path, self.quiet_period, self.max_wait)
            .await;
        self.run(path, &target, Some(stabilized)).await
    }

    /// Match, rewrite and merge right away, without waiting for the document to settle.
    pub async fn apply(&self, path: &str) -> Result<PipelineReport, PipelineError> {
        let target = target_name(path)?;
        self.run(path, &target, None).await
    }

    /// Report what `apply` would change.
    pub async fn plan(&self, path: &str) -> Result<PipelinePlan, PipelineError> {
        let target = target_name(path)?;
        let found = self.matcher.find(&target, path).await?;
        let mut to_patch = Vec::new();
        if found.found {
            for doc in self.vault.list_text_documents().await? {
                if doc == path {
                    continue;
                }
                match self.vault.read(&doc).await {
                    Ok(content) => {
                        if label_bare_references(&content, &target, self.options).is_some() {
                            to_patch.push(doc);
                        }
                    }
                    Err(e) => tracing::warn!("Skipping {} while planning [[{}]]: {}", doc, target, e),
                }
            }
        }
        Ok(PipelinePlan {
            target,
            found,
            to_patch,
        })
    }

    async fn run(
        &self,
        path: &str,
        target: &str,
        stabilized: Option<Stabilized>,
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport {
            path: path.to_string(),
            target: target.to_string(),
            stabilized,
            labels: Vec::new(),
            patched: 0,
            aliases_added: 0,
        };

        // Labels must be fixed before any rewrite adds `|target` to bare links.
        let found = self.matcher.find(target, path).await?;
        if !found.found {
            tracing::info!("No references to [[{}]]; leaving {} alone", target, path);
            return Ok(report);
        }
        report.labels = found.labels;

        report.patched = self.rewriter.rewrite(target, path).await?;

        for label in &report.labels {
            if self.merger.merge(path, label).await? {
                report.aliases_added += 1;
            }
        }

        tracing::info!(
            "Processed {}: {} documents relabelled, {} aliases added ({:?})",
            path, report.patched, report.aliases_added, report.labels
        );
        Ok(report)
    }

    /// Consume host notifications until the channel closes.
    ///
    /// Notifications are applied in arrival order on this task; each novel
    /// document gets its own spawned pipeline so a slow stabilization never
    /// holds up the event loop. In-flight pipelines are awaited before return.
    pub async fn run_worker(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<VaultEvent>) {
        tracing::info!("Alias pipeline worker started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if let Some(path) = self.dispatch(event) {
                        tracing::info!("New document {}; waiting for it to settle", path);
                        let pipeline = self.clone();
                        in_flight.spawn(async move {
                            match pipeline.process_new_document(&path).await {
                                Ok(report) => tracing::debug!("Pipeline finished: {:?}", report),
                                Err(e) => tracing::error!("Pipeline for {} failed: {}", path, e),
                            }
                        });
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Pipeline task panicked: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Pipeline task panicked: {}", e);
            }
        }
        tracing::info!("Alias pipeline worker stopped");
    }
}

fn target_name(path: &str) -> Result<String, PipelineError> {
    base_name(path)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::NoBaseName(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;

    fn fast_settings() -> Settings {
        Settings {
            quiet_period_ms: 50,
            max_wait_ms: 500,
            ..Settings::default()
        }
    }

    async fn ready_pipeline(docs: &[(&str, &str)]) -> (Arc<MemoryVault>, AliasPipeline) {
        let vault = Arc::new(MemoryVault::new());
        for (path, content) in docs {
            vault.insert(path, content);
        }
        let pipeline = AliasPipeline::new(vault.clone(), &fast_settings());
        pipeline.startup().await.unwrap();
        (vault, pipeline)
    }

    #[tokio::test]
    async fn dispatch_only_yields_novel_text_documents() {
        let (_vault, pipeline) = ready_pipeline(&[("known.md", "")]).await;
        assert_eq!(pipeline.dispatch(VaultEvent::Created("known.md".into())), None);
        assert_eq!(pipeline.dispatch(VaultEvent::Created("pic.png".into())), None);
        assert_eq!(
            pipeline.dispatch(VaultEvent::Created("new.md".into())),
            Some("new.md".to_string())
        );
        assert_eq!(pipeline.dispatch(VaultEvent::Created("new.md".into())), None);
    }

    #[tokio::test]
    async fn dispatch_before_startup_ignores_creations() {
        let vault = Arc::new(MemoryVault::new());
        let pipeline = AliasPipeline::new(vault, &fast_settings());
        assert_eq!(pipeline.dispatch(VaultEvent::Created("new.md".into())), None);
    }

    #[tokio::test]
    async fn renamed_document_never_enters_pipeline() {
        let (_vault, pipeline) = ready_pipeline(&[("old.md", "")]).await;
        pipeline.dispatch(VaultEvent::Renamed {
            from: Some("old.md".into()),
            to: "new.md".into(),
        });
        assert_eq!(pipeline.dispatch(VaultEvent::Created("new.md".into())), None);
    }

    #[tokio::test]
    async fn apply_runs_match_rewrite_merge() {
        let (vault, pipeline) = ready_pipeline(&[
            ("effort.md", "# Effort\n"),
            ("note.md", "See [[effort]] for details.\n[[effort|hard work]]\n"),
        ])
        .await;

        let report = pipeline.apply("effort.md").await.unwrap();
        assert_eq!(report.labels, vec!["effort", "hard work"]);
        assert_eq!(report.patched, 1);
        assert_eq!(report.aliases_added, 2);
        assert_eq!(report.stabilized, None);
        assert_eq!(
            vault.content("effort.md").unwrap(),
            "---\naliases:\n  - effort\n  - hard work\n---\n# Effort\n"
        );
    }

    #[tokio::test]
    async fn no_references_means_no_writes() {
        let (vault, pipeline) = ready_pipeline(&[("effort.md", "body"), ("a.md", "[[other]]")]).await;
        let report = pipeline.apply("effort.md").await.unwrap();
        assert!(report.labels.is_empty());
        assert_eq!(vault.write_count("effort.md"), 0);
        assert_eq!(vault.write_count("a.md"), 0);
    }

    #[tokio::test]
    async fn alias_failure_aborts_but_keeps_rewrites() {
        let (vault, pipeline) = ready_pipeline(&[("effort.md", ""), ("a.md", "[[effort]]")]).await;
        vault.fail_io_for("effort.md");
        let err = pipeline.apply("effort.md").await.unwrap_err();
        assert!(matches!(err, PipelineError::Vault(VaultError::Io { .. })));
        assert_eq!(vault.content("a.md").unwrap(), "[[effort|effort]]");
    }

    #[tokio::test]
    async fn plan_reports_without_writing() {
        let (vault, pipeline) = ready_pipeline(&[
            ("effort.md", ""),
            ("a.md", "[[effort]]"),
            ("b.md", "[[effort|x]]"),
        ])
        .await;
        let plan = pipeline.plan("effort.md").await.unwrap();
        assert_eq!(plan.target, "effort");
        assert_eq!(plan.found.labels, vec!["effort", "x"]);
        assert_eq!(plan.to_patch, vec!["a.md"]);
        assert_eq!(vault.write_count("a.md"), 0);
        assert_eq!(vault.content("effort.md").unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn process_waits_for_stabilization() {
        let (_vault, pipeline) = ready_pipeline(&[("effort.md", ""), ("a.md", "[[effort]]")]).await;
        let start = tokio::time::Instant::now();
        let report = pipeline.process_new_document("effort.md").await.unwrap();
        assert_eq!(report.stabilized, Some(Stabilized::Settled));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(report.patched, 1);
    }
}
