//! Long-running mode: feed filesystem notifications into the pipeline.

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use stable_links_core::{AliasPipeline, FsVault, Settings, VaultEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(settings: &Settings) -> Result<()> {
    let vault = super::open_vault(settings);
    tokio::fs::metadata(vault.root())
        .await
        .with_context(|| format!("Vault directory {:?} is not accessible", vault.root()))?;

    // The watcher goes up before the snapshot so nothing created in between
    // is missed; creations already in the snapshot are then seen as known.
    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = watch_vault(vault.clone(), tx)?;

    let pipeline = Arc::new(AliasPipeline::new(vault.clone(), settings));
    let known = pipeline
        .startup()
        .await
        .context("Failed to take the startup snapshot")?;
    tracing::info!(
        "Watching {:?} ({} known documents, quiet period {}ms, ceiling {}ms)",
        vault.root(),
        known,
        settings.quiet_period_ms,
        settings.max_wait_ms
    );

    let worker = tokio::spawn(pipeline.run_worker(rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down, finishing documents in flight");

    // Dropping the watcher drops its sender, which ends the worker loop.
    drop(watcher);
    worker.await.context("Pipeline worker panicked")?;
    Ok(())
}

/// Watch the vault root recursively, forwarding translated events to `tx`.
fn watch_vault(
    vault: Arc<FsVault>,
    tx: mpsc::UnboundedSender<VaultEvent>,
) -> Result<RecommendedWatcher> {
    let root = vault.root().to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for vault_event in translate(&vault, event) {
                    let _ = tx.send(vault_event);
                }
            }
            Err(err) => tracing::warn!("Watcher error: {}", err),
        },
        notify::Config::default(),
    )
    .context("Failed to initialize watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", root))?;
    Ok(watcher)
}

/// Map one notify event to the vault notifications the pipeline understands.
/// Paths outside the vault or under hidden entries are dropped.
fn translate(vault: &FsVault, event: Event) -> Vec<VaultEvent> {
    let paths: Vec<Option<String>> = event
        .paths
        .iter()
        .map(|path| vault.document_path(path))
        .collect();

    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => paths.into_iter().flatten().map(VaultEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, Some(to)] => vec![VaultEvent::Renamed {
                from: from.clone(),
                to: to.clone(),
            }],
            [Some(from), None] => vec![VaultEvent::Deleted(from.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().flatten().map(VaultEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .into_iter()
            .flatten()
            .map(|to| VaultEvent::Renamed { from: None, to })
            .collect(),
        // Backends that cannot pair rename halves report each side alone.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .zip(paths)
            .filter_map(|(absolute, path)| {
                let path = path?;
                Some(if absolute.exists() {
                    VaultEvent::Renamed {
                        from: None,
                        to: path,
                    }
                } else {
                    VaultEvent::Deleted(path)
                })
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths.into_iter().flatten().map(VaultEvent::Modified).collect(),
        EventKind::Remove(_) => paths.into_iter().flatten().map(VaultEvent::Deleted).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, RemoveKind};
    use std::path::{Path, PathBuf};
    use tokio::time::Duration;

    fn vault() -> FsVault {
        FsVault::new("/vault", vec!["md".to_string()])
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn file_creation_becomes_created() {
        let events = translate(
            &vault(),
            event(EventKind::Create(CreateKind::File), &["/vault/Notes/effort.md"]),
        );
        assert_eq!(events, vec![VaultEvent::Created("Notes/effort.md".into())]);
    }

    #[test]
    fn folder_creation_is_ignored() {
        let events = translate(
            &vault(),
            event(EventKind::Create(CreateKind::Folder), &["/vault/Notes"]),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn hidden_and_foreign_paths_are_dropped() {
        let events = translate(
            &vault(),
            event(
                EventKind::Create(CreateKind::Any),
                &["/vault/.obsidian/workspace.json", "/elsewhere/a.md", "/vault/a.md"],
            ),
        );
        assert_eq!(events, vec![VaultEvent::Created("a.md".into())]);
    }

    #[test]
    fn content_change_becomes_modified() {
        let events = translate(
            &vault(),
            event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/vault/a.md"],
            ),
        );
        assert_eq!(events, vec![VaultEvent::Modified("a.md".into())]);
    }

    #[test]
    fn metadata_change_is_ignored() {
        let events = translate(
            &vault(),
            event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)),
                &["/vault/a.md"],
            ),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn paired_rename_keeps_both_sides() {
        let events = translate(
            &vault(),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/vault/old.md", "/vault/new.md"],
            ),
        );
        assert_eq!(
            events,
            vec![VaultEvent::Renamed {
                from: Some("old.md".into()),
                to: "new.md".into()
            }]
        );
    }

    #[test]
    fn rename_in_from_outside_has_no_source() {
        let events = translate(
            &vault(),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/elsewhere/old.md", "/vault/new.md"],
            ),
        );
        assert_eq!(
            events,
            vec![VaultEvent::Renamed {
                from: None,
                to: "new.md".into()
            }]
        );
    }

    #[test]
    fn rename_out_of_vault_is_a_deletion() {
        let events = translate(
            &vault(),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/vault/old.md", "/elsewhere/old.md"],
            ),
        );
        assert_eq!(events, vec![VaultEvent::Deleted("old.md".into())]);
    }

    #[test]
    fn rename_halves() {
        let from = translate(
            &vault(),
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/vault/old.md"]),
        );
        assert_eq!(from, vec![VaultEvent::Deleted("old.md".into())]);

        let to = translate(
            &vault(),
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/vault/new.md"]),
        );
        assert_eq!(
            to,
            vec![VaultEvent::Renamed {
                from: None,
                to: "new.md".into()
            }]
        );
    }

    #[test]
    fn unpaired_rename_checks_the_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("here.md"), "").unwrap();
        let vault = FsVault::new(dir.path(), vec!["md".to_string()]);

        let events = translate(
            &vault,
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                &[
                    dir.path().join("here.md").to_str().unwrap(),
                    dir.path().join("gone.md").to_str().unwrap(),
                ],
            ),
        );
        assert_eq!(
            events,
            vec![
                VaultEvent::Renamed {
                    from: None,
                    to: "here.md".into()
                },
                VaultEvent::Deleted("gone.md".into()),
            ]
        );
    }

    /// Create `effort.md` under `dir` and wait for the watcher to report it.
    async fn watcher_reports_creation(root: &Path, dir: &Path) {
        let vault = Arc::new(FsVault::new(root, vec!["md".to_string()]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = watch_vault(vault, tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(dir.join("effort.md"), "# Effort\n").unwrap();

        let expected = VaultEvent::Created("effort.md".into());
        let seen = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = rx.recv().await {
                if event == expected {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(matches!(seen, Ok(true)), "no Created event for {root:?}");
    }

    #[tokio::test]
    async fn watcher_reports_creation_under_absolute_root() {
        let dir = tempfile::tempdir().unwrap();
        watcher_reports_creation(dir.path(), dir.path()).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn watcher_reports_creation_under_relative_root() {
        let dir = tempfile::tempdir().unwrap();
        // Climb from the working directory to `/`, then descend into the tempdir.
        let cwd = std::env::current_dir().unwrap();
        let mut relative: PathBuf = cwd.components().skip(1).map(|_| "..").collect();
        relative.push(dir.path().strip_prefix("/").unwrap());
        relative.push(".");
        assert!(relative.is_relative());

        watcher_reports_creation(&relative, dir.path()).await;
    }

    #[test]
    fn removal_becomes_deleted() {
        let events = translate(
            &vault(),
            event(EventKind::Remove(RemoveKind::File), &["/vault/a.md"]),
        );
        assert_eq!(events, vec![VaultEvent::Deleted("a.md".into())]);
    }
}
