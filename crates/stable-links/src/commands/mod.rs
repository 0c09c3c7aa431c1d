pub mod apply;
pub mod links;
pub mod watch;

use stable_links_core::{FsVault, Settings};
use std::sync::Arc;

pub(crate) fn open_vault(settings: &Settings) -> Arc<FsVault> {
    Arc::new(FsVault::new(&settings.vault, settings.extensions.clone()))
}
