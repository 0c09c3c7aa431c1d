//! Core of stable-links.
//!
//! When a note is created whose name was already being linked to with bare
//! `[[name]]` references, those references are rewritten to `[[name|name]]`
//! and every display text used for the name is added to the new note's
//! `aliases`. Renaming the note later keeps the old link text on screen.
//!
//! ```text
//! VaultEvent::Created ─▶ CreationTracker ─▶ StabilizationWaiter
//!     ─▶ LinkMatcher ─▶ LinkRewriter ─▶ AliasMerger
//! ```
//!
//! Everything runs against the [`vault::Vault`] trait; [`vault::FsVault`]
//! and [`vault::MemoryVault`] are provided.

pub mod alias_merger;
pub mod error;
pub mod frontmatter;
pub mod link_parser;
pub mod matcher;
pub mod pipeline;
pub mod rewriter;
pub mod settings;
pub mod stabilizer;
pub mod tracker;
pub mod vault;

pub use alias_merger::AliasMerger;
pub use error::{PipelineError, SettingsError, VaultError};
pub use link_parser::ScanOptions;
pub use matcher::{LinkMatch, LinkMatcher};
pub use pipeline::{AliasPipeline, PipelinePlan, PipelineReport};
pub use rewriter::LinkRewriter;
pub use settings::Settings;
pub use stabilizer::{StabilizationWaiter, Stabilized};
pub use tracker::{Creation, CreationTracker};
pub use vault::{FsVault, MemoryVault, Vault, VaultEvent};
