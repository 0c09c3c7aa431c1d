//! # stable-links
//!
//! Watches a markdown vault. When a note is created for a name that other
//! notes already link to, the bare links get an explicit label and the note
//! gets the link texts as aliases, so renaming it later keeps the old text.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stable_links_core::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stable-links")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML settings file
    #[arg(long, env = "STABLE_LINKS_CONFIG")]
    config: Option<PathBuf>,

    /// Vault root directory (overrides the settings file)
    #[arg(long, global = true, env = "STABLE_LINKS_VAULT")]
    vault: Option<PathBuf>,

    /// Quiet period in milliseconds before a new note is processed
    #[arg(long, global = true, env = "STABLE_LINKS_QUIET_MS")]
    quiet_ms: Option<u64>,

    /// Upper bound in milliseconds on the wait for a new note to settle
    #[arg(long, global = true, env = "STABLE_LINKS_MAX_WAIT_MS")]
    max_wait_ms: Option<u64>,

    /// Ignore links inside code blocks and inline code
    #[arg(long, global = true)]
    skip_code: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the vault and process newly created notes until Ctrl-C
    Watch,

    /// Show which link texts point at a name
    Links {
        /// Note name without extension, matched exactly
        name: String,

        /// Document to leave out of the scan
        #[arg(long)]
        exclude: Option<String>,
    },

    /// Process an existing note now, without waiting
    Apply {
        /// Vault-relative path of the note, e.g. `Notes/effort.md`
        path: String,

        /// Only report what would change
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };
        if let Some(vault) = &self.vault {
            settings.vault = vault.clone();
        }
        if let Some(quiet) = self.quiet_ms {
            settings.quiet_period_ms = quiet;
        }
        if let Some(max_wait) = self.max_wait_ms {
            settings.max_wait_ms = max_wait;
        }
        if self.skip_code {
            settings.skip_code = true;
        }
        Ok(settings)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = cli.settings()?;

    match cli.command {
        Commands::Watch => commands::watch::run(&settings).await,
        Commands::Links { name, exclude } => {
            commands::links::run(&settings, &name, exclude.as_deref()).await
        }
        Commands::Apply { path, dry_run } => commands::apply::run(&settings, &path, dry_run).await,
    }
}
