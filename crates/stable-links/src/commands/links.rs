use anyhow::{Context, Result};
use colored::Colorize;
use stable_links_core::{LinkMatch, LinkMatcher, Settings};

/// Print the link texts other notes use for `name`.
pub async fn run(settings: &Settings, name: &str, exclude: Option<&str>) -> Result<()> {
    let vault = super::open_vault(settings);
    let matcher = LinkMatcher::new(vault, settings.scan_options());
    let found = matcher
        .find(name, exclude.unwrap_or_default())
        .await
        .with_context(|| format!("Failed to scan {:?}", settings.vault))?;

    if found.found {
        println!("{} [[{}]]", "linked".green().bold(), name.bold());
    } else {
        println!("{} [[{}]]", "unlinked".yellow().bold(), name.bold());
    }
    print!("{}", format_labels(&found));
    Ok(())
}

fn format_labels(found: &LinkMatch) -> String {
    let mut output = String::from("Link texts:\n");
    if found.labels.is_empty() {
        output.push_str("- (none)\n");
    } else {
        for label in &found.labels {
            output.push_str(&format!("- {}\n", label));
        }
    }
    output
}
