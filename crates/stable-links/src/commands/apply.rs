use anyhow::{Context, Result};
use colored::Colorize;
use stable_links_core::{AliasPipeline, PipelinePlan, PipelineReport, Settings};

/// Run the pipeline for an existing note, or show what it would do.
pub async fn run(settings: &Settings, path: &str, dry_run: bool) -> Result<()> {
    let vault = super::open_vault(settings);
    let pipeline = AliasPipeline::new(vault, settings);

    if dry_run {
        let plan = pipeline
            .plan(path)
            .await
            .with_context(|| format!("Failed to plan {}", path))?;
        println!("{} {}", "plan".yellow().bold(), path.bold());
        print!("{}", format_plan(&plan));
    } else {
        let report = pipeline
            .apply(path)
            .await
            .with_context(|| format!("Failed to process {}", path))?;
        println!("{} {}", "done".green().bold(), path.bold());
        print!("{}", format_report(&report));
    }
    Ok(())
}

fn push_list(output: &mut String, heading: &str, items: &[String]) {
    output.push_str(heading);
    output.push_str(":\n");
    if items.is_empty() {
        output.push_str("- (none)\n");
    } else {
        for item in items {
            output.push_str(&format!("- {}\n", item));
        }
    }
}

fn format_plan(plan: &PipelinePlan) -> String {
    let mut output = String::new();
    if !plan.found.found {
        output.push_str(&format!("No links to [[{}]], nothing to do\n", plan.target));
        return output;
    }
    push_list(&mut output, "Aliases to add", &plan.found.labels);
    push_list(&mut output, "Documents to relabel", &plan.to_patch);
    output
}

fn format_report(report: &PipelineReport) -> String {
    let mut output = String::new();
    if report.labels.is_empty() && report.patched == 0 {
        output.push_str(&format!("No links to [[{}]], nothing changed\n", report.target));
        return output;
    }
    push_list(&mut output, "Link texts", &report.labels);
    output.push_str(&format!(
        "{} documents relabelled, {} aliases added\n",
        report.patched, report.aliases_added
    ));
    output
}
