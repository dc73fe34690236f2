use crate::config::ConfigManager;
use crate::error::Result;
use crate::graph::mail::GraphMailStore;
use crate::pipeline::{self, DEFAULT_REPORT_FILE, RunOptions, RunOutcome, RunSummary, extract};
use crate::tui::prompts;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Working directory for downloaded attachments and extracted JSON
    pub path: PathBuf,

    /// CSV report to write
    #[arg(short = 'o', long, default_value = DEFAULT_REPORT_FILE)]
    pub report_file: PathBuf,

    /// Only aggregate JSON files already in the working directory
    #[arg(long)]
    pub report_only: bool,

    /// Keep archives and JSON files after they are consumed
    #[arg(long)]
    pub no_cleanup: bool,

    /// Tenant profile to use (defaults to the active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Mailbox UPN that receives the reports (defaults to config, then `me`)
    #[arg(long)]
    pub mailbox: Option<String>,

    /// Folder path such as "Inbox/TLS Reports"; skips the interactive picker
    #[arg(long)]
    pub folder: Option<String>,

    /// 7-Zip executable to try before the standard locations
    #[arg(long)]
    pub seven_zip: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;

    let mailbox = args
        .mailbox
        .or(config.mailbox)
        .unwrap_or_else(|| "me".to_string());
    let seven_zip = args.seven_zip.or(config.seven_zip_path);

    let options = RunOptions {
        working_dir: args.path,
        report_file: args.report_file,
        report_only: args.report_only,
        no_cleanup: args.no_cleanup,
    };

    println!("{} MTA-STS / TLS-RPT reports...", "Harvesting".cyan().bold());

    let store = GraphMailStore::new(config_manager, args.tenant, mailbox, args.folder);
    let backends = extract::default_backends(seven_zip);

    match pipeline::run(&options, &store, &backends).await? {
        RunOutcome::Cancelled => {}
        RunOutcome::Completed(summary) => print_summary(&summary),
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    prompts::section_header("Summary");

    if let Some(extraction) = &summary.extraction {
        prompts::field("Attachments saved", summary.collected);
        prompts::field("Backend", extraction.backend.unwrap_or("none"));
        prompts::field("Archives extracted", extraction.extracted.len());
        if !extraction.failed.is_empty() {
            prompts::field("Archives failed", extraction.failed.len().to_string().red());
        }
        prompts::field("Archives removed", summary.archives_removed);
    } else if summary.collected > 0 {
        prompts::field("Attachments saved", summary.collected);
    }

    match (&summary.aggregation, &summary.report) {
        (Some(aggregation), Some(report)) => {
            prompts::field("Reports parsed", aggregation.parsed);
            if aggregation.failed > 0 {
                prompts::field("Reports skipped", aggregation.failed.to_string().yellow());
            }
            prompts::field("Rows written", aggregation.rows);
            prompts::field(
                "Successful sessions",
                aggregation.successful_sessions.to_string().green(),
            );
            prompts::field("Failed sessions", aggregation.failed_sessions.to_string().red());
            for (result_type, count) in &aggregation.failure_types {
                prompts::field(&format!("  {}", result_type), count);
            }
            prompts::field("JSON files removed", summary.json_removed);
            prompts::field("Report", report.display());
        }
        _ => prompts::field("Report", "not written (no input)".yellow()),
    }
}
