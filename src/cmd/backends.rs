use crate::config::ConfigManager;
use crate::error::Result;
use crate::pipeline::extract::{self, seven_zip::SevenZipBackend};
use crate::tui::prompts;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct BackendsArgs {
    /// 7-Zip executable to try before the standard locations
    #[arg(long)]
    pub seven_zip: Option<PathBuf>,
}

/// Show which decompression backend a run would use
pub async fn backends(args: BackendsArgs) -> Result<()> {
    let config = ConfigManager::new()?.load_config()?;
    let seven_zip = args.seven_zip.or(config.seven_zip_path);

    println!("{} decompression backends...", "Checking".cyan().bold());

    let probe = SevenZipBackend::new(seven_zip.clone());
    match probe.executable() {
        Some(exe) => prompts::success(&format!("7-Zip found at {}", exe.display())),
        None => {
            let tried: Vec<String> = probe
                .candidates()
                .iter()
                .map(|c| c.display().to_string())
                .collect();
            prompts::warning(&format!("7-Zip not found (tried: {})", tried.join(", ")));
        }
    }

    if cfg!(feature = "gzip-lib") {
        prompts::success("gzip library backend built in");
    } else {
        prompts::warning("gzip library backend not built (enable the gzip-lib feature)");
    }

    let backends = extract::default_backends(seven_zip);
    match extract::select_backend(&backends) {
        Some(backend) => prompts::info(&format!("Runs will extract with {}", backend.name().bold())),
        None => prompts::error("No decompression backend available; archives will be left untouched"),
    }

    Ok(())
}
