mod cmd;
mod config;
mod error;
mod graph;
mod pipeline;
mod tui;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mtasts-report",
    about = "Harvest MTA-STS / TLS-RPT failure reports from Exchange Online into CSV",
    version,
    long_about = "Collects TLS-RPT report attachments from an Exchange Online mailbox folder,\n\
                  decompresses them and flattens every policy entry into one CSV row."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect, extract and aggregate reports into a CSV file
    Run(cmd::run::RunArgs),

    /// Authenticate a tenant profile against Microsoft Graph
    Login(cmd::login::LoginArgs),

    /// Clear the cached token of a tenant profile
    Logout(cmd::login::LogoutArgs),

    /// Show which decompression backend is available
    Backends(cmd::backends::BackendsArgs),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("mtasts_report=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => cmd::run::run(args).await?,
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Backends(args) => cmd::backends::backends(args).await?,
    }

    Ok(())
}
