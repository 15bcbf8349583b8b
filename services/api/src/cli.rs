use crate::demo::{run_demo, run_sync, DemoArgs, SyncArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use talent_hub::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Talent Integration Hub",
    about = "Run and exercise the recruiting integration hub from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a single sync for a configured ATS integration
    Sync(SyncArgs),
    /// Sync a CSV export end to end and print the sync log
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file with integration records (overrides HUB_INTEGRATIONS_FILE)
    #[arg(long)]
    pub(crate) integrations: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sync(args) => run_sync(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
