use clap::Parser;
use tracing_subscriber::EnvFilter;

use promptqa::cli::{cmd_run, cmd_test, Cli, Commands};

#[tokio::main]
async fn main() {
    // Progress and diagnostics go to stderr; stdout is reserved for --json.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Test(args) => cmd_test(args).await,
        Commands::Run(args) => cmd_run(args).await,
    };
    std::process::exit(exit_code);
}
