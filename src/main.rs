mod cli;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli::run(cli).await {
        tracing::error!(error = %e, "clipper-prefs failed");
        eprintln!("clipper-prefs: {e}");
        std::process::exit(1);
    }
}
