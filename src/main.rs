//! azcompose CLI: compose Azure infrastructure stacks into provisioning documents.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter (falls back to RUST_LOG).
const LOG_ENV: &str = "AZCOMPOSE_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "azcompose",
    version,
    about = "Compose Azure resources into a deterministic infrastructure document"
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: azcompose::cli::Commands,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("azcompose=debug,warn")
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("azcompose=info,warn"))
    };
    // A second init (e.g. under a test harness) is not an error
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = azcompose::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
