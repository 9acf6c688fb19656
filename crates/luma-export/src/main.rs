use clap::Parser;

use luma_export::config::CliArgs;
use luma_export::logging::{LoggingDestination, init_logging};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = CliArgs::parse();
    if let Err(err) = init_logging(LoggingDestination::FileAndStderr) {
        eprintln!("Warning: failed to initialize logging: {err}");
    }

    if let Err(err) = luma_export::run(cli).await {
        eprintln!("luma export failed: {err}");
        std::process::exit(1);
    }
}
