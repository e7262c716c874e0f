//! qfetch server binary entry point.
//!
//! QUIC endpoint serving one directory.

use clap::Parser;
use tracing::{error, info};

use qfetch_server::{serve, Cli};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = qfetch_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "qfetch-server starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("qfetch-server: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        error!(error = %e, "Server failed");
        eprintln!("qfetch-server: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> qfetch_core::Result<()> {
    let config = cli.server_config()?;

    // In-flight connections go down with the runtime, not drained.
    tokio::select! {
        result = serve(config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
