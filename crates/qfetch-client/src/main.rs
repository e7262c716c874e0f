//! qfetch: command-line client for the qfetch file server.

use std::path::Path;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use qfetch_client::{Cli, ClientCommand, FetchClient};
use qfetch_core::LogFormat;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = qfetch_core::init_logging(cli.verbose, None, LogFormat::Text) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "qfetch starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("qfetch: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        error!(error = %e, "Request failed");
        eprintln!("qfetch: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> qfetch_core::Result<()> {
    let client = FetchClient::connect(cli.server, cli.client_options()?).await?;
    info!(
        addr = %client.server_addr(),
        fingerprint = %client.server_fingerprint(),
        "Server certificate"
    );

    let result = match &cli.command {
        ClientCommand::Ls => list(&client).await,
        ClientCommand::Get { name, output } => fetch(&client, name, output.as_deref()).await,
    };

    client.close().await;
    result
}

async fn list(client: &FetchClient) -> qfetch_core::Result<()> {
    let mut out = String::new();
    for name in client.list().await? {
        out.push_str(&name);
        out.push('\n');
    }
    write_stdout(out.as_bytes()).await
}

async fn fetch(client: &FetchClient, name: &str, output: Option<&Path>) -> qfetch_core::Result<()> {
    let data = client.get(name).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &data).await?;
            info!(path = %path.display(), bytes = data.len(), "File saved");
            Ok(())
        }
        None => write_stdout(&data).await,
    }
}

async fn write_stdout(data: &[u8]) -> qfetch_core::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data).await?;
    stdout.flush().await?;
    Ok(())
}
