use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "thai-text-overlay",
    version,
    about = "HTTP service that draws Thai text onto images"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings")]
    settings: Option<PathBuf>,

    /// Bind address (overrides settings and HOST)
    #[arg(long = "host")]
    host: Option<String>,

    /// Listen port (overrides settings and PORT)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    thai_text_overlay::logging::init(cli.verbose)?;

    let mut settings = thai_text_overlay::settings::load_settings(cli.settings.as_deref())?;
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    debug!(?settings, "settings loaded");
    thai_text_overlay::run_server(settings).await
}
