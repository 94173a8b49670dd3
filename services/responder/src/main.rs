// responder: Multi-purpose APRS-IS answering daemon.

use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "responder", version, about = "APRS-IS command responder")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/aprs-bot/responder.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(version = responder::daemon::VERSION, "responder starting");

    let cfg = match responder::config::load_config_from_path(&args.config) {
        Ok(cfg) => {
            info!(
                callsign = %cfg.station.callsign,
                server = %cfg.server.host,
                addressees = cfg.ingress.addressees.len(),
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    responder::daemon::run(cfg).await;
}
