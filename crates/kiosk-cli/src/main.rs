//! badge-kiosk - QR check-in kiosk and local process supervisor
//!
//! Two modes share one binary:
//!
//! - `kiosk`: reads scans from a camera decoder on stdin and an optional
//!   wedge scanner device, and drives check-in and badge printing against
//!   the registration API.
//! - `supervise`: owns the dependency database, print worker and local web
//!   server, controlled through newline-delimited JSON on stdin/stdout.
//!
//! Logs always go to stderr so stdout stays free for the front end.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiosk_supervisor::SettingsStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod kiosk;
mod supervise;

/// badge-kiosk - QR check-in kiosk
#[derive(Parser, Debug)]
#[command(name = "badge-kiosk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Settings file holding the printer name and kiosk identity
    #[arg(long, global = true, env = "KIOSK_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the check-in kiosk
    Kiosk(kiosk::KioskArgs),

    /// Supervise the local print services
    Supervise(supervise::SuperviseArgs),
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn settings_store(path: Option<PathBuf>) -> Result<SettingsStore> {
    let path = match path {
        Some(path) => path,
        None => SettingsStore::default_location()
            .context("no per-user config directory; pass --settings")?,
    };
    Ok(SettingsStore::new(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let settings = settings_store(cli.settings)?;
    match cli.command {
        Commands::Kiosk(args) => kiosk::run(args, settings).await,
        Commands::Supervise(args) => supervise::run(args, settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_kiosk_args() {
        let cli = Cli::try_parse_from([
            "badge-kiosk",
            "--json-logs",
            "kiosk",
            "--api-url",
            "https://expo.example.com/api",
            "--kiosk-id",
            "hall-a-01",
            "--wedge-device",
            "/dev/hidraw0",
        ])
        .unwrap();

        assert!(cli.json_logs);
        let Commands::Kiosk(args) = cli.command else {
            panic!("expected kiosk command");
        };
        assert_eq!(args.api_url, "https://expo.example.com/api");
        assert_eq!(args.kiosk_id.unwrap().as_str(), "hall-a-01");
        assert_eq!(args.wedge_device, Some(PathBuf::from("/dev/hidraw0")));
        assert!(!args.no_camera);
    }

    #[test]
    fn test_kiosk_rejects_blank_id() {
        let result = Cli::try_parse_from([
            "badge-kiosk",
            "kiosk",
            "--api-url",
            "http://localhost:3000/api",
            "--kiosk-id",
            " ",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_supervise_defaults() {
        let cli = Cli::try_parse_from(["badge-kiosk", "supervise", "--autostart"]).unwrap();
        let Commands::Supervise(args) = cli.command else {
            panic!("expected supervise command");
        };
        assert!(args.autostart);
        assert_eq!(args.db_port, 6379);

        let options = args.options();
        assert_eq!(options.labels_dir, PathBuf::from("./labels"));
        assert_eq!(options.worker.args, vec!["print-worker.js"]);
    }
}
