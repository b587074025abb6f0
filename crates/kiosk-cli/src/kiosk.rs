//! `kiosk` subcommand: scan sources, config refresh and the runner loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use kiosk_api::{ApiClient, ApiClientConfig};
use kiosk_checkin::{
    ConfigHandle, GuardConfig, KioskEvent, KioskPipeline, KioskRunner, NoticeLevel,
    OperatorNotice,
};
use kiosk_core::KioskId;
use kiosk_core::constants::KEYSTROKE_TIMEOUT_MS;
use kiosk_scanner::devices::{AnyCameraDevice, AnyWedgeDevice};
use kiosk_scanner::stream::{LineCamera, StreamWedge};
use kiosk_scanner::{AdapterConfig, ScanSourceAdapter};
use kiosk_supervisor::SettingsStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct KioskArgs {
    /// Registration API base URL
    #[arg(long, env = "KIOSK_API_URL")]
    pub api_url: String,

    /// Kiosk identity; defaults to the one stored in the settings file
    #[arg(long, env = "KIOSK_ID")]
    pub kiosk_id: Option<KioskId>,

    /// Raw keystroke device of a USB wedge scanner
    #[arg(long)]
    pub wedge_device: Option<PathBuf>,

    /// Do not read decoded camera payloads from stdin
    #[arg(long)]
    pub no_camera: bool,

    /// Keystroke inactivity window in milliseconds
    #[arg(long, default_value_t = KEYSTROKE_TIMEOUT_MS)]
    pub keystroke_timeout_ms: u64,

    /// Seconds between config fetch attempts until the first one succeeds
    #[arg(long, default_value_t = 5)]
    pub config_retry_secs: u64,

    /// Seconds between config reloads once loaded
    #[arg(long, default_value_t = 60)]
    pub config_refresh_secs: u64,
}

pub async fn run(args: KioskArgs, settings: SettingsStore) -> Result<()> {
    let kiosk_id = match args.kiosk_id {
        Some(id) => id,
        None => {
            settings
                .load()
                .await
                .context("loading kiosk identity")?
                .kiosk_id
        }
    };
    info!(kiosk_id = %kiosk_id, api = %args.api_url, "Starting kiosk");

    let api = Arc::new(
        ApiClient::new(ApiClientConfig::new(&args.api_url, kiosk_id))
            .context("invalid API URL")?,
    );
    let config = ConfigHandle::new();
    let refresher = tokio::spawn(keep_config_fresh(
        Arc::clone(&api),
        config.clone(),
        Duration::from_secs(args.config_retry_secs),
        Duration::from_secs(args.config_refresh_secs),
    ));

    let mut adapter = ScanSourceAdapter::new(AdapterConfig {
        camera_enabled: !args.no_camera,
        hardware_enabled: args.wedge_device.is_some(),
        keystroke_timeout: Duration::from_millis(args.keystroke_timeout_ms),
    });
    if !args.no_camera {
        adapter.register_camera(AnyCameraDevice::Lines(LineCamera::new(
            "stdin",
            Box::new(tokio::io::stdin()),
        )));
    }
    if let Some(path) = &args.wedge_device {
        let device = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening wedge device {}", path.display()))?;
        adapter.register_wedge(AnyWedgeDevice::Stream(StreamWedge::new(
            path.display().to_string(),
            Box::new(device),
        )));
    }
    let (scans, sink, _tasks) = adapter.start().into_parts();
    drop(sink);

    let pipeline = Arc::new(KioskPipeline::new(api));
    let runner = KioskRunner::new(Arc::clone(&pipeline), config, GuardConfig::default());
    let printer = tokio::spawn(print_events(runner.subscribe()));

    tokio::select! {
        () = runner.run(scans) => info!("All scan sources closed"),
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    refresher.abort();
    printer.abort();

    let stats = pipeline.stats();
    info!(
        successes = stats.successes,
        failures = stats.failures,
        "Session finished"
    );
    if let Some(last) = stats.last_printed {
        info!(
            identifier = %last.identifier,
            visitor = %last.visitor_name,
            at = %last.printed_at.format("%H:%M:%S"),
            "Last badge printed"
        );
    }
    Ok(())
}

async fn keep_config_fresh(
    api: Arc<ApiClient>,
    config: ConfigHandle,
    retry: Duration,
    refresh: Duration,
) {
    loop {
        let wait = match config.load(api.as_ref()).await {
            Ok(_) => refresh,
            Err(_) if config.is_loaded() => refresh,
            Err(_) => retry,
        };
        tokio::time::sleep(wait).await;
    }
}

async fn print_events(mut events: broadcast::Receiver<KioskEvent>) {
    loop {
        match events.recv().await {
            Ok(KioskEvent::Started { identifier, source }) => {
                debug!(%source, "Scan accepted");
                println!("... checking in {identifier}");
            }
            Ok(KioskEvent::Rejected { notice, .. }) => show(&notice),
            Ok(KioskEvent::Finished(outcome)) => show(outcome.notice()),
            Ok(KioskEvent::DeviceError { source, error }) => {
                println!("!! {source} scanner stopped: {error}");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event display lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn show(notice: &OperatorNotice) {
    let marker = match notice.level {
        NoticeLevel::Info => "--",
        NoticeLevel::Success => "OK",
        NoticeLevel::Warning => "!!",
        NoticeLevel::Error => "XX",
    };
    println!("{marker} {notice}");
}
