//! `supervise` subcommand: JSON control surface over stdin/stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use kiosk_core::constants::{DEFAULT_DEPENDENCY_DB_HOST, DEFAULT_DEPENDENCY_DB_PORT};
use kiosk_supervisor::{
    CommandLine, ProcessLauncher, SettingsStore, Supervisor, SupervisorOptions, control,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Args, Debug)]
pub struct SuperviseArgs {
    /// Application directory the worker and server run in
    #[arg(long, default_value = ".")]
    pub app_dir: PathBuf,

    /// Runtime used for the worker and server scripts
    #[arg(long, default_value = "node")]
    pub runtime: PathBuf,

    /// Worker script, relative to the application directory
    #[arg(long, default_value = "print-worker.js")]
    pub worker_script: String,

    /// Server script, relative to the application directory
    #[arg(long, default_value = "server.js")]
    pub server_script: String,

    #[arg(long, default_value = DEFAULT_DEPENDENCY_DB_HOST)]
    pub db_host: String,

    #[arg(long, default_value_t = DEFAULT_DEPENDENCY_DB_PORT)]
    pub db_port: u16,

    /// Bundled dependency database executable
    #[arg(long)]
    pub bundled_db: Option<PathBuf>,

    /// Directory holding rendered label files
    #[arg(long)]
    pub labels_dir: Option<PathBuf>,

    /// Start the server and worker immediately
    #[arg(long)]
    pub autostart: bool,
}

impl SuperviseArgs {
    pub fn options(&self) -> SupervisorOptions {
        SupervisorOptions {
            app_dir: self.app_dir.clone(),
            worker: CommandLine::new(&self.runtime, [self.worker_script.clone()]),
            server: CommandLine::new(&self.runtime, [self.server_script.clone()]),
            dependency_db_host: self.db_host.clone(),
            dependency_db_port: self.db_port,
            bundled_dependency_db: self.bundled_db.clone(),
            labels_dir: self
                .labels_dir
                .clone()
                .unwrap_or_else(|| self.app_dir.join("labels")),
            ..SupervisorOptions::default()
        }
    }
}

pub async fn run(args: SuperviseArgs, settings: SettingsStore) -> Result<()> {
    let supervisor = Arc::new(Supervisor::new(args.options(), settings));
    info!(app_dir = %args.app_dir.display(), "Supervisor started");

    let cancel = CancellationToken::new();
    let monitor = supervisor.spawn_health_monitor(cancel.clone());

    if args.autostart {
        if let Err(e) = supervisor.start_server().await {
            error!("Autostart of server failed: {}", e);
        }
        if let Err(e) = supervisor.start_worker().await {
            error!("Autostart of worker failed: {}", e);
        }
    }

    let served = serve_until(
        &supervisor,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await;

    cancel.cancel();
    let _ = monitor.await;
    served
}

/// Run the control surface until it closes or `signal` resolves. Children
/// are stopped on every exit path.
async fn serve_until<L, R, W>(
    supervisor: &Arc<Supervisor<L>>,
    reader: R,
    writer: W,
    signal: impl Future<Output = Result<()>>,
) -> Result<()>
where
    L: ProcessLauncher,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let served = tokio::select! {
        served = control::serve(Arc::clone(supervisor), reader, writer) => {
            served.context("control surface failed")
        }
        signalled = signal => {
            info!("Termination requested");
            signalled
        }
    };
    supervisor.shutdown().await;
    served
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("waiting for Ctrl-C"),
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")
    }
}
