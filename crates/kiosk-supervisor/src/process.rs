//! Child process specs, launching and watching.
//!
//! A launched child is handed to [`watch_child`], which forwards its output
//! line by line and reports how it ended. The supervisor only ever talks to
//! the child through the returned [`ChildControl`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::supervisor::SupervisorEvent;

/// Longest child output line forwarded in one piece.
const MAX_LOG_LINE: usize = 8 * 1024;

/// Environment variables copied from the supervisor into every child.
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "USERPROFILE", "SYSTEMROOT", "TEMP", "TMP"];

/// The three processes the supervisor owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Broker backing the print queue.
    DependencyDb,
    /// Print queue worker.
    Worker,
    /// Local web server hosting the kiosk page.
    Server,
}

impl ServiceKind {
    /// Order in which children are stopped on quit.
    pub const SHUTDOWN_ORDER: [ServiceKind; 3] = [Self::DependencyDb, Self::Worker, Self::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependencyDb => "dependency-db",
            Self::Worker => "worker",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of one service as shown on the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceStatus {
    Stopped,
    /// A child owned by this supervisor is running.
    Running,
    /// An instance managed outside the supervisor answered discovery.
    External,
    /// Neither an external instance nor a bundled executable is available.
    Missing,
}

impl ServiceStatus {
    /// Whether the service can be used by other children.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Running | Self::External)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::External => "external",
            Self::Missing => "missing",
        };
        f.write_str(status)
    }
}

/// Which output stream a forwarded line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Everything needed to launch one child.
///
/// The child starts from an empty environment; only what is set here is
/// passed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub service: ServiceKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    pub fn new(service: ServiceKind, program: impl Into<PathBuf>) -> Self {
        Self {
            service,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy the minimal set of host variables a child needs to run.
    #[must_use]
    pub fn inherit_env(mut self) -> Self {
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                self.env.insert((*key).to_string(), value);
            }
        }
        self
    }

    /// Program name for log lines and hints.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Build the command with piped output and a cleared environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// Starts child processes.
///
/// The seam exists so tests can count or refuse launches.
pub trait ProcessLauncher: Send + Sync {
    /// Launch `spec`, returning the running child.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the program could not be started.
    fn launch(&self, spec: &ProcessSpec) -> io::Result<Child>;
}

/// Launches real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &ProcessSpec) -> io::Result<Child> {
        spec.command().spawn()
    }
}

/// How a watched child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// The child exited on its own.
    Exited { code: Option<i32> },
    /// The supervisor killed it.
    Killed,
}

/// Handle to a watched child.
#[derive(Debug)]
pub struct ChildControl {
    pid: Option<u32>,
    kill: mpsc::Sender<oneshot::Sender<()>>,
}

impl ChildControl {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send the kill signal and wait until the watcher has issued it.
    ///
    /// Does not wait for the process to exit. Returns `false` if the child
    /// had already exited.
    pub async fn kill(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.kill.send(ack_tx).await.is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }
}

enum Wake {
    Exited(io::Result<ExitStatus>),
    Kill(oneshot::Sender<()>),
}

/// Watch `child`: forward its output to `events` and call `on_exit` once it
/// ends.
pub fn watch_child<F>(
    service: ServiceKind,
    mut child: Child,
    events: broadcast::Sender<SupervisorEvent>,
    on_exit: F,
) -> ChildControl
where
    F: FnOnce(ChildExit) + Send + 'static,
{
    let pid = child.id();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(service, LogStream::Stdout, stdout, events.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(service, LogStream::Stderr, stderr, events));
    }

    let (kill_tx, mut kill_rx) = mpsc::channel::<oneshot::Sender<()>>(1);

    tokio::spawn(async move {
        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            Some(ack) = kill_rx.recv() => Wake::Kill(ack),
        };

        match wake {
            Wake::Exited(status) => {
                let code = match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(service = %service, "Failed to wait for child: {}", e);
                        None
                    }
                };
                debug!(service = %service, ?code, "Child exited");
                on_exit(ChildExit::Exited { code });
            }
            Wake::Kill(ack) => {
                if let Err(e) = child.start_kill() {
                    warn!(service = %service, "Failed to signal child: {}", e);
                }
                on_exit(ChildExit::Killed);
                let _ = ack.send(());
                let _ = child.wait().await;
                debug!(service = %service, "Killed child reaped");
            }
        }
    });

    ChildControl { pid, kill: kill_tx }
}

async fn forward_lines<R>(
    service: ServiceKind,
    stream: LogStream,
    reader: R,
    events: broadcast::Sender<SupervisorEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LOG_LINE));

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                info!(target: "kiosk_supervisor::child", service = %service, stream = %stream, "{}", line);
                let _ = events.send(SupervisorEvent::Log {
                    service,
                    stream,
                    line,
                });
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(service = %service, stream = %stream, "Dropped oversized output line");
            }
            Err(LinesCodecError::Io(e)) => {
                debug!(service = %service, stream = %stream, "Output closed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ServiceKind::DependencyDb).unwrap();
        assert_eq!(json, "\"dependency-db\"");
        assert_eq!(ServiceKind::DependencyDb.to_string(), "dependency-db");
    }

    #[test]
    fn test_shutdown_order() {
        assert_eq!(
            ServiceKind::SHUTDOWN_ORDER,
            [ServiceKind::DependencyDb, ServiceKind::Worker, ServiceKind::Server]
        );
    }

    #[test]
    fn test_status_availability() {
        assert!(ServiceStatus::Running.is_available());
        assert!(ServiceStatus::External.is_available());
        assert!(!ServiceStatus::Stopped.is_available());
        assert!(!ServiceStatus::Missing.is_available());
    }

    #[test]
    fn test_spec_builder() {
        let spec = ProcessSpec::new(ServiceKind::Worker, "node")
            .args(["worker.js", "--plain"])
            .cwd("/opt/kiosk")
            .env("KIOSK_SCRIPT_MODE", "1");

        assert_eq!(spec.args, vec!["worker.js", "--plain"]);
        assert_eq!(spec.cwd, Some(PathBuf::from("/opt/kiosk")));
        assert_eq!(spec.env.get("KIOSK_SCRIPT_MODE").map(String::as_str), Some("1"));
        assert_eq!(spec.program_name(), "node");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_watch_forwards_output_and_exit() {
        let (events, mut rx) = broadcast::channel(16);
        let (exit_tx, exit_rx) = oneshot::channel();

        let spec = ProcessSpec::new(ServiceKind::Server, "sh")
            .args(["-c", "echo ready; echo boom >&2; exit 3"])
            .inherit_env();
        let child = SystemLauncher.launch(&spec).unwrap();
        let _control = watch_child(ServiceKind::Server, child, events, move |exit| {
            let _ = exit_tx.send(exit);
        });

        assert_eq!(exit_rx.await.unwrap(), ChildExit::Exited { code: Some(3) });

        let mut lines = Vec::new();
        while lines.len() < 2 {
            if let SupervisorEvent::Log { stream, line, .. } = rx.recv().await.unwrap() {
                lines.push((stream, line));
            }
        }
        lines.sort_by_key(|(stream, _)| *stream == LogStream::Stderr);
        assert_eq!(
            lines,
            vec![
                (LogStream::Stdout, "ready".to_string()),
                (LogStream::Stderr, "boom".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_is_acknowledged() {
        let (events, _rx) = broadcast::channel(16);
        let (exit_tx, exit_rx) = oneshot::channel();

        let spec = ProcessSpec::new(ServiceKind::Worker, "sh")
            .args(["-c", "sleep 30"])
            .inherit_env();
        let child = SystemLauncher.launch(&spec).unwrap();
        let control = watch_child(ServiceKind::Worker, child, events, move |exit| {
            let _ = exit_tx.send(exit);
        });

        assert!(control.pid().is_some());
        assert!(control.kill().await);
        assert_eq!(exit_rx.await.unwrap(), ChildExit::Killed);
        assert!(!control.kill().await);
    }
}
