//! Process supervisor: owns the dependency database, worker and server
//! children and reports their status.
//!
//! # Lifecycle
//!
//! ```text
//! start-worker ──► ensure dependency DB ──► ping answers ──► External (no spawn)
//!                        │                 └─ bundled exe ──► spawn ──► Running
//!                        │                 └─ neither ─────► Missing (worker not started)
//!                        └──► spawn worker ──► Running ──(exit)──► Stopped
//! ```
//!
//! Start and stop requests for the same service are serialized, so the last
//! request wins. A child that exits on its own is reported and left stopped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kiosk_core::constants::{
    BUNDLED_DB_MAX_CLIENTS, DEFAULT_DEPENDENCY_DB_HOST, DEFAULT_DEPENDENCY_DB_PORT,
    DISCOVERY_TIMEOUT_MS, HEALTH_CHECK_INTERVAL_SECS, SCRIPT_MODE_ENV,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery;
use crate::error::{Result, SupervisorError};
use crate::process::{
    ChildControl, ChildExit, LogStream, ProcessLauncher, ProcessSpec, ServiceKind, ServiceStatus,
    SystemLauncher, watch_child,
};
use crate::settings::SettingsStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Program and arguments for one supervised child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Runtime options for the supervisor. Not persisted.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Working directory for the worker and server.
    pub app_dir: PathBuf,
    pub worker: CommandLine,
    pub server: CommandLine,
    pub dependency_db_host: String,
    pub dependency_db_port: u16,
    /// Bundled dependency database executable, if shipped.
    pub bundled_dependency_db: Option<PathBuf>,
    pub labels_dir: PathBuf,
    pub discovery_timeout: Duration,
    pub health_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            worker: CommandLine::new("node", ["print-worker.js"]),
            server: CommandLine::new("node", ["server.js"]),
            dependency_db_host: DEFAULT_DEPENDENCY_DB_HOST.to_string(),
            dependency_db_port: DEFAULT_DEPENDENCY_DB_PORT,
            bundled_dependency_db: None,
            labels_dir: PathBuf::from("labels"),
            discovery_timeout: Duration::from_millis(DISCOVERY_TIMEOUT_MS),
            health_interval: Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS),
        }
    }
}

/// What the control surface knows about one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub status: ServiceStatus,
    /// Pid of the child owned by this supervisor, while it runs.
    pub pid: Option<u32>,
    /// Exit code of the last unexpected exit. Cleared by an operator stop.
    pub last_exit_code: Option<i32>,
}

impl ServiceRecord {
    pub fn stopped() -> Self {
        Self {
            status: ServiceStatus::Stopped,
            pid: None,
            last_exit_code: None,
        }
    }
}

/// Status of all three services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub worker: ServiceRecord,
    pub server: ServiceRecord,
    pub dependency_db: ServiceRecord,
}

/// Result of a dependency database check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub host: String,
    pub port: u16,
    pub status: ServiceStatus,
    pub bundled_available: bool,
}

/// Pushed to the control surface as things happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SupervisorEvent {
    /// One line of child output.
    Log {
        service: ServiceKind,
        stream: LogStream,
        line: String,
    },

    StatusChanged {
        service: ServiceKind,
        status: ServiceStatus,
    },

    /// A child exited without being asked to.
    Exited {
        service: ServiceKind,
        code: Option<i32>,
    },

    /// Periodic status republished by the health monitor.
    Health(StatusReport),
}

struct RunningChild {
    generation: u64,
    control: ChildControl,
}

struct ServiceTable {
    children: HashMap<ServiceKind, RunningChild>,
    /// Last known dependency database status when no bundled child runs.
    dependency_db: ServiceStatus,
    exit_codes: HashMap<ServiceKind, i32>,
    generation: u64,
}

impl ServiceTable {
    fn status(&self, service: ServiceKind) -> ServiceStatus {
        if self.children.contains_key(&service) {
            ServiceStatus::Running
        } else if service == ServiceKind::DependencyDb {
            self.dependency_db
        } else {
            ServiceStatus::Stopped
        }
    }

    fn record(&self, service: ServiceKind) -> ServiceRecord {
        ServiceRecord {
            status: self.status(service),
            pid: self
                .children
                .get(&service)
                .and_then(|child| child.control.pid()),
            last_exit_code: self.exit_codes.get(&service).copied(),
        }
    }
}

fn lock(table: &Mutex<ServiceTable>) -> MutexGuard<'_, ServiceTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the supervised children.
pub struct Supervisor<L = SystemLauncher> {
    options: SupervisorOptions,
    settings: SettingsStore,
    launcher: L,
    table: Arc<Mutex<ServiceTable>>,
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor<SystemLauncher> {
    pub fn new(options: SupervisorOptions, settings: SettingsStore) -> Self {
        Self::with_launcher(options, settings, SystemLauncher)
    }
}

impl<L: ProcessLauncher> Supervisor<L> {
    pub fn with_launcher(options: SupervisorOptions, settings: SettingsStore, launcher: L) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            options,
            settings,
            launcher,
            table: Arc::new(Mutex::new(ServiceTable {
                children: HashMap::new(),
                dependency_db: ServiceStatus::Stopped,
                exit_codes: HashMap::new(),
                generation: 0,
            })),
            lifecycle: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> StatusReport {
        let table = lock(&self.table);
        StatusReport {
            worker: table.record(ServiceKind::Worker),
            server: table.record(ServiceKind::Server),
            dependency_db: table.record(ServiceKind::DependencyDb),
        }
    }

    /// Start the worker, making sure the dependency database is up first.
    ///
    /// # Errors
    ///
    /// Returns `DependencyMissing` if the database is unavailable, in which
    /// case the worker is not started, or `SpawnFailed` if the worker
    /// could not be launched.
    pub async fn start_worker(&self) -> Result<ServiceStatus> {
        self.start(ServiceKind::Worker).await
    }

    /// Start the local web server.
    ///
    /// # Errors
    ///
    /// Returns `SpawnFailed` if the server could not be launched.
    pub async fn start_server(&self) -> Result<ServiceStatus> {
        self.start(ServiceKind::Server).await
    }

    pub async fn stop_worker(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked(ServiceKind::Worker).await;
    }

    pub async fn stop_server(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_locked(ServiceKind::Server).await;
    }

    /// Discover or start the dependency database.
    pub async fn ensure_dependency_db(&self) -> ServiceStatus {
        let _lifecycle = self.lifecycle.lock().await;
        self.ensure_dependency_db_locked().await
    }

    /// Re-check dependency database reachability without starting anything.
    pub async fn check_dependency_db(&self) -> DependencyReport {
        let bundled_available = self.bundled_db_path().await.is_some();
        let host = self.options.dependency_db_host.clone();
        let port = self.options.dependency_db_port;

        let running = lock(&self.table)
            .children
            .contains_key(&ServiceKind::DependencyDb);
        let status = if running {
            ServiceStatus::Running
        } else {
            let probed = match discovery::ping(&host, port, self.options.discovery_timeout).await {
                Ok(()) => ServiceStatus::External,
                Err(e) => {
                    debug!(host = %host, port, "Dependency database not answering: {}", e);
                    if bundled_available {
                        ServiceStatus::Stopped
                    } else {
                        ServiceStatus::Missing
                    }
                }
            };
            self.set_dependency_db(probed);
            probed
        };

        DependencyReport {
            host,
            port,
            status,
            bundled_available,
        }
    }

    /// Stop every child: dependency database, then worker, then server.
    ///
    /// Each kill is issued and acknowledged before the next; exits are not
    /// awaited.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        info!("Stopping supervised services");
        for service in ServiceKind::SHUTDOWN_ORDER {
            self.stop_locked(service).await;
        }
    }

    /// Re-check the dependency database every `health_interval` and
    /// republish the status until `cancel` fires.
    pub fn spawn_health_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()>
    where
        L: 'static,
    {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.options.health_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = supervisor.check_dependency_db().await;
                        debug!(status = %report.status, "Health check");
                        supervisor.publish(SupervisorEvent::Health(supervisor.status()));
                    }
                }
            }
            debug!("Health monitor stopped");
        })
    }

    async fn start(&self, service: ServiceKind) -> Result<ServiceStatus> {
        let _lifecycle = self.lifecycle.lock().await;

        if lock(&self.table).children.contains_key(&service) {
            debug!(service = %service, "Already running");
            return Ok(ServiceStatus::Running);
        }

        if service == ServiceKind::Worker {
            let dependency = self.ensure_dependency_db_locked().await;
            if !dependency.is_available() {
                warn!(
                    service = %service,
                    host = %self.options.dependency_db_host,
                    port = self.options.dependency_db_port,
                    "Dependency database missing, not starting"
                );
                return Err(SupervisorError::DependencyMissing {
                    host: self.options.dependency_db_host.clone(),
                    port: self.options.dependency_db_port,
                });
            }
        }

        let spec = self.app_spec(service).await?;
        self.spawn(spec)
    }

    async fn ensure_dependency_db_locked(&self) -> ServiceStatus {
        if lock(&self.table)
            .children
            .contains_key(&ServiceKind::DependencyDb)
        {
            return ServiceStatus::Running;
        }

        let host = &self.options.dependency_db_host;
        let port = self.options.dependency_db_port;
        match discovery::ping(host, port, self.options.discovery_timeout).await {
            Ok(()) => {
                info!(host = %host, port, "Using external dependency database");
                self.set_dependency_db(ServiceStatus::External);
                return ServiceStatus::External;
            }
            Err(e) => debug!(host = %host, port, "Dependency database not answering: {}", e),
        }

        let Some(path) = self.bundled_db_path().await else {
            warn!(
                host = %host,
                port,
                "Dependency database not reachable and no bundled executable present"
            );
            self.set_dependency_db(ServiceStatus::Missing);
            return ServiceStatus::Missing;
        };

        match self.spawn(self.bundled_db_spec(path)) {
            Ok(status) => status,
            Err(e) => {
                error!("Bundled dependency database failed to start: {}", e);
                self.set_dependency_db(ServiceStatus::Missing);
                ServiceStatus::Missing
            }
        }
    }

    async fn bundled_db_path(&self) -> Option<PathBuf> {
        let path = self.options.bundled_dependency_db.as_ref()?;
        match tokio::fs::try_exists(path).await {
            Ok(true) => Some(path.clone()),
            _ => None,
        }
    }

    fn bundled_db_spec(&self, program: PathBuf) -> ProcessSpec {
        ProcessSpec::new(ServiceKind::DependencyDb, program)
            .args([
                "--port".to_string(),
                self.options.dependency_db_port.to_string(),
                "--bind".to_string(),
                "127.0.0.1".to_string(),
                "--save".to_string(),
                String::new(),
                "--appendonly".to_string(),
                "no".to_string(),
                "--maxclients".to_string(),
                BUNDLED_DB_MAX_CLIENTS.to_string(),
            ])
            .cwd(&self.options.app_dir)
            .inherit_env()
    }

    async fn app_spec(&self, service: ServiceKind) -> Result<ProcessSpec> {
        let command = match service {
            ServiceKind::Server => &self.options.server,
            _ => &self.options.worker,
        };
        let settings = self.settings.load().await?;

        Ok(ProcessSpec::new(service, &command.program)
            .args(command.args.iter().cloned())
            .cwd(&self.options.app_dir)
            .inherit_env()
            .env(SCRIPT_MODE_ENV, "1")
            .env("REDIS_HOST", &self.options.dependency_db_host)
            .env("REDIS_PORT", self.options.dependency_db_port.to_string())
            .env("PRINTER_NAME", settings.printer_name)
            .env("KIOSK_ID", settings.kiosk_id.as_str()))
    }

    fn spawn(&self, spec: ProcessSpec) -> Result<ServiceStatus> {
        let service = spec.service;
        let child = self.launcher.launch(&spec).map_err(|e| {
            let err = SupervisorError::spawn_failed(service, &spec.program_name(), &e);
            error!(service = %service, "{}", err);
            err
        })?;

        let mut table = lock(&self.table);
        table.generation += 1;
        let generation = table.generation;

        let shared = Arc::clone(&self.table);
        let events = self.events.clone();
        let control = watch_child(service, child, self.events.clone(), move |exit| {
            let ChildExit::Exited { code } = exit else {
                return;
            };
            {
                let mut table = lock(&shared);
                match table.children.get(&service) {
                    Some(entry) if entry.generation == generation => {
                        table.children.remove(&service);
                        match code {
                            Some(code) => table.exit_codes.insert(service, code),
                            None => table.exit_codes.remove(&service),
                        };
                        if service == ServiceKind::DependencyDb {
                            table.dependency_db = ServiceStatus::Stopped;
                        }
                    }
                    _ => return,
                }
            }
            warn!(service = %service, ?code, "Child exited unexpectedly");
            let _ = events.send(SupervisorEvent::Exited { service, code });
            let _ = events.send(SupervisorEvent::StatusChanged {
                service,
                status: ServiceStatus::Stopped,
            });
        });

        info!(
            service = %service,
            pid = ?control.pid(),
            program = %spec.program_name(),
            "Child started"
        );
        table
            .children
            .insert(service, RunningChild { generation, control });
        drop(table);

        self.publish(SupervisorEvent::StatusChanged {
            service,
            status: ServiceStatus::Running,
        });
        Ok(ServiceStatus::Running)
    }

    async fn stop_locked(&self, service: ServiceKind) {
        let entry = lock(&self.table).children.remove(&service);
        let Some(entry) = entry else {
            debug!(service = %service, "Not running");
            return;
        };

        {
            let mut table = lock(&self.table);
            table.exit_codes.remove(&service);
            if service == ServiceKind::DependencyDb {
                table.dependency_db = ServiceStatus::Stopped;
            }
        }
        if !entry.control.kill().await {
            debug!(service = %service, "Child already gone");
        }
        info!(service = %service, "Child stopped");
        self.publish(SupervisorEvent::StatusChanged {
            service,
            status: ServiceStatus::Stopped,
        });
    }

    fn set_dependency_db(&self, status: ServiceStatus) {
        let previous = std::mem::replace(&mut lock(&self.table).dependency_db, status);
        if previous != status {
            self.publish(SupervisorEvent::StatusChanged {
                service: ServiceKind::DependencyDb,
                status,
            });
        }
    }

    fn publish(&self, event: SupervisorEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SupervisorOptions::default();
        assert_eq!(options.dependency_db_port, 6379);
        assert_eq!(options.discovery_timeout, Duration::from_secs(2));
        assert_eq!(options.health_interval, Duration::from_secs(30));
        assert!(options.bundled_dependency_db.is_none());
    }

    #[test]
    fn test_bundled_db_flags() {
        let supervisor = Supervisor::new(
            SupervisorOptions {
                dependency_db_port: 6390,
                ..SupervisorOptions::default()
            },
            SettingsStore::new("settings.json"),
        );
        let spec = supervisor.bundled_db_spec(PathBuf::from("redis-server"));

        assert_eq!(
            spec.args,
            vec![
                "--port",
                "6390",
                "--bind",
                "127.0.0.1",
                "--save",
                "",
                "--appendonly",
                "no",
                "--maxclients",
                "64"
            ]
        );
    }

    #[test]
    fn test_initial_status_all_stopped() {
        let supervisor =
            Supervisor::new(SupervisorOptions::default(), SettingsStore::new("settings.json"));
        assert_eq!(
            supervisor.status(),
            StatusReport {
                worker: ServiceRecord::stopped(),
                server: ServiceRecord::stopped(),
                dependency_db: ServiceRecord::stopped(),
            }
        );
    }

    #[test]
    fn test_status_report_serialization() {
        let report = StatusReport {
            worker: ServiceRecord {
                status: ServiceStatus::Stopped,
                pid: None,
                last_exit_code: Some(1),
            },
            server: ServiceRecord {
                status: ServiceStatus::Running,
                pid: Some(4242),
                last_exit_code: None,
            },
            dependency_db: ServiceRecord {
                status: ServiceStatus::External,
                ..ServiceRecord::stopped()
            },
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({
                "worker": { "status": "stopped", "pid": null, "lastExitCode": 1 },
                "server": { "status": "running", "pid": 4242, "lastExitCode": null },
                "dependencyDb": { "status": "external", "pid": null, "lastExitCode": null },
            })
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = SupervisorEvent::StatusChanged {
            service: ServiceKind::Worker,
            status: ServiceStatus::Running,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "status-changed", "service": "worker", "status": "running" })
        );
    }
}
