//! Control surface: request/response commands plus pushed events.
//!
//! The transport is newline-delimited JSON. Each input line is one request:
//!
//! ```json
//! {"id": 7, "command": "start-worker"}
//! {"id": 8, "command": "save-config", "printerName": "Zebra ZD420"}
//! {"id": 9, "command": "cleanup-old-label-files", "maxAgeHours": 12}
//! ```
//!
//! Each output line is either `{"type": "response", ..}` answering one
//! request, or `{"type": "event", ..}` pushed when a child logs or changes
//! status.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kiosk_core::constants::LABEL_MAX_AGE_HOURS;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};
use crate::labels;
use crate::printers;
use crate::process::ProcessLauncher;
use crate::settings::SettingsUpdate;
use crate::supervisor::{Supervisor, SupervisorEvent};

const MAX_REQUEST_LEN: usize = 64 * 1024;

/// One control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlRequest {
    StartWorker,
    StopWorker,
    StartServer,
    StopServer,
    GetStatus,
    CheckDependencyDb,
    GetPrinters,
    GetConfig,
    SaveConfig(SettingsUpdate),
    CleanupOldLabelFiles {
        #[serde(default, rename = "maxAgeHours")]
        max_age_hours: Option<u64>,
    },
}

/// A request with its optional correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlEnvelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: ControlRequest,
}

/// Answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            id: None,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: None,
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|data| serde_json::to_value(data).map_err(encode_error)) {
            Ok(data) => Self::ok(data),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    Response(ControlResponse),
    Event(SupervisorEvent),
}

/// Execute one request against the supervisor.
pub async fn dispatch<L: ProcessLauncher>(
    supervisor: &Supervisor<L>,
    request: ControlRequest,
) -> ControlResponse {
    debug!(?request, "Control request");
    match request {
        ControlRequest::StartWorker => ControlResponse::from_result(
            supervisor
                .start_worker()
                .await
                .map(|_| supervisor.status()),
        ),
        ControlRequest::StopWorker => {
            supervisor.stop_worker().await;
            ControlResponse::from_result(Ok(supervisor.status()))
        }
        ControlRequest::StartServer => ControlResponse::from_result(
            supervisor
                .start_server()
                .await
                .map(|_| supervisor.status()),
        ),
        ControlRequest::StopServer => {
            supervisor.stop_server().await;
            ControlResponse::from_result(Ok(supervisor.status()))
        }
        ControlRequest::GetStatus => ControlResponse::from_result(Ok(supervisor.status())),
        ControlRequest::CheckDependencyDb => {
            ControlResponse::from_result(Ok(supervisor.check_dependency_db().await))
        }
        ControlRequest::GetPrinters => {
            ControlResponse::from_result(Ok(printers::list_printers().await))
        }
        ControlRequest::GetConfig => ControlResponse::from_result(supervisor.settings().load().await),
        ControlRequest::SaveConfig(update) => {
            ControlResponse::from_result(supervisor.settings().update(update).await)
        }
        ControlRequest::CleanupOldLabelFiles { max_age_hours } => {
            let hours = max_age_hours.unwrap_or(LABEL_MAX_AGE_HOURS);
            let max_age = Duration::from_secs(hours * 3600);
            ControlResponse::from_result(
                labels::cleanup_old_label_files(&supervisor.options().labels_dir, max_age)
                    .await
                    .map(|removed| json!({ "removed": removed })),
            )
        }
    }
}

/// Parse and execute one input line.
pub async fn handle_line<L: ProcessLauncher>(supervisor: &Supervisor<L>, line: &str) -> ControlResponse {
    match serde_json::from_str::<ControlEnvelope>(line) {
        Ok(envelope) => {
            let mut response = dispatch(supervisor, envelope.request).await;
            response.id = envelope.id;
            response
        }
        Err(e) => {
            warn!("Invalid control request: {}", e);
            ControlResponse::error(format!("Invalid request: {e}"))
        }
    }
}

/// Serve the control surface over a line-oriented byte stream until the
/// input closes, then shut the services down.
///
/// # Errors
///
/// Returns `SupervisorError::Io` if reading input or writing output fails.
/// Services are not shut down in that case.
pub async fn serve<L, R, W>(supervisor: Arc<Supervisor<L>>, reader: R, writer: W) -> Result<()>
where
    L: ProcessLauncher,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut requests = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_REQUEST_LEN));
    let mut output = FramedWrite::new(writer, LinesCodec::new());
    let mut events = supervisor.subscribe();

    info!("Control surface ready");
    loop {
        tokio::select! {
            line = requests.next() => match line {
                Some(Ok(line)) if line.trim().is_empty() => {}
                Some(Ok(line)) => {
                    let response = handle_line(&*supervisor, &line).await;
                    write(&mut output, &Outbound::Response(response)).await?;
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!("Control request too long, dropped");
                    let response = ControlResponse::error("Request too long");
                    write(&mut output, &Outbound::Response(response)).await?;
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => write(&mut output, &Outbound::Event(event)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Control surface lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Control input closed");
    supervisor.shutdown().await;
    Ok(())
}

async fn write<W>(output: &mut FramedWrite<W, LinesCodec>, message: &Outbound) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(message).map_err(encode_error)?;
    output.send(line).await.map_err(|e| match e {
        LinesCodecError::Io(e) => SupervisorError::Io(e),
        other => SupervisorError::Io(io::Error::other(other)),
    })
}

fn encode_error(error: serde_json::Error) -> SupervisorError {
    SupervisorError::Io(io::Error::other(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ServiceKind, ServiceStatus};
    use crate::settings::SettingsStore;
    use crate::supervisor::{ServiceRecord, StatusReport, SupervisorOptions};
    use rstest::rstest;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[rstest]
    #[case(r#"{"command":"start-worker"}"#, ControlRequest::StartWorker)]
    #[case(r#"{"command":"stop-worker"}"#, ControlRequest::StopWorker)]
    #[case(r#"{"command":"start-server"}"#, ControlRequest::StartServer)]
    #[case(r#"{"command":"stop-server"}"#, ControlRequest::StopServer)]
    #[case(r#"{"command":"get-status"}"#, ControlRequest::GetStatus)]
    #[case(r#"{"command":"check-dependency-db"}"#, ControlRequest::CheckDependencyDb)]
    #[case(r#"{"command":"get-printers"}"#, ControlRequest::GetPrinters)]
    #[case(r#"{"command":"get-config"}"#, ControlRequest::GetConfig)]
    #[case(
        r#"{"command":"save-config","printerName":"Zebra"}"#,
        ControlRequest::SaveConfig(SettingsUpdate { printer_name: Some("Zebra".into()), kiosk_id: None })
    )]
    #[case(
        r#"{"command":"cleanup-old-label-files"}"#,
        ControlRequest::CleanupOldLabelFiles { max_age_hours: None }
    )]
    #[case(
        r#"{"command":"cleanup-old-label-files","maxAgeHours":12}"#,
        ControlRequest::CleanupOldLabelFiles { max_age_hours: Some(12) }
    )]
    fn test_request_parsing(#[case] json: &str, #[case] expected: ControlRequest) {
        let envelope: ControlEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.request, expected);
        assert_eq!(envelope.id, None);
    }

    #[test]
    fn test_envelope_keeps_id() {
        let envelope: ControlEnvelope =
            serde_json::from_str(r#"{"id":42,"command":"get-status"}"#).unwrap();
        assert_eq!(envelope.id, Some(42));
        assert_eq!(envelope.request, ControlRequest::GetStatus);
    }

    #[test]
    fn test_outbound_shapes() {
        let response = Outbound::Response(ControlResponse {
            id: Some(1),
            ..ControlResponse::ok(json!({ "removed": 3 }))
        });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "type": "response", "id": 1, "success": true, "data": { "removed": 3 } })
        );

        let event = Outbound::Event(SupervisorEvent::Exited {
            service: ServiceKind::Worker,
            code: Some(1),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "event", "event": "exited", "service": "worker", "code": 1 })
        );
    }

    fn supervisor(dir: &TempDir) -> Supervisor {
        Supervisor::new(
            SupervisorOptions {
                labels_dir: dir.path().join("labels"),
                ..SupervisorOptions::default()
            },
            SettingsStore::new(dir.path().join("settings.json")),
        )
    }

    #[tokio::test]
    async fn test_handle_line_errors() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let response = handle_line(&supervisor, r#"{"command":"reboot"}"#).await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Invalid request"));

        let response = handle_line(
            &supervisor,
            r#"{"id":3,"command":"save-config","kioskId":"  "}"#,
        )
        .await;
        assert_eq!(response.id, Some(3));
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_dispatch_status_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir);

        let response = dispatch(&supervisor, ControlRequest::GetStatus).await;
        let expected = StatusReport {
            worker: ServiceRecord::stopped(),
            server: ServiceRecord::stopped(),
            dependency_db: ServiceRecord::stopped(),
        };
        assert_eq!(response.data, Some(serde_json::to_value(expected).unwrap()));

        let response = dispatch(
            &supervisor,
            ControlRequest::CleanupOldLabelFiles { max_age_hours: None },
        )
        .await;
        assert_eq!(response.data, Some(json!({ "removed": 0 })));

        let response = dispatch(&supervisor, ControlRequest::StopWorker).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let dir = TempDir::new().unwrap();
        let supervisor = Arc::new(supervisor(&dir));

        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(serve(Arc::clone(&supervisor), server_read, server_write));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        client_write
            .write_all(b"{\"id\":1,\"command\":\"get-config\"}\n\n{\"id\":2,\"command\":\"get-status\"}\n")
            .await
            .unwrap();

        let mut responses = Vec::new();
        while responses.len() < 2 {
            let line = lines.next_line().await.unwrap().unwrap();
            let value: Value = serde_json::from_str(&line).unwrap();
            if value["type"] == "response" {
                responses.push(value);
            }
        }

        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["data"]["kioskId"].as_str().unwrap().starts_with("kiosk-"));
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["data"]["worker"]["status"], "stopped");

        client_write.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }
}
