//! Dependency database discovery.
//!
//! A single inline `PING` over a fresh TCP connection, bounded by a short
//! timeout. Anything other than `+PONG` counts as "not there".

use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::trace;

const MAX_REPLY_LEN: usize = 512;

/// Why a probe did not get a `PONG`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("No reply within {0}ms")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connect(#[from] io::Error),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Connection closed before reply")]
    Closed,
}

impl From<LinesCodecError> for ProbeError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::Io(e) => Self::Connect(e),
            LinesCodecError::MaxLineLengthExceeded => {
                Self::UnexpectedReply("reply too long".to_string())
            }
        }
    }
}

/// Ping the dependency database at `host:port`.
///
/// # Errors
///
/// Returns a [`ProbeError`] if the connection fails, the reply is not
/// `+PONG`, or `timeout` elapses first.
pub async fn ping(host: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    let attempt = async {
        let stream = TcpStream::connect((host, port)).await?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_REPLY_LEN));

        framed.send("PING").await?;
        match framed.next().await {
            Some(Ok(reply)) if reply == "+PONG" => Ok(()),
            Some(Ok(reply)) => Err(ProbeError::UnexpectedReply(reply)),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProbeError::Closed),
        }
    };

    let result = match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout.as_millis() as u64)),
    };
    trace!(host, port, ok = result.is_ok(), "Dependency database probe");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn fake_server(reply: Option<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(_)) = lines.next_line().await {
                        match reply {
                            Some(reply) => write.write_all(reply.as_bytes()).await.unwrap(),
                            None => std::future::pending::<()>().await,
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_pong_answers() {
        let port = fake_server(Some("+PONG\r\n")).await;
        ping("127.0.0.1", port, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_rejected() {
        let port = fake_server(Some("-NOAUTH Authentication required.\r\n")).await;
        let err = ping("127.0.0.1", port, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProbeError::UnexpectedReply(reply) if reply.starts_with("-NOAUTH")));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let port = fake_server(None).await;
        let err = ping("127.0.0.1", port, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(100)));
    }

    #[tokio::test]
    async fn test_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ping("127.0.0.1", port, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect(_)));
    }
}
