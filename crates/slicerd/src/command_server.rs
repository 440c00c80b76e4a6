//! CommandServer - operator command channel
//!
//! One JSON command per TCP connection:
//!
//! ```text
//! {"exam": "true", "simulation": "false"}
//! ```
//!
//! Both keys are required and string-typed; values are `true` or `false`
//! in any case. The connection is closed after the command. By default no
//! reply is written; with `acknowledge` enabled the server answers one line,
//! `ok <mode>` or `error <reason>`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slicing_common::{SliceError, SliceResult};
use slicing_types::{parse_flag, Mode};

use crate::config::CommandConfig;
use crate::mode_ctl::{ModeController, TransitionOutcome};

/// A validated mode command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeCommand {
    pub exam: bool,
    pub simulation: bool,
}

impl ModeCommand {
    /// Validates a raw command payload
    pub fn parse(raw: &[u8]) -> SliceResult<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| SliceError::invalid_command("payload is not UTF-8"))?
            .trim();
        if text.is_empty() {
            return Err(SliceError::invalid_command("empty payload"));
        }

        let value: Value = serde_json::from_str(text)
            .map_err(|e| SliceError::invalid_command(format!("malformed JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| SliceError::invalid_command("payload is not a JSON object"))?;

        let flag = |key: &str| -> SliceResult<bool> {
            let raw = object
                .get(key)
                .ok_or_else(|| SliceError::invalid_command(format!("missing key '{}'", key)))?
                .as_str()
                .ok_or_else(|| {
                    SliceError::invalid_command(format!("'{}' must be a string", key))
                })?;
            parse_flag(raw).map_err(|e| SliceError::invalid_command(format!("{}: {}", key, e)))
        };

        Ok(Self {
            exam: flag("exam")?,
            simulation: flag("simulation")?,
        })
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.exam, self.simulation)
    }
}

/// Per-connection limits
#[derive(Debug, Clone)]
struct ConnectionSettings {
    max_command_bytes: usize,
    read_timeout: Duration,
    acknowledge: bool,
}

/// TCP listener feeding operator commands to the [`ModeController`]
pub struct CommandServer {
    listener: TcpListener,
    controller: Arc<ModeController>,
    settings: Arc<ConnectionSettings>,
    permits: Arc<Semaphore>,
}

impl CommandServer {
    /// Binds the command channel. Port 0 picks a free port.
    pub async fn bind(config: &CommandConfig, controller: Arc<ModeController>) -> SliceResult<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        info!(listen = %listener.local_addr()?, "Command channel listening");

        Ok(Self {
            listener,
            controller,
            settings: Arc::new(ConnectionSettings {
                max_command_bytes: config.max_command_bytes,
                read_timeout: Duration::from_millis(config.read_timeout_ms),
                acknowledge: config.acknowledge,
            }),
            permits: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> SliceResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// Each connection runs on its own task; at most `max_connections` are
    /// handled at once, further clients wait in the accept backlog.
    pub async fn run(self, shutdown: CancellationToken) -> SliceResult<()> {
        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => permit
                    .map_err(|_| SliceError::internal("command permits closed"))?,
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept command connection");
                        continue;
                    }
                },
            };

            let controller = self.controller.clone();
            let settings = self.settings.clone();
            tokio::spawn(async move {
                handle_connection(stream, peer, &controller, &settings).await;
                drop(permit);
            });
        }

        info!("Command channel stopped");
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    controller: &ModeController,
    settings: &ConnectionSettings,
) {
    debug!(peer = %peer, "Command connection accepted");

    let read = tokio::time::timeout(
        settings.read_timeout,
        read_command(&mut stream, settings.max_command_bytes),
    )
    .await;
    let command = match read {
        Ok(Ok(raw)) => ModeCommand::parse(&raw),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SliceError::timeout(
            "read command",
            u64::try_from(settings.read_timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    };

    let reply = match command {
        Ok(command) => {
            info!(
                peer = %peer,
                exam = command.exam,
                simulation = command.simulation,
                "Mode command accepted"
            );
            let outcome = controller
                .transition(command.exam, command.simulation)
                .await;
            if let TransitionOutcome::Applied(report) = outcome {
                debug!(peer = %peer, failures = report.failures, "Mode command applied");
            }
            format!("ok {}\n", outcome.mode())
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Command rejected");
            format!("error {}\n", e)
        }
    };

    if settings.acknowledge {
        if let Err(e) = stream.write_all(reply.as_bytes()).await {
            debug!(peer = %peer, error = %e, "Failed to write acknowledgement");
        }
    }
    let _ = stream.shutdown().await;
}

/// Reads one command: up to EOF or the end of the first complete JSON
/// value, whichever comes first. Payloads over `limit` are rejected.
async fn read_command<R>(stream: &mut R, limit: usize) -> SliceResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(1024));
    let mut chunk = [0u8; 512];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > limit {
            return Err(SliceError::invalid_command(format!(
                "command exceeds {} bytes",
                limit
            )));
        }

        match first_value_end(&buf) {
            Some(end) => {
                buf.truncate(end);
                break;
            }
            None if has_syntax_error(&buf) => break,
            None => {}
        }
    }

    Ok(buf)
}

/// End offset of the first complete JSON value in `buf`
fn first_value_end(buf: &[u8]) -> Option<usize> {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match values.next() {
        Some(Ok(_)) => Some(values.byte_offset()),
        _ => None,
    }
}

/// True once more input can no longer turn `buf` into valid JSON
fn has_syntax_error(buf: &[u8]) -> bool {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    matches!(values.next(), Some(Err(e)) if !e.is_eof())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicing_test::command_fixtures;

    #[test]
    fn test_parse_valid_commands() {
        for mode in Mode::ALL {
            let raw = command_fixtures::command_for(mode);
            let cmd = ModeCommand::parse(raw.as_bytes()).unwrap();
            assert_eq!(cmd.mode(), mode);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let cmd = ModeCommand::parse(command_fixtures::mixed_case_command().as_bytes()).unwrap();
        assert_eq!(cmd, ModeCommand { exam: true, simulation: false });
    }

    #[test]
    fn test_parse_trims_payload_and_ignores_extra_keys() {
        let raw = b"  {\"exam\": \"false\", \"simulation\": \"TRUE\", \"who\": \"ops\"}\r\n";
        let cmd = ModeCommand::parse(raw).unwrap();
        assert_eq!(cmd.mode(), Mode::Simulation);
    }

    #[test]
    fn test_parse_rejects_padded_flag_values() {
        for raw in [
            br#"{"exam": " TRUE ", "simulation": "false"}"#.as_slice(),
            br#"{"exam": "true", "simulation": "false "}"#.as_slice(),
        ] {
            let err = ModeCommand::parse(raw).unwrap_err();
            assert!(matches!(err, SliceError::InvalidCommand { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in command_fixtures::malformed_commands() {
            let err = ModeCommand::parse(raw.as_bytes()).unwrap_err();
            assert!(
                matches!(err, SliceError::InvalidCommand { .. }),
                "{:?} gave {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        assert!(ModeCommand::parse(&[0xff, 0xfe, b'{']).is_err());
    }

    #[tokio::test]
    async fn test_read_stops_after_first_value() {
        let mut input: &[u8] = b"{\"exam\": \"true\", \"simulation\": \"false\"}\ntrailing";
        let raw = read_command(&mut input, 1024).await.unwrap();
        assert_eq!(ModeCommand::parse(&raw).unwrap().mode(), Mode::Exam);
    }

    #[tokio::test]
    async fn test_read_accepts_multi_line_command() {
        let mut input: &[u8] = b"{\n  \"exam\": \"true\",\n  \"simulation\": \"false\"\n}\n";
        let raw = read_command(&mut input, 1024).await.unwrap();
        assert_eq!(ModeCommand::parse(&raw).unwrap().mode(), Mode::Exam);
    }

    #[tokio::test]
    async fn test_read_gives_up_on_broken_json() {
        let mut input: &[u8] = b"{\"exam\" true, \"simulation\": \"false\"}";
        let raw = read_command(&mut input, 1024).await.unwrap();
        assert!(ModeCommand::parse(&raw).is_err());
    }

    #[tokio::test]
    async fn test_read_stops_at_complete_json() {
        let payload = command_fixtures::command_for(Mode::Simulation);
        let mut input = payload.as_bytes();
        let raw = read_command(&mut input, 1024).await.unwrap();
        assert_eq!(raw, payload.as_bytes());
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_command() {
        let payload = format!("{{\"exam\": \"true\",{}\"simulation\": \"false\"}}", " ".repeat(2048));
        let mut input = payload.as_bytes();
        let err = read_command(&mut input, 1024).await.unwrap_err();
        assert!(err.to_string().contains("exceeds 1024 bytes"));
    }

    #[tokio::test]
    async fn test_read_to_eof() {
        let mut input: &[u8] = b"  ";
        assert_eq!(read_command(&mut input, 1024).await.unwrap(), b"  ");
    }
}
