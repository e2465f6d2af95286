use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use wahoo_core::{BridgeCommand, BridgeEvent, BridgeMessage};

use crate::error::{IpcError, Result};

#[derive(Debug, Clone)]
pub(crate) struct CommandOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Waiters for `CommandResult` events, keyed by command line id.
pub(crate) type PendingResults = Arc<Mutex<HashMap<String, oneshot::Sender<CommandOutcome>>>>;

/// An in-flight command. Dropping it, answered or not, forgets the waiter.
pub(crate) struct PendingRequest {
    id: String,
    rx: oneshot::Receiver<CommandOutcome>,
    pending: PendingResults,
}

impl PendingRequest {
    fn register(pending: &PendingResults, id: String) -> Self {
        let (tx, rx) = oneshot::channel();
        lock_pending(pending).insert(id.clone(), tx);
        Self {
            id,
            rx,
            pending: pending.clone(),
        }
    }

    /// Wait for the command's `CommandResult`.
    pub async fn outcome(mut self, timeout: Duration) -> Result<CommandOutcome> {
        tokio::time::timeout(timeout, &mut self.rx)
            .await
            .map_err(|_| IpcError::Timeout)?
            .map_err(|_| IpcError::ChannelClosed)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
    }
}

pub(crate) struct ProcessHandle {
    child: Child,
    stdin_tx: mpsc::Sender<String>,
    pending: PendingResults,
}

impl ProcessHandle {
    pub async fn spawn(
        working_dir: &Path,
        program: &str,
        args: &[String],
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IpcError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().ok_or(IpcError::ProcessNotRunning)?;
        let stderr = child.stderr.take().ok_or(IpcError::ProcessNotRunning)?;
        let stdin = child.stdin.take().ok_or(IpcError::ProcessNotRunning)?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(100);
        let pending: PendingResults = Arc::default();

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Owns the only event sender, so the stream ends when stdout closes.
        let stdout_pending = pending.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !route_line(&line, &stdout_pending, &event_tx).await {
                    break;
                }
            }
            // dropping the waiters fails every in-flight request
            lock_pending(&stdout_pending).clear();
            debug!("bridge stdout closed");
        });

        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!("bridge stderr: {}", line);
            }
        });

        Ok(Self {
            child,
            stdin_tx,
            pending,
        })
    }

    pub async fn send(&self, line: &str) -> Result<()> {
        let msg = if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{}\n", line)
        };

        self.stdin_tx
            .send(msg)
            .await
            .map_err(|_| IpcError::ChannelClosed)
    }

    pub async fn send_command(&self, command: BridgeCommand) -> Result<()> {
        debug!(command = command.name(), "Sending bridge command");
        let line = BridgeMessage::new_command(command).to_line()?;
        self.send(&line).await
    }

    /// Send a command and register a waiter for its `CommandResult`.
    pub async fn request(&self, command: BridgeCommand) -> Result<PendingRequest> {
        debug!(command = command.name(), "Sending bridge request");
        let message = BridgeMessage::new_command(command);
        let line = message.to_line()?;

        let request = PendingRequest::register(&self.pending, message.id);
        self.send(&line).await?;
        Ok(request)
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(IpcError::Io)
    }

    /// Wait for the process to exit on its own; `false` on timeout.
    pub async fn wait_for_exit(&mut self, grace: Duration) -> bool {
        matches!(
            tokio::time::timeout(grace, self.child.wait()).await,
            Ok(Ok(_))
        )
    }
}

fn lock_pending(
    pending: &PendingResults,
) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<CommandOutcome>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Dispatch one stdout line. Returns `false` once nobody listens for events.
pub(crate) async fn route_line(
    line: &str,
    pending: &PendingResults,
    event_tx: &mpsc::Sender<BridgeEvent>,
) -> bool {
    if line.trim().is_empty() {
        return true;
    }

    let Some(event) = BridgeMessage::from_line(line).and_then(BridgeMessage::into_event) else {
        debug!(line, "Ignoring unparseable bridge line");
        return true;
    };

    match event {
        BridgeEvent::CommandResult {
            command_id,
            success,
            data,
            error,
        } => {
            let waiter = lock_pending(pending).remove(&command_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(CommandOutcome {
                        success,
                        data,
                        error,
                    });
                }
                None => debug!(command_id = %command_id, "Result for unknown command"),
            }
            true
        }
        event => event_tx.send(event).await.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_result_completes_waiter() {
        let pending: PendingResults = Arc::default();
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert("c1".into(), tx);

        let line = r#"{"id":"e1","type":"CommandResult","payload":{"command_id":"c1","success":false,"data":null,"error":"not on whatsapp"}}"#;
        assert!(route_line(line, &pending, &event_tx).await);

        let outcome = rx.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("not on whatsapp"));
        assert!(pending.lock().unwrap().is_empty());
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unanswered_request_is_forgotten() {
        let pending: PendingResults = Arc::default();
        let request = PendingRequest::register(&pending, "c2".into());
        assert!(pending.lock().unwrap().contains_key("c2"));

        let result = request.outcome(Duration::from_millis(10)).await;

        assert!(matches!(result, Err(IpcError::Timeout)));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answered_request_completes() {
        let pending: PendingResults = Arc::default();
        let (event_tx, _event_rx) = mpsc::channel(8);
        let request = PendingRequest::register(&pending, "c3".into());

        let line = r#"{"id":"e4","type":"CommandResult","payload":{"command_id":"c3","success":true,"data":{"message_id":"3EB0"}}}"#;
        assert!(route_line(line, &pending, &event_tx).await);

        let outcome = request.outcome(Duration::from_secs(1)).await.unwrap();
        assert!(outcome.success);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let pending: PendingResults = Arc::default();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        let line = r#"{"id":"e2","type":"Connected","payload":{"phone_number":"5511999999999"}}"#;
        assert!(route_line(line, &pending, &event_tx).await);

        match event_rx.recv().await {
            Some(BridgeEvent::Connected { phone_number }) => {
                assert_eq!(phone_number.as_deref(), Some("5511999999999"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_noise_is_skipped() {
        let pending: PendingResults = Arc::default();
        let (event_tx, mut event_rx) = mpsc::channel(8);

        assert!(route_line("", &pending, &event_tx).await);
        assert!(route_line("starting bridge...", &pending, &event_tx).await);
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_event_channel_stops_routing() {
        let pending: PendingResults = Arc::default();
        let (event_tx, event_rx) = mpsc::channel(8);
        drop(event_rx);

        let line = r#"{"id":"e3","type":"Ready"}"#;
        assert!(!route_line(line, &pending, &event_tx).await);
    }
}
