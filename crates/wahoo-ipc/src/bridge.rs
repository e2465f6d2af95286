use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use wahoo_core::BridgeCommand;

use crate::error::{IpcError, Result};
use crate::process::ProcessHandle;
use crate::transport::{EventReceiver, SendReceipt, SessionTransport};

const EVENT_CHANNEL_CAPACITY: usize = 1000;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Working directory of the bridge process.
    pub dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    /// Handed to the bridge so it keeps its device credentials next to ours.
    pub store_dir: PathBuf,
}

impl BridgeConfig {
    /// Build from a whitespace separated command line such as `bun run index.ts`.
    pub fn from_command_line(dir: PathBuf, command: &str, store_dir: PathBuf) -> Result<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| IpcError::InvalidCommand(command.to_string()))?;

        Ok(Self {
            dir,
            program,
            args: parts.collect(),
            store_dir,
        })
    }
}

/// Runs the messaging session in a sidecar process speaking JSON lines.
pub struct BridgeProcess {
    config: BridgeConfig,
    process: Mutex<Option<ProcessHandle>>,
}

impl BridgeProcess {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if !config.dir.is_dir() {
            return Err(IpcError::BridgeNotFound(config.dir));
        }

        Ok(Self {
            config,
            process: Mutex::new(None),
        })
    }

    async fn stop(handle: &mut ProcessHandle) {
        info!("Stopping bridge process");
        let _ = handle.send_command(BridgeCommand::Shutdown).await;
        if !handle.wait_for_exit(SHUTDOWN_GRACE).await {
            if let Err(e) = handle.kill().await {
                warn!(error = %e, "Failed to kill bridge process");
            }
        }
        info!("Bridge process stopped");
    }
}

impl SessionTransport for BridgeProcess {
    async fn connect(&self) -> Result<EventReceiver> {
        let mut process = self.process.lock().await;

        if let Some(mut old) = process.take() {
            Self::stop(&mut old).await;
        }

        info!(
            program = %self.config.program,
            dir = %self.config.dir.display(),
            "Starting bridge process"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = ProcessHandle::spawn(
            &self.config.dir,
            &self.config.program,
            &self.config.args,
            event_tx,
        )
        .await?;

        handle
            .send_command(BridgeCommand::Start {
                store_dir: self.config.store_dir.display().to_string(),
            })
            .await?;

        *process = Some(handle);

        info!("Bridge process started successfully");
        Ok(event_rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let handle = self.process.lock().await.take();
        if let Some(mut handle) = handle {
            Self::stop(&mut handle).await;
        }
        Ok(())
    }

    async fn send_text(&self, to: &str, content: &str) -> Result<SendReceipt> {
        let request = {
            let process = self.process.lock().await;
            let handle = process.as_ref().ok_or(IpcError::ProcessNotRunning)?;
            handle
                .request(BridgeCommand::SendMessage {
                    to: to.to_string(),
                    content: content.to_string(),
                })
                .await?
        };

        let outcome = request.outcome(SEND_TIMEOUT).await?;

        let detail = if outcome.success {
            match outcome
                .data
                .as_ref()
                .and_then(|data| data.get("message_id"))
                .and_then(|id| id.as_str())
            {
                Some(id) => format!("Message sent to {} (id {})", to, id),
                None => format!("Message sent to {}", to),
            }
        } else {
            outcome
                .error
                .unwrap_or_else(|| "Message rejected by session".to_string())
        };

        Ok(SendReceipt {
            success: outcome.success,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_command_line() {
        let config = BridgeConfig::from_command_line(
            PathBuf::from("bridge"),
            "  bun run   index.ts ",
            PathBuf::from("store"),
        )
        .unwrap();

        assert_eq!(config.program, "bun");
        assert_eq!(config.args, vec!["run", "index.ts"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        let result =
            BridgeConfig::from_command_line(PathBuf::from("bridge"), "   ", PathBuf::from("store"));
        assert!(matches!(result, Err(IpcError::InvalidCommand(_))));
    }

    #[test]
    fn test_missing_bridge_dir_rejected() {
        let dir = std::env::temp_dir().join("wahoo-no-such-bridge-dir");
        let config =
            BridgeConfig::from_command_line(dir, "bun run index.ts", PathBuf::from("store")).unwrap();

        assert!(matches!(
            BridgeProcess::new(config),
            Err(IpcError::BridgeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_process_fails() {
        let config = BridgeConfig::from_command_line(
            std::env::temp_dir(),
            "bun run index.ts",
            PathBuf::from("store"),
        )
        .unwrap();
        let bridge = BridgeProcess::new(config).unwrap();

        assert!(matches!(
            bridge.send_text("123@s.whatsapp.net", "hi").await,
            Err(IpcError::ProcessNotRunning)
        ));
        // disconnect without a live session is a no-op
        bridge.disconnect().await.unwrap();
    }
}
