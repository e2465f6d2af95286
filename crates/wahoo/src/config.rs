//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use wahoo_worker::{ExponentialBackoff, NeverReconnect, ReconnectPolicy};

pub const DEFAULT_ADDR: &str = "localhost:8080";

/// Local web interface and JSON API for a WhatsApp account.
///
/// Every option can also be set through its environment variable.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "wahoo", version, about)]
pub struct Cli {
    /// Directory holding the SQLite mirror and session credentials
    #[arg(long, env = "WAHOO_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// HTTP server address
    #[arg(long, env = "WAHOO_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Don't open the browser automatically
    #[arg(long)]
    pub no_browser: bool,

    /// Working directory of the session bridge process
    #[arg(long, env = "WAHOO_BRIDGE_DIR", default_value = "bridge")]
    pub bridge_dir: PathBuf,

    /// Command that starts the session bridge
    #[arg(long, env = "WAHOO_BRIDGE_CMD", default_value = "bun run index.ts")]
    pub bridge_cmd: String,

    /// What to do when the session drops
    #[arg(long, value_enum, default_value_t = ReconnectMode::Backoff)]
    pub reconnect: ReconnectMode,

    /// Upper bound for the reconnect delay, in seconds
    #[arg(long, default_value_t = 60)]
    pub reconnect_max_delay: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReconnectMode {
    /// Retry with exponential backoff
    Backoff,
    /// Stay disconnected until restarted
    Never,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_dir: PathBuf,
    pub addr: String,
    pub open_browser: bool,
    pub bridge_dir: PathBuf,
    pub bridge_cmd: String,
    pub reconnect: ReconnectMode,
    pub reconnect_max_delay: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        let store_dir = cli.store_dir.unwrap_or_else(default_store_dir);

        Self {
            store_dir,
            addr: cli.addr,
            open_browser: !cli.no_browser,
            bridge_dir: cli.bridge_dir,
            bridge_cmd: cli.bridge_cmd,
            reconnect: cli.reconnect,
            reconnect_max_delay: Duration::from_secs(cli.reconnect_max_delay.max(1)),
        }
    }

    pub fn reconnect_policy(&self) -> Box<dyn ReconnectPolicy> {
        match self.reconnect {
            ReconnectMode::Backoff => Box::new(ExponentialBackoff {
                max: self.reconnect_max_delay,
                ..Default::default()
            }),
            ReconnectMode::Never => Box::new(NeverReconnect),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn default_store_dir() -> PathBuf {
    ProjectDirs::from("com", "wahoo", "wahoo")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("store"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["wahoo", "--store-dir", "/tmp/wahoo"]).unwrap();
        let config = Config::from_cli(cli);

        assert_eq!(config.store_dir, PathBuf::from("/tmp/wahoo"));
        assert!(config.open_browser);
        assert_eq!(config.reconnect, ReconnectMode::Backoff);
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "wahoo",
            "--store-dir",
            "/tmp/wahoo",
            "--addr",
            "127.0.0.1:9000",
            "--no-browser",
            "--reconnect",
            "never",
        ])
        .unwrap();
        let config = Config::from_cli(cli);

        assert_eq!(config.url(), "http://127.0.0.1:9000");
        assert!(!config.open_browser);
        assert_eq!(config.reconnect_policy().next_delay(1), None);
    }

    #[test]
    fn test_backoff_respects_max_delay() {
        let cli =
            Cli::try_parse_from(["wahoo", "--store-dir", "/tmp/w", "--reconnect-max-delay", "5"])
                .unwrap();
        let mut policy = Config::from_cli(cli).reconnect_policy();

        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(10), Some(Duration::from_secs(5)));
    }
}
