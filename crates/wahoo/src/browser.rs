use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

const OPEN_DELAY: Duration = Duration::from_millis(500);

/// Open `url` in the system browser once the listener had time to come up.
pub fn open_later(url: String) {
    tokio::spawn(async move {
        tokio::time::sleep(OPEN_DELAY).await;
        open(&url);
    });
}

fn open(url: &str) {
    let mut command = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler");
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    match command.arg(url).spawn() {
        Ok(_) => debug!(url, "Opened browser"),
        Err(e) => warn!(url, error = %e, "Failed to open browser"),
    }
}
