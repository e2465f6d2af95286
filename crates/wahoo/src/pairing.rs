use owo_colors::OwoColorize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Render every new pairing code in the terminal until cancelled.
pub async fn print_pairing_codes(
    mut codes: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = codes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let code = codes.borrow_and_update().clone();
        if let Some(code) = code {
            println!();
            println!("{}", "Scan this code with WhatsApp on your phone:".bold().yellow());
            if let Err(e) = qr2term::print_qr(&code) {
                warn!(error = ?e, "Failed to render pairing code");
                println!("{}", code);
            }
        }
    }
}
