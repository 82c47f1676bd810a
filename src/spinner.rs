//! A minimal terminal spinner for visual feedback while a task grinds
//! through its remote lifecycle.

use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Frame interval.
const INTERVAL: Duration = Duration::from_millis(80);

/// A terminal spinner that runs in a background task.
///
/// Call [`Spinner::start`] to begin and [`Spinner::stop`] when done.
/// The message can be swapped mid-flight; the poll progress hook uses
/// that to show the task's live status. Writes to stderr so it doesn't
/// interfere with stdout output.
pub struct Spinner {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
    message: watch::Sender<String>,
}

impl Spinner {
    /// Start a spinner with the given message (e.g. `"submitting"`).
    pub fn start(message: &str) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (message_tx, message_rx) = watch::channel(message.to_string());

        let handle = tokio::spawn(async move {
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                let text = message_rx.borrow().clone();
                // \r moves to start of line, \x1b[2K clears the line
                eprint!("\x1b[2K\r{frame} {text}");
                let _ = std::io::stderr().flush();

                tokio::select! {
                    _ = tokio::time::sleep(INTERVAL) => {}
                    _ = cancel_rx.changed() => break,
                }
                i += 1;
            }
            // Clear the spinner line
            eprint!("\x1b[2K\r");
            let _ = std::io::stderr().flush();
        });

        Self {
            handle,
            cancel: cancel_tx,
            message: message_tx,
        }
    }

    /// A handle for updating the message from elsewhere (e.g. inside a
    /// progress hook that outlives this borrow).
    pub fn updates(&self) -> watch::Sender<String> {
        self.message.clone()
    }

    /// Replace the message shown next frame.
    pub fn update(&self, message: impl Into<String>) {
        let _ = self.message.send(message.into());
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}
