use tokio::sync::mpsc;
use tracing::debug;

/// Commands understood by the shield window frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayCommand {
    /// Show the shield fully opaque, or hide it.
    SetVisible(bool),
    /// Replace the status readout text.
    SetStatus(String),
}

/// Command sink for the shield window.
///
/// These are commands, not queries: the analysis side never reads window
/// state back, and a missing or slow frontend must never stall detection.
pub trait OverlaySink {
    fn set_visible(&mut self, opaque: bool);
    fn set_status_text(&mut self, text: &str);
}

/// Forwards overlay commands to the window frontend over a channel.
///
/// The frontend owns the window lifecycle (including the close and minimize
/// controls) and drains the receiving end on its own thread.
pub struct CommandOverlay {
    tx: mpsc::UnboundedSender<OverlayCommand>,
}

impl CommandOverlay {
    /// Build an overlay together with the receiver the frontend drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OverlayCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: OverlayCommand) {
        // frontend gone: drop the command, sampling goes on regardless
        if self.tx.send(command).is_err() {
            debug!("overlay frontend detached, dropping command");
        }
    }
}

impl OverlaySink for CommandOverlay {
    fn set_visible(&mut self, opaque: bool) {
        self.send(OverlayCommand::SetVisible(opaque));
    }

    fn set_status_text(&mut self, text: &str) {
        self.send(OverlayCommand::SetStatus(text.to_string()));
    }
}
