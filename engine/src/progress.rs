//! Progress reporting.
//!
//! The orchestrators never touch UI state. They push plain snapshots into a
//! `ProgressCallback` (backup) or `RestoreLog` (restore), and any front end
//! projects those into its own model. `ChannelProgress` forwards everything
//! over a crossbeam channel for observers living on another thread.

use crossbeam_channel::Sender;

use crate::model::{BackupProgress, RunState};

/// Receives updates from a backup run.
///
/// All methods are called synchronously on the thread executing the run.
/// Within a run, `bytes_copied` never decreases from one snapshot to the next.
pub trait ProgressCallback: Send {
    /// Called on every state machine transition, including the terminal one.
    fn on_state_changed(&self, _state: RunState) {}

    /// Called after every chunk written, and for skip and error events.
    fn on_progress(&self, progress: &BackupProgress);
}

/// Receives status lines from a restore.
pub trait RestoreLog: Send {
    fn on_message(&self, message: &str);
}

/// Everything an observer can be told, as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StateChanged(RunState),
    Progress(BackupProgress),
    Log(String),
}

/// Forwards callbacks into a channel. Send errors mean the observer hung up
/// and are ignored.
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        ChannelProgress { sender }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_state_changed(&self, state: RunState) {
        let _ = self.sender.send(ProgressEvent::StateChanged(state));
    }

    fn on_progress(&self, progress: &BackupProgress) {
        let _ = self.sender.send(ProgressEvent::Progress(progress.clone()));
    }
}

impl RestoreLog for ChannelProgress {
    fn on_message(&self, message: &str) {
        let _ = self.sender.send(ProgressEvent::Log(message.to_string()));
    }
}
