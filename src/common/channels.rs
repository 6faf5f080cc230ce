//! Channel type definitions for inter-task communication

use tokio::sync::{mpsc, watch};

use super::types::SignalBundle;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Create a new signal channel with the default buffer size
pub fn create_signal_channel() -> (mpsc::Sender<SignalBundle>, mpsc::Receiver<SignalBundle>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create the shutdown broadcast; `true` means stop
pub fn create_shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
