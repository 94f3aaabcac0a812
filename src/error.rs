//! Error types for the bridge.
//!
//! Only configuration, lifecycle and I/O setup problems surface as `BridgeError`.
//! Transport write failures are `SendError`s: the output loop counts them and moves on.

use std::{io, time::Duration};
use thiserror::Error;

use crate::bridge::BridgeState;

/// Bridge-level errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Lifecycle method called in a state that does not allow it.
    #[error("Cannot {action} while bridge is {from:?}")]
    InvalidTransition {
        from: BridgeState,
        action: &'static str,
    },

    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, io::Error),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Status server error: {0}")]
    StatusServer(String),
}

/// Failure of a single frame write. Never retried inline.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
