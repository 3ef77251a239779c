// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Domain error type

use thiserror::Error;

/// Errors raised by the simulation core and its collaborators
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// A cow id that was never registered with the tracker
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The transport rejected a message or never acknowledged it
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Broker unreachable or connection dropped
    #[error("transport connection error: {0}")]
    TransportConnection(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("report formatting error")]
    Format(#[from] std::fmt::Error),
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Errors that end the run instead of being logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Storage(_))
    }
}

/// Result alias for the domain error
pub type SimResult<T> = std::result::Result<T, SimError>;
