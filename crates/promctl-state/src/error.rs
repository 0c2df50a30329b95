//! State store failures.
//!
//! Each variant after `Open` and `Transaction` names the piece of unit state
//! (its well-known key) that could not be stored or loaded. A pass that hits
//! any of them aborts without touching the managed server.

use std::fmt::Display;

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    /// Beginning or committing a transaction failed.
    #[error("state transaction failed: {0}")]
    Transaction(String),

    /// Opening the table holding `key`, or reading or writing `key`, failed.
    #[error("storage failure on {key}: {reason}")]
    Storage { key: &'static str, reason: String },

    #[error("cannot encode {key}: {reason}")]
    Encode { key: &'static str, reason: String },

    /// The stored bytes are not a valid `key` value, e.g. written by an
    /// incompatible release.
    #[error("stored {key} is unreadable: {reason}")]
    Decode { key: &'static str, reason: String },
}

impl StateError {
    pub(crate) fn open(e: impl Display) -> Self {
        StateError::Open(e.to_string())
    }

    pub(crate) fn transaction(e: impl Display) -> Self {
        StateError::Transaction(e.to_string())
    }

    pub(crate) fn storage<E: Display>(key: &'static str) -> impl FnOnce(E) -> Self {
        move |e| StateError::Storage {
            key,
            reason: e.to_string(),
        }
    }

    pub(crate) fn encode(key: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |e| StateError::Encode {
            key,
            reason: e.to_string(),
        }
    }

    pub(crate) fn decode(key: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |e| StateError::Decode {
            key,
            reason: e.to_string(),
        }
    }
}
