//! Error types for the state store and history (thiserror-based).

use std::thread::ThreadId;

use ct_common::ValidationError;
use thiserror::Error;

/// Errors returned by [`CurveStore`](crate::CurveStore) operations.
///
/// Only caller misuse and integrity violations end up here. Interactive
/// requests that merely cannot be satisfied (stale index, unknown curve)
/// return `Ok(false)` / `Ok(None)` instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No curve name was given and no active curve is set.
    #[error("No curve name given and no active curve is set")]
    NoActiveCurve,

    /// Store accessed from a thread other than the one that owns it.
    #[error("`{operation}` called from thread {actual:?}, store is owned by {owner:?}")]
    WrongThread {
        operation: &'static str,
        owner: ThreadId,
        actual: ThreadId,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// The owner side of a [`StoreMailbox`](crate::StoreMailbox) was dropped.
    #[error("Store mailbox is closed")]
    MailboxClosed,
}

/// Errors from encoding or decoding history snapshots.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Snapshot encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Snapshot compression IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt snapshot: expected {expected} points, decoded {actual}")]
    Corrupt { expected: usize, actual: usize },
}

/// Convenience Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
