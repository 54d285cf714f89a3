//! Owner-thread enforcement.
//!
//! The store is only ever touched from the thread that created it (the UI
//! thread). Every public entry point runs [`OwnerThread::check`] first, so an
//! off-thread call is rejected deterministically instead of racing.

use std::thread::{self, ThreadId};

use crate::error::{StoreError, StoreResult};

/// The thread allowed to read and mutate a store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OwnerThread {
    id: ThreadId,
}

impl OwnerThread {
    /// Bind to the calling thread.
    pub fn current() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Fail with [`StoreError::WrongThread`] unless called on the owner thread.
    pub fn check(&self, operation: &'static str) -> StoreResult<()> {
        let actual = thread::current().id();
        if actual == self.id {
            return Ok(());
        }
        tracing::error!(
            operation,
            owner = ?self.id,
            actual = ?actual,
            thread_name = thread::current().name().unwrap_or("<unnamed>"),
            "Store accessed off its owner thread"
        );
        Err(StoreError::WrongThread {
            operation,
            owner: self.id,
            actual,
        })
    }
}
