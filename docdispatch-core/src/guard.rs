//! Closed-flag of a transaction scope.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Tracks whether a transaction scope has been closed.
///
/// The flag starts open, is closed exactly once by commit, rollback or drop of the
/// scope, and never reopens. It is read by submitting callers and written by whichever
/// thread closes the scope, so it is atomic. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct TransactionGuard {
    closed: Arc<AtomicBool>,
}

impl TransactionGuard {
    /// Creates an open guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the scope has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the scope. Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Fails with [`DocumentStoreError::TransactionClosed`] if the scope is closed.
    pub fn verify_open(&self) -> DocumentStoreResult<()> {
        if self.is_closed() {
            return Err(DocumentStoreError::TransactionClosed);
        }

        Ok(())
    }
}
