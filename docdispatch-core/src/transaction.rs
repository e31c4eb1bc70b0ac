//! Explicit transaction scopes.

use tracing::{debug, warn};

use crate::{
    collection::{Collection, TypedCollection},
    completion::Completion,
    database::{DatabaseInner, Scope},
    document::Document,
    engine::Engine,
    error::{DocumentStoreError, DocumentStoreResult},
    guard::TransactionGuard,
};

/// An open transaction.
///
/// Collections obtained from a transaction submit their operations through its guard.
/// [`commit`](Transaction::commit) and [`rollback`](Transaction::rollback) close the
/// guard before they return, so any operation submitted afterwards through this scope
/// fails eagerly with [`DocumentStoreError::TransactionClosed`] and is never queued.
///
/// Dropping an open transaction closes it and dispatches a rollback.
#[derive(Debug)]
pub struct Transaction<'a> {
    database: &'a DatabaseInner,
    guard: TransactionGuard,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(database: &'a DatabaseInner) -> Self {
        Self {
            database,
            guard: TransactionGuard::new(),
        }
    }

    fn scope(&self) -> Scope<'_> {
        Scope::new(self.database, Some(&self.guard))
    }

    /// Gets an untyped collection bound to this transaction.
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection::new(name.to_string(), self.scope())
    }

    /// Gets a typed collection bound to this transaction.
    pub fn typed_collection<D: Document>(&self) -> TypedCollection<'_, D> {
        TypedCollection::new(self.collection(D::collection_name()))
    }

    /// Returns the guard of this scope.
    pub fn guard(&self) -> &TransactionGuard {
        &self.guard
    }

    /// Returns `true` once the transaction has been committed, rolled back or dropped.
    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    /// Commits the transaction.
    ///
    /// The scope is closed when this returns; the completion resolves to the engine's
    /// answer.
    pub fn commit(&self) -> DocumentStoreResult<Completion<bool>> {
        self.close("commit", |engine| engine.commit())
    }

    /// Rolls the transaction back.
    pub fn rollback(&self) -> DocumentStoreResult<Completion<bool>> {
        self.close("rollback", |engine| engine.rollback())
    }

    fn close<F>(&self, operation: &'static str, action: F) -> DocumentStoreResult<Completion<bool>>
    where
        F: FnOnce(&mut dyn Engine) -> DocumentStoreResult<bool> + Send + 'static,
    {
        if !self.guard.close() {
            return Err(DocumentStoreError::TransactionClosed);
        }

        debug!(operation, "closing transaction");
        self.database.enqueue(None, operation, action)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.guard.close() {
            return;
        }

        warn!("transaction dropped while open, rolling back");
        if let Err(err) = self.database.enqueue(None, "rollback", rollback_abandoned) {
            debug!(error = %err, "rollback of dropped transaction not queued");
        }
    }
}

/// Rolls back a transaction nobody holds a scope for anymore.
///
/// Nobody awaits the outcome, so it is logged here on the worker.
pub(crate) fn rollback_abandoned(engine: &mut dyn Engine) -> DocumentStoreResult<bool> {
    let result = engine.rollback();

    match &result {
        Ok(true) => debug!("abandoned transaction rolled back"),
        Ok(false) => warn!("abandoned transaction was no longer open on the engine"),
        Err(err) => warn!(error = %err, "rollback of abandoned transaction failed"),
    }

    result
}
