//! Single-assignment completion handles.
//!
//! Every dispatched operation owns a [`Completer`] and hands the matching
//! [`Completion`] to its caller. The completer is consumed by `resolve`, `reject`
//! or `complete`, so a result can be set at most once; the type system rules out a
//! second assignment instead of a runtime check.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::sync::oneshot;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Creates a connected completer/completion pair.
pub fn channel<T>() -> (Completer<T>, Completion<T>) {
    let (sender, receiver) = oneshot::channel();
    (Completer { sender }, Completion { receiver })
}

/// Write side of a completion, held by the worker.
#[derive(Debug)]
pub struct Completer<T> {
    sender: oneshot::Sender<DocumentStoreResult<T>>,
}

impl<T> Completer<T> {
    /// Fulfills the completion with a value.
    pub fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    /// Rejects the completion with an error.
    pub fn reject(self, error: DocumentStoreError) {
        self.complete(Err(error));
    }

    /// Sets the completion's outcome.
    ///
    /// An outcome nobody awaits anymore is discarded; the operation itself still ran.
    pub fn complete(self, result: DocumentStoreResult<T>) {
        let _ = self.sender.send(result);
    }

    /// Returns `true` once the caller has dropped its [`Completion`].
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Read side of a completion: a future yielding the operation's outcome.
///
/// Awaiting suspends only the awaiting task. Dropping a completion does not cancel the
/// operation; it still executes in queue order and its outcome is discarded.
///
/// Completions are `'static` and can be moved into spawned tasks or raced against a
/// timer to build timeouts above the dispatch layer.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited; the operation runs regardless"]
pub struct Completion<T> {
    receiver: oneshot::Receiver<DocumentStoreResult<T>>,
}

impl<T> Completion<T> {
    /// Returns the outcome if it is already available, without waiting.
    pub fn try_take(&mut self) -> Option<DocumentStoreResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DocumentStoreError::Abandoned)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = DocumentStoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.receiver).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(DocumentStoreError::Abandoned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolved_value_is_delivered() {
        let (completer, completion) = channel();
        completer.resolve(42);

        assert_eq!(completion.await, Ok(42));
    }

    #[tokio::test]
    async fn rejection_keeps_error_kind() {
        let (completer, completion) = channel::<()>();
        completer.reject(DocumentStoreError::CollectionNotFound("users".into()));

        assert_eq!(
            completion.await,
            Err(DocumentStoreError::CollectionNotFound("users".into()))
        );
    }

    #[tokio::test]
    async fn dropped_completer_is_abandoned() {
        let (completer, completion) = channel::<u8>();
        drop(completer);

        assert_eq!(completion.await, Err(DocumentStoreError::Abandoned));
    }

    #[test]
    fn try_take_reports_pending_then_ready() {
        let (completer, mut completion) = channel();
        assert!(completion.try_take().is_none());

        completer.resolve("done");
        assert_eq!(completion.try_take(), Some(Ok("done")));
    }

    #[test]
    fn completer_sees_dropped_completion() {
        let (completer, completion) = channel::<()>();
        assert!(!completer.is_abandoned());

        drop(completion);
        assert!(completer.is_abandoned());
    }
}
