use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{MofkaError, Result};

struct State<T> {
    slot: Mutex<Option<Result<T>>>,
    notify: Notify,
}

/// The writable half of a one-shot Promise/Future pair.
///
/// A Promise is fulfilled at most once, from whichever suspension
/// point produced its value — a producer's sender task resolving
/// pushed EventIDs, a consumer's feed handler delivering an Event, or
/// any pipeline stage that needs to hand a result back to a caller
/// that has already moved on.
pub struct Promise<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Promise<T> {
    /// Fulfil the promise with a value.
    pub fn set_value(&self, value: T) {
        self.set(Ok(value));
    }

    /// Fulfil the promise with an error; the matching Future's `wait`
    /// returns this error.
    pub fn set_error(&self, err: MofkaError) {
        self.set(Err(err));
    }

    fn set(&self, result: Result<T>) {
        *self.state.slot.lock() = Some(result);
        self.state.notify.notify_waiters();
    }
}

/// The readable half of a one-shot Promise/Future pair.
///
/// Exposes the two operations spec.md §5 requires of every future:
/// `completed()` (non-blocking test) and `wait()` (suspend until
/// ready). Cancelling a Future before it completes does not cancel
/// whatever is producing its value — see spec.md §5 "Cancellation &
/// timeouts".
///
/// `wait()` clones the resolved value out of the slot rather than
/// taking it, so it may be called more than once (and from more than
/// one caller) once the Promise has been fulfilled — it does not
/// consume the future the way `Promise::set_value` consumes the
/// Promise.
pub struct Future<T> {
    state: Arc<State<T>>,
}

impl<T> Future<T> {
    /// Non-blocking check for whether a value is ready, without
    /// consuming it.
    pub fn completed(&self) -> bool {
        self.state.slot.lock().is_some()
    }

    /// Alias for `completed()`, matching spec.md's "test" vocabulary.
    pub fn test(&self) -> bool {
        self.completed()
    }
}

impl<T: Clone> Future<T> {
    /// Suspend the calling task until the value is ready, then return
    /// a clone of it (or the error the Promise was resolved with).
    /// Safe to call repeatedly: unlike a take-once slot, a second
    /// `wait()` after resolution returns immediately instead of
    /// blocking forever.
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.state.notify.notified();
            if let Some(result) = self.state.slot.lock().clone() {
                return result;
            }
            notified.await;
        }
    }
}

/// Create a fresh Promise/Future pair, analogous to
/// `Promise<Type>::CreateFutureAndPromise` in the reference
/// implementation.
pub fn new_promise_future<T>() -> (Promise<T>, Future<T>) {
    let state = Arc::new(State {
        slot: Mutex::new(None),
        notify: Notify::new(),
    });
    (
        Promise {
            state: state.clone(),
        },
        Future { state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_value_set_before_wait() {
        let (promise, future) = new_promise_future::<u64>();
        promise.set_value(42);
        assert!(future.completed());
        assert_eq!(future.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn wait_suspends_until_value_is_set() {
        let (promise, future) = new_promise_future::<u64>();
        assert!(!future.completed());
        let handle = tokio::spawn(async move { future.wait().await });
        tokio::task::yield_now().await;
        promise.set_value(7);
        assert_eq!(handle.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn wait_propagates_error() {
        let (promise, future) = new_promise_future::<u64>();
        promise.set_error(MofkaError::Closed);
        let err = future.wait().await.unwrap_err();
        assert!(matches!(err, MofkaError::Closed));
    }

    #[tokio::test]
    async fn wait_can_be_called_more_than_once() {
        let (promise, future) = new_promise_future::<u64>();
        promise.set_value(11);
        assert_eq!(future.wait().await.unwrap(), 11);
        assert_eq!(future.wait().await.unwrap(), 11);
    }
}
