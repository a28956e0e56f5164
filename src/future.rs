//! One-shot completion latches for `connect`, `write`, and `close`.
//!
//! These are blocking futures in the MINA/Netty `IoFuture` sense, not
//! `std::future::Future`s: `await()` parks the calling thread on a
//! condvar until the worker thread (or whichever side owns completion)
//! calls `complete`/`fail`. `session.write` itself never blocks; only a
//! caller that chooses to `await` the returned future does.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug)]
enum State<T> {
    Pending,
    Success(T),
    Failure(Arc<Error>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

/// A handle that a producer (worker thread, `Session::write`, ...) holds
/// to resolve a [`Future`]. Dropping the handle without completing it
/// fails the future, so a future can never hang forever because its
/// producer went away silently.
pub struct Completer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Completer<T> {
    pub fn succeed(self, value: T) {
        self.set(State::Success(value));
    }

    pub fn fail(self, cause: Error) {
        self.set(State::Failure(Arc::new(cause)));
    }

    fn set(self, state: State<T>) {
        let mut guard = self.inner.state.lock().unwrap();
        if matches!(*guard, State::Pending) {
            *guard = state;
            self.inner.condvar.notify_all();
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.state.lock().unwrap();
        if matches!(*guard, State::Pending) {
            *guard = State::Failure(Arc::new(Error::Lifecycle(
                "future's completer was dropped without completing it".into(),
            )));
            self.inner.condvar.notify_all();
        }
    }
}

/// A one-shot completion latch. Cloning shares the same underlying
/// state, so any clone observes completion.
#[derive(Clone)]
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Future<T> {
    /// Creates a pending future paired with the [`Completer`] used to
    /// resolve it.
    pub fn pending() -> (Future<T>, Completer<T>) {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::Pending),
            condvar: Condvar::new(),
        });
        (
            Future {
                inner: inner.clone(),
            },
            Completer { inner },
        )
    }

    /// Blocks the calling thread until the future completes.
    pub fn await_(&self) -> std::result::Result<T, Arc<Error>> {
        let mut guard = self.inner.state.lock().unwrap();
        loop {
            match &*guard {
                State::Pending => guard = self.inner.condvar.wait(guard).unwrap(),
                State::Success(v) => return Ok(v.clone()),
                State::Failure(e) => return Err(e.clone()),
            }
        }
    }

    /// Blocks up to `timeout`, returning `true` if the future completed
    /// within that window (regardless of success/failure).
    pub fn await_timeout(&self, timeout: Duration) -> bool {
        let guard = self.inner.state.lock().unwrap();
        if !matches!(*guard, State::Pending) {
            return true;
        }
        let (guard, result) = self
            .inner
            .condvar
            .wait_timeout_while(guard, timeout, |s| matches!(s, State::Pending))
            .unwrap();
        drop(guard);
        !result.timed_out()
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), State::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), State::Success(_))
    }

    /// The failure cause, if the future completed unsuccessfully.
    pub fn cause(&self) -> Option<Arc<Error>> {
        match &*self.inner.state.lock().unwrap() {
            State::Failure(e) => Some(e.clone()),
            _ => None,
        }
    }
}

/// Marker type for futures that carry no success payload, just
/// success/failure (e.g. [`CloseFuture`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Done;

pub type ConnectFuture = Future<Done>;
pub type WriteFuture = Future<Done>;
pub type CloseFuture = Future<Done>;
