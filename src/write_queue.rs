//! Per-session FIFO of pending outbound payloads, drained by the owning
//! [`crate::processor::SelectorProcessor`] on writability.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;

use crate::future::{Completer, WriteFuture};

/// A single queued write: the encoded payload, the original message
/// (handed back to `messageSent` once fully drained), and the future
/// the caller of `Session::write` is holding.
pub struct WriteRequest<M> {
    payload: Bytes,
    written: usize,
    message: Option<M>,
    completer: Option<Completer<crate::future::Done>>,
}

impl<M> WriteRequest<M> {
    pub fn new(payload: Bytes, message: M, completer: Completer<crate::future::Done>) -> Self {
        WriteRequest {
            payload,
            written: 0,
            message: Some(message),
            completer: Some(completer),
        }
    }

    /// The bytes not yet written to the socket.
    pub fn remaining(&self) -> &[u8] {
        &self.payload[self.written..]
    }

    pub fn is_fully_written(&self) -> bool {
        self.written >= self.payload.len()
    }

    /// Records that `n` more bytes were accepted by the socket.
    pub fn advance(&mut self, n: usize) {
        self.written += n;
    }

    /// Completes the write-future successfully and hands back the
    /// original message, so the caller can fire `messageSent`. Must only
    /// be called once [`is_fully_written`] is true.
    pub fn complete_success(mut self) -> M {
        if let Some(completer) = self.completer.take() {
            completer.succeed(crate::future::Done);
        }
        self.message.take().expect("message set at construction")
    }

    /// Completes the write-future with a failure, e.g. because the
    /// session closed before this request could be drained.
    pub fn complete_failure(mut self, cause: crate::error::Error) {
        if let Some(completer) = self.completer.take() {
            completer.fail(cause);
        }
    }
}

/// A thread-safe FIFO. Producers (any thread calling `Session::write`)
/// call [`offer`](WriteQueue::offer); the owning processor's worker
/// thread is the sole consumer, via [`peek_mut`](WriteQueue::peek_mut) /
/// [`remove`](WriteQueue::remove).
pub struct WriteQueue<M> {
    requests: Mutex<VecDeque<WriteRequest<M>>>,
}

impl<M> Default for WriteQueue<M> {
    fn default() -> Self {
        WriteQueue {
            requests: Mutex::new(VecDeque::new()),
        }
    }
}

impl<M> WriteQueue<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request to the tail of the queue. Safe to call from any
    /// thread.
    pub fn offer(&self, request: WriteRequest<M>) {
        self.requests.lock().unwrap().push_back(request);
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().unwrap().is_empty()
    }

    /// Runs `f` against a mutable reference to the head request, without
    /// removing it. Returns `None` if the queue is empty.
    pub fn peek_mut<R>(&self, f: impl FnOnce(&mut WriteRequest<M>) -> R) -> Option<R> {
        let mut guard = self.requests.lock().unwrap();
        guard.front_mut().map(f)
    }

    /// Drops the head request, if any, returning it to the caller so it
    /// can be completed (success or failure).
    pub fn remove(&self) -> Option<WriteRequest<M>> {
        self.requests.lock().unwrap().pop_front()
    }

    /// Drains every queued request, failing each future with `cause`.
    /// Used when a session closes with writes still pending.
    pub fn fail_all(&self, cause_factory: impl Fn() -> crate::error::Error) {
        let mut guard = self.requests.lock().unwrap();
        while let Some(request) = guard.pop_front() {
            request.complete_failure(cause_factory());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Future;

    #[test]
    fn fifo_order_preserved() {
        let queue = WriteQueue::new();
        let (fut_a, completer_a) = Future::pending();
        let (fut_b, completer_b) = Future::pending();
        queue.offer(WriteRequest::new(Bytes::from_static(b"a"), "a", completer_a));
        queue.offer(WriteRequest::new(Bytes::from_static(b"b"), "b", completer_b));

        let first = queue.remove().unwrap();
        assert_eq!(first.remaining(), b"a");
        assert_eq!(first.complete_success(), "a");
        assert!(fut_a.is_success());
        assert!(!fut_b.is_done());

        let second = queue.remove().unwrap();
        assert_eq!(second.remaining(), b"b");
        assert_eq!(second.complete_success(), "b");
        assert!(fut_b.is_success());
        assert!(queue.is_empty());
    }

    #[test]
    fn fail_all_completes_every_future() {
        let queue: WriteQueue<&str> = WriteQueue::new();
        let (fut, completer) = Future::pending();
        queue.offer(WriteRequest::new(Bytes::from_static(b"x"), "x", completer));
        queue.fail_all(|| crate::error::Error::Lifecycle("session closed".into()));
        assert!(fut.is_done());
        assert!(!fut.is_success());
    }
}
