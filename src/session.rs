//! A single accepted or connected socket and everything attached to it:
//! its write queue, its decoder state, its idle bookkeeping, and the
//! attribute map applications use to stash per-connection state.
//!
//! A `Session` is shared (`Arc`) between the worker thread that drives
//! it and whatever application threads hold a reference to write to it
//! or inspect its attributes; the fields a worker mutates without
//! synchronization (decoder, idle timestamps) are only ever touched by
//! that one thread, everything reachable from other threads goes
//! through `WriteQueue`, `AttributeMap`, or an atomic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use mio::Token;

use crate::attribute::AttributeMap;
use crate::codec::ProtocolDecoder;
use crate::error::Error;
use crate::filter::FilterChain;
use crate::future::{CloseFuture, Completer, Done, Future, WriteFuture};
use crate::handler::IdleKind;
use crate::processor::SelectorProcessor;
use crate::write_queue::{WriteQueue, WriteRequest};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One accepted or connected socket, keyed internally by the `mio`
/// registration `Token` the owning processor uses to find its raw
/// stream in its own connection table.
pub struct Session<M> {
    id: u64,
    token: Token,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    processor: Weak<SelectorProcessor<M>>,
    filter_chain: Arc<FilterChain<M>>,
    decoder: Mutex<Box<dyn ProtocolDecoder<Message = M>>>,
    write_queue: WriteQueue<M>,
    attributes: AttributeMap,
    connected: AtomicBool,
    closing: AtomicBool,
    last_read_millis: AtomicU64,
    last_write_millis: AtomicU64,
    reader_idle: Mutex<Option<Duration>>,
    writer_idle: Mutex<Option<Duration>>,
    reader_idle_fired: AtomicBool,
    writer_idle_fired: AtomicBool,
    epoch: Instant,
    close: (CloseFuture, Mutex<Option<Completer<Done>>>),
}

impl<M> Session<M> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        token: Token,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        processor: Weak<SelectorProcessor<M>>,
        filter_chain: Arc<FilterChain<M>>,
        decoder: Box<dyn ProtocolDecoder<Message = M>>,
    ) -> Arc<Self> {
        let (close_future, close_completer) = Future::pending();
        let epoch = Instant::now();
        Arc::new(Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            token,
            local_addr,
            remote_addr,
            processor,
            filter_chain,
            decoder: Mutex::new(decoder),
            write_queue: WriteQueue::new(),
            attributes: AttributeMap::new(),
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            last_read_millis: AtomicU64::new(0),
            last_write_millis: AtomicU64::new(0),
            reader_idle: Mutex::new(None),
            writer_idle: Mutex::new(None),
            reader_idle_fired: AtomicBool::new(false),
            writer_idle_fired: AtomicBool::new(false),
            epoch,
            close: (close_future, Mutex::new(Some(close_completer))),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn write_queue(&self) -> &WriteQueue<M> {
        &self.write_queue
    }

    pub(crate) fn decoder(&self) -> &Mutex<Box<dyn ProtocolDecoder<Message = M>>> {
        &self.decoder
    }

    pub(crate) fn filter_chain(&self) -> &Arc<FilterChain<M>> {
        &self.filter_chain
    }

    /// Passes `message` through the outbound filter chain, ultimately
    /// resulting in it being encoded and appended to the write queue.
    /// Returns immediately; await the returned future to observe
    /// completion. A filter may short-circuit the write (e.g. drop it
    /// because the session is closing) by completing or failing the
    /// completer itself instead of forwarding it.
    pub fn write(&self, message: M) -> WriteFuture {
        let (future, completer) = Future::pending();
        self.filter_chain.filter_write(self, message, completer);
        future
    }

    /// Appends already-encoded bytes directly to the write queue and
    /// wakes the owning processor to flush it. Called by the terminal
    /// write sink once a message has cleared every filter and been
    /// encoded (see `crate::service`). `message` is kept alongside the
    /// encoded bytes so it can be handed back to `messageSent` once the
    /// write fully drains.
    pub(crate) fn queue_write(&self, payload: Bytes, message: M, completer: Completer<Done>) {
        if self.is_closing() {
            completer.fail(Error::Lifecycle("write after close requested".into()));
            return;
        }
        self.write_queue
            .offer(WriteRequest::new(payload, message, completer));
        if let Some(processor) = self.processor.upgrade() {
            processor.request_flush(self.token);
        }
    }

    /// Reports an error encountered by application code (a filter or an
    /// `IoHandler` callback) through the exception path, the same way a
    /// socket-level I/O or decode failure would be. This is the
    /// explicit stand-in for "a handler throws": Rust has no exceptions,
    /// so a handler that hits an unrecoverable condition calls this
    /// instead of panicking. If `cause` is an I/O error the session is
    /// then closed, matching the same rule the processor applies to its
    /// own I/O failures.
    pub fn report_exception(&self, cause: Error) {
        let is_io = matches!(cause, Error::Io(_));
        self.filter_chain.fire_exception_caught(self, cause);
        if is_io {
            self.close(true);
        }
    }

    /// Requests the session be closed. `immediate = true` discards any
    /// writes still queued and tears the socket down right away;
    /// `immediate = false` lets the write queue already in flight drain
    /// first, and the returned future only resolves once that drain (or
    /// an immediate close requested afterward) has happened. Either way,
    /// no new writes are accepted once a close has been requested.
    pub fn close(&self, immediate: bool) -> CloseFuture {
        self.closing.store(true, Ordering::Release);
        if let Some(processor) = self.processor.upgrade() {
            processor.request_close(self.token, immediate);
        }
        self.close.0.clone()
    }

    /// Marks the session closed and resolves its close future. Called
    /// exactly once by the owning processor's worker thread.
    pub(crate) fn mark_closed(&self) {
        self.connected.store(false, Ordering::Release);
        self.write_queue
            .fail_all(|| Error::Lifecycle("session closed with writes still pending".into()));
        if let Some(completer) = self.close.1.lock().unwrap().take() {
            completer.succeed(Done);
        }
    }

    pub fn set_idle_time(&self, kind: IdleKind, threshold: Option<Duration>) {
        match kind {
            IdleKind::Reader => *self.reader_idle.lock().unwrap() = threshold,
            IdleKind::Writer => *self.writer_idle.lock().unwrap() = threshold,
            IdleKind::Both => {
                *self.reader_idle.lock().unwrap() = threshold;
                *self.writer_idle.lock().unwrap() = threshold;
            }
        }
    }

    pub(crate) fn mark_read(&self) {
        self.last_read_millis
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.reader_idle_fired.store(false, Ordering::Relaxed);
    }

    pub(crate) fn mark_written(&self) {
        self.last_write_millis
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.writer_idle_fired.store(false, Ordering::Relaxed);
    }

    /// Checks idle thresholds against the current time, returning which
    /// kind(s) just crossed their threshold for the first time since the
    /// last read/write, if any. Called once per sweep by the owning
    /// processor; does not refire on every sweep while a session stays
    /// quiet, only once per idle period (activity resets the latch).
    pub(crate) fn check_idle(&self) -> Option<IdleKind> {
        let now = self.epoch.elapsed();
        let reader_threshold = *self.reader_idle.lock().unwrap();
        let writer_threshold = *self.writer_idle.lock().unwrap();
        let last_read = Duration::from_millis(self.last_read_millis.load(Ordering::Relaxed));
        let last_write = Duration::from_millis(self.last_write_millis.load(Ordering::Relaxed));

        let reader_past = reader_threshold.is_some_and(|t| now.saturating_sub(last_read) >= t);
        let writer_past = writer_threshold.is_some_and(|t| now.saturating_sub(last_write) >= t);

        let reader_signal = reader_past && !self.reader_idle_fired.swap(true, Ordering::Relaxed);
        let writer_signal = writer_past && !self.writer_idle_fired.swap(true, Ordering::Relaxed);

        match (reader_signal, writer_signal) {
            (true, true) => Some(IdleKind::Both),
            (true, false) => Some(IdleKind::Reader),
            (false, true) => Some(IdleKind::Writer),
            (false, false) => None,
        }
    }
}
