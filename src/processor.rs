//! `SelectorProcessor`: one dedicated worker thread driving one `mio`
//! selector, owning a set of listeners and connections and nothing
//! else. All registration, reads, writes, and lifecycle transitions for
//! the sessions it owns happen exclusively on that thread; every other
//! thread talks to it by pushing onto an intake queue and waking the
//! selector, never by touching the selector or a raw stream directly.

use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dashmap::DashMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::buffer::Buffer;
use crate::codec::ProtocolDecoder;
use crate::error::Error;
use crate::filter::FilterChain;
use crate::future::{Completer, ConnectFuture, Done, Future};
use crate::session::Session;

const WAKE_TOKEN: Token = Token(0);
const FIRST_DYNAMIC_TOKEN: usize = 1;
const READ_SCRATCH_LEN: usize = 16 * 1024;
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a bound or connected session needs that comes from its
/// owning service rather than from the processor itself: the filter
/// pipeline, and a factory for a fresh per-session decoder.
pub struct ServiceHandles<M> {
    pub filter_chain: Arc<FilterChain<M>>,
    pub decoder_factory: Arc<dyn Fn() -> Box<dyn ProtocolDecoder<Message = M>> + Send + Sync>,
    pub read_buffer_capacity: usize,
}

enum Intake<M> {
    Bind {
        listener: TcpListener,
        service: Arc<ServiceHandles<M>>,
        completer: Completer<Token>,
    },
    Unbind {
        token: Token,
    },
    Connect {
        stream: TcpStream,
        service: Arc<ServiceHandles<M>>,
        completer: Completer<Done>,
    },
    CloseSession {
        token: Token,
        immediate: bool,
    },
    Flush {
        token: Token,
    },
}

struct ListenerEntry<M> {
    listener: TcpListener,
    service: Arc<ServiceHandles<M>>,
}

struct ConnectingEntry<M> {
    stream: TcpStream,
    service: Arc<ServiceHandles<M>>,
    completer: Completer<Done>,
}

struct Connection<M> {
    stream: TcpStream,
    session: Arc<Session<M>>,
    read_buf: Buffer,
    writable_registered: bool,
    /// Set by a non-immediate close request received while the write
    /// queue was non-empty; the connection is torn down once the queue
    /// next fully drains instead of right away.
    pending_close: bool,
}

/// One selector-loop worker. Created via [`SelectorProcessor::spawn`];
/// every public method here is safe to call from any thread and merely
/// queues work for the worker to pick up on its next wake.
pub struct SelectorProcessor<M> {
    self_weak: Weak<SelectorProcessor<M>>,
    waker: mio::Waker,
    intake: Mutex<VecDeque<Intake<M>>>,
    running: AtomicBool,
    session_count: AtomicUsize,
    sessions: DashMap<u64, Arc<Session<M>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> SelectorProcessor<M> {
    pub fn spawn(name: impl Into<String>) -> io::Result<Arc<Self>> {
        let poll = Poll::new()?;
        let waker = mio::Waker::new(poll.registry(), WAKE_TOKEN)?;
        let processor = Arc::new_cyclic(|weak| SelectorProcessor {
            self_weak: weak.clone(),
            waker,
            intake: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            session_count: AtomicUsize::new(0),
            sessions: DashMap::new(),
            worker: Mutex::new(None),
        });

        let worker_processor = processor.clone();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || worker_processor.run(poll))?;
        *processor.worker.lock().unwrap() = Some(handle);
        Ok(processor)
    }

    /// Current number of sessions owned by this processor, used by
    /// `crate::strategy::SelectorStrategy` implementations.
    pub fn session_count(&self) -> usize {
        self.session_count.load(Ordering::Relaxed)
    }

    /// Snapshot of sessions currently owned by this processor, keyed by
    /// id. Safe to call from any thread; reflects the state as of
    /// whenever each entry was last inserted or removed on the worker
    /// thread, not a single consistent instant across all sessions.
    pub fn sessions(&self) -> HashMap<u64, Arc<Session<M>>> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Registers `listener` with this processor's selector and returns
    /// the token it was assigned, blocking until the worker thread has
    /// picked up the request. The token is only needed internally, to
    /// let [`crate::service::IoServer::unbind`] find the right listener
    /// again later.
    pub fn bind(&self, listener: TcpListener, service: Arc<ServiceHandles<M>>) -> io::Result<Token> {
        let (future, completer) = Future::pending();
        self.push(Intake::Bind {
            listener,
            service,
            completer,
        });
        future.await_().map_err(|cause| match &*cause {
            Error::Io(e) => io::Error::new(e.kind(), e.to_string()),
            other => io::Error::new(ErrorKind::Other, other.to_string()),
        })
    }

    pub(crate) fn unbind_token(&self, token: Token) {
        self.push(Intake::Unbind { token });
    }

    pub fn connect(&self, stream: TcpStream, service: Arc<ServiceHandles<M>>) -> ConnectFuture {
        let (future, completer) = Future::pending();
        self.push(Intake::Connect {
            stream,
            service,
            completer,
        });
        future
    }

    pub(crate) fn request_flush(&self, token: Token) {
        self.push(Intake::Flush { token });
    }

    /// `immediate`: discard any pending writes and tear down right away.
    /// Otherwise the connection is only torn down once its write queue
    /// (already in flight at the time of the request) fully drains.
    pub(crate) fn request_close(&self, token: Token, immediate: bool) {
        self.push(Intake::CloseSession { token, immediate });
    }

    /// Stops the worker after it finishes its current iteration. Does
    /// not wait for in-flight sessions to drain; callers that need an
    /// orderly shutdown should close every session first.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn push(&self, intake: Intake<M>) {
        self.intake.lock().unwrap().push_back(intake);
        let _ = self.waker.wake();
    }

    fn run(self: Arc<Self>, mut poll: Poll) {
        let mut events = Events::with_capacity(256);
        let mut listeners: HashMap<Token, ListenerEntry<M>> = HashMap::new();
        let mut connecting: HashMap<Token, ConnectingEntry<M>> = HashMap::new();
        let mut connections: HashMap<Token, Connection<M>> = HashMap::new();
        let mut next_token = FIRST_DYNAMIC_TOKEN;
        let mut last_sweep = std::time::Instant::now();

        while self.running.load(Ordering::Acquire) {
            self.drain_intake(
                &poll,
                &mut listeners,
                &mut connecting,
                &mut connections,
                &mut next_token,
            );

            if let Err(e) = poll.poll(&mut events, Some(SWEEP_INTERVAL)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                log::error!("selector poll failed: {e}");
                continue;
            }

            let mut to_close = Vec::new();

            for event in events.iter() {
                let token = event.token();
                if token == WAKE_TOKEN {
                    continue;
                }
                if listeners.contains_key(&token) {
                    self.accept_loop(&poll, &listeners, token, &mut connections, &mut next_token);
                    continue;
                }
                if connecting.contains_key(&token) {
                    self.finish_connect(&poll, &mut connecting, &mut connections, token);
                    continue;
                }
                if connections.contains_key(&token) {
                    let mut closed = false;
                    if event.is_readable() {
                        closed |= handle_readable(connections.get_mut(&token).expect("checked above"));
                    }
                    if !closed && event.is_writable() {
                        let outcome = flush_connection(connections.get_mut(&token).expect("checked above"));
                        closed |= self.sync_flush_outcome(&poll, connections, token, outcome);
                    }
                    if event.is_error() || event.is_read_closed() || event.is_write_closed() {
                        closed = true;
                    }
                    if closed {
                        to_close.push(token);
                    }
                }
            }

            for token in to_close {
                self.close_connection(&poll, &mut connections, token);
            }

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                sweep_idle(&connections);
                last_sweep = std::time::Instant::now();
            }
        }

        for (_, conn) in connections.drain() {
            finalize_decoder(&conn);
            conn.session.mark_closed();
            conn.session.filter_chain().fire_session_closed(&conn.session);
        }
        self.sessions.clear();
    }

    fn drain_intake(
        &self,
        poll: &Poll,
        listeners: &mut HashMap<Token, ListenerEntry<M>>,
        connecting: &mut HashMap<Token, ConnectingEntry<M>>,
        connections: &mut HashMap<Token, Connection<M>>,
        next_token: &mut usize,
    ) {
        let drained: Vec<Intake<M>> = {
            let mut guard = self.intake.lock().unwrap();
            guard.drain(..).collect()
        };

        for item in drained {
            match item {
                Intake::Bind {
                    mut listener,
                    service,
                    completer,
                } => {
                    let token = Token(*next_token);
                    *next_token += 1;
                    if let Err(e) = poll
                        .registry()
                        .register(&mut listener, token, Interest::READABLE)
                    {
                        log::error!("failed to register listener: {e}");
                        completer.fail(Error::Io(e));
                        continue;
                    }
                    listeners.insert(token, ListenerEntry { listener, service });
                    completer.succeed(token);
                }
                Intake::Unbind { token } => {
                    if let Some(mut entry) = listeners.remove(&token) {
                        let _ = poll.registry().deregister(&mut entry.listener);
                    }
                }
                Intake::Connect {
                    mut stream,
                    service,
                    completer,
                } => {
                    let token = Token(*next_token);
                    *next_token += 1;
                    if let Err(e) =
                        poll.registry()
                            .register(&mut stream, token, Interest::WRITABLE)
                    {
                        completer.fail(Error::Io(e));
                        continue;
                    }
                    connecting.insert(
                        token,
                        ConnectingEntry {
                            stream,
                            service,
                            completer,
                        },
                    );
                }
                Intake::CloseSession { token, immediate } => {
                    if immediate {
                        self.close_connection(poll, connections, token);
                    } else if let Some(conn) = connections.get_mut(&token) {
                        if conn.session.write_queue().is_empty() {
                            self.close_connection(poll, connections, token);
                        } else {
                            conn.pending_close = true;
                        }
                    }
                }
                Intake::Flush { token } => {
                    if connections.contains_key(&token) {
                        let outcome = flush_connection(connections.get_mut(&token).expect("checked above"));
                        if self.sync_flush_outcome(poll, connections, token, outcome) {
                            self.close_connection(poll, connections, token);
                        }
                    }
                }
            }
        }
    }

    fn accept_loop(
        &self,
        poll: &Poll,
        listeners: &HashMap<Token, ListenerEntry<M>>,
        token: Token,
        connections: &mut HashMap<Token, Connection<M>>,
        next_token: &mut usize,
    ) {
        let entry = listeners.get(&token).expect("checked by caller");
        loop {
            let (mut stream, remote_addr) = match entry.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    break;
                }
            };
            let local_addr = match stream.local_addr() {
                Ok(addr) => addr,
                Err(_) => continue,
            };
            let conn_token = Token(*next_token);
            *next_token += 1;
            if let Err(e) =
                poll.registry()
                    .register(&mut stream, conn_token, Interest::READABLE)
            {
                log::warn!("failed to register accepted connection: {e}");
                continue;
            }
            self.install_session(
                stream,
                local_addr,
                remote_addr,
                entry.service.clone(),
                conn_token,
                connections,
            );
        }
    }

    fn finish_connect(
        &self,
        poll: &Poll,
        connecting: &mut HashMap<Token, ConnectingEntry<M>>,
        connections: &mut HashMap<Token, Connection<M>>,
        token: Token,
    ) {
        let Some(mut entry) = connecting.remove(&token) else {
            return;
        };
        match entry.stream.take_error() {
            Ok(None) => {
                let local_addr = entry.stream.local_addr();
                let remote_addr = entry.stream.peer_addr();
                let (local_addr, remote_addr) = match (local_addr, remote_addr) {
                    (Ok(l), Ok(r)) => (l, r),
                    (Err(e), _) | (_, Err(e)) => {
                        entry.completer.fail(Error::Io(e));
                        let _ = poll.registry().deregister(&mut entry.stream);
                        return;
                    }
                };
                if let Err(e) = poll.registry().reregister(
                    &mut entry.stream,
                    token,
                    Interest::READABLE,
                ) {
                    entry.completer.fail(Error::Io(e));
                    return;
                }
                self.install_session(
                    entry.stream,
                    local_addr,
                    remote_addr,
                    entry.service,
                    token,
                    connections,
                );
                entry.completer.succeed(Done);
            }
            Ok(Some(e)) => {
                let _ = poll.registry().deregister(&mut entry.stream);
                entry.completer.fail(Error::Io(e));
            }
            Err(e) => {
                let _ = poll.registry().deregister(&mut entry.stream);
                entry.completer.fail(Error::Io(e));
            }
        }
    }

    fn install_session(
        &self,
        stream: TcpStream,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        service: Arc<ServiceHandles<M>>,
        token: Token,
        connections: &mut HashMap<Token, Connection<M>>,
    ) {
        let decoder = (service.decoder_factory)();
        let session = Session::new(
            token,
            local_addr,
            remote_addr,
            self.self_weak.clone(),
            service.filter_chain.clone(),
            decoder,
        );
        session.filter_chain().fire_session_created(&session);
        session.filter_chain().fire_session_opened(&session);
        self.session_count.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(session.id(), session.clone());
        connections.insert(
            token,
            Connection {
                stream,
                session,
                read_buf: Buffer::with_capacity(service.read_buffer_capacity),
                writable_registered: false,
                pending_close: false,
            },
        );
    }

    /// Reconciles a connection's registered `Interest` with the result
    /// of a flush attempt: a `Pending` outcome means the send buffer is
    /// full and we need `WRITABLE` readiness to retry, a `Drained`
    /// outcome means we can drop back to `READABLE` only so the
    /// selector doesn't keep waking us for no reason. Returns `true` if
    /// the connection should be torn down — either because of a write
    /// error or because a non-immediate close was waiting on this
    /// drain.
    fn sync_flush_outcome(
        &self,
        poll: &Poll,
        connections: &mut HashMap<Token, Connection<M>>,
        token: Token,
        outcome: FlushOutcome,
    ) -> bool {
        let Some(conn) = connections.get_mut(&token) else {
            return false;
        };
        match outcome {
            FlushOutcome::Closed => true,
            FlushOutcome::Pending => {
                if !conn.writable_registered {
                    let interest = Interest::READABLE | Interest::WRITABLE;
                    if let Err(e) = poll.registry().reregister(&mut conn.stream, token, interest) {
                        log::warn!("failed to register writable interest: {e}");
                    } else {
                        conn.writable_registered = true;
                    }
                }
                false
            }
            FlushOutcome::Drained => {
                if conn.writable_registered {
                    if let Err(e) =
                        poll.registry()
                            .reregister(&mut conn.stream, token, Interest::READABLE)
                    {
                        log::warn!("failed to drop writable interest: {e}");
                    } else {
                        conn.writable_registered = false;
                    }
                }
                conn.pending_close
            }
        }
    }

    fn close_connection(
        &self,
        poll: &Poll,
        connections: &mut HashMap<Token, Connection<M>>,
        token: Token,
    ) {
        if let Some(mut conn) = connections.remove(&token) {
            let _ = poll.registry().deregister(&mut conn.stream);
            finalize_decoder(&conn);
            conn.session.mark_closed();
            conn.session.filter_chain().fire_session_closed(&conn.session);
            self.sessions.remove(&conn.session.id());
            self.session_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Drives a session's decoder through `finish_decode` and `dispose` as
/// the connection is torn down, surfacing whatever trailing state (a
/// final message, or an error such as "unexpected end of input" for a
/// frame that was still mid-flight) the decoder has to give up. Called
/// exactly once per connection, regardless of which path led to the
/// close.
fn finalize_decoder<M: Send>(conn: &Connection<M>) {
    let mut out = Vec::new();
    let result = {
        let mut decoder = conn.session.decoder().lock().unwrap();
        let result = decoder.finish_decode(&conn.session, &mut out);
        decoder.dispose(&conn.session);
        result
    };
    match result {
        Ok(()) => {
            for message in out {
                conn.session
                    .filter_chain()
                    .fire_message_received(&conn.session, message);
            }
        }
        Err(e) => {
            conn.session
                .filter_chain()
                .fire_exception_caught(&conn.session, Error::Decode(e));
        }
    }
}

/// Reads everything currently available, decodes as many complete
/// messages as the bytes allow, and dispatches each through the
/// session's filter chain. Returns `true` if the peer closed the
/// connection (read returned `Ok(0)`) or a decode error occurred.
fn handle_readable<M: Send>(conn: &mut Connection<M>) -> bool {
    let mut scratch = [0u8; READ_SCRATCH_LEN];
    let mut peer_closed = false;
    loop {
        match conn.stream.read(&mut scratch) {
            Ok(0) => {
                peer_closed = true;
                break;
            }
            Ok(n) => {
                conn.read_buf.put_bytes(&scratch[..n]);
                if n < scratch.len() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                conn.session
                    .filter_chain()
                    .fire_exception_caught(&conn.session, Error::Io(e));
                peer_closed = true;
                break;
            }
        }
    }

    conn.read_buf.flip();
    let mut messages = Vec::new();
    let decode_result = {
        let mut decoder = conn.session.decoder().lock().unwrap();
        decoder.decode(&conn.session, &mut conn.read_buf, &mut messages)
    };
    conn.read_buf.compact();

    match decode_result {
        Ok(()) => {
            conn.session.mark_read();
            for message in messages {
                conn.session
                    .filter_chain()
                    .fire_message_received(&conn.session, message);
            }
            peer_closed
        }
        Err(e) => {
            conn.session
                .filter_chain()
                .fire_exception_caught(&conn.session, Error::Decode(e));
            true
        }
    }
}

/// Result of a single [`flush_connection`] attempt, telling the caller
/// whether it needs to register for writable readiness to be woken up
/// again once the kernel send buffer has room.
enum FlushOutcome {
    /// Write queue is empty; no writable interest needed.
    Drained,
    /// The socket's send buffer is full with data still queued; the
    /// caller must ensure `Interest::WRITABLE` is registered.
    Pending,
    /// A write error occurred; the connection should be torn down.
    Closed,
}

/// Drains as much of the session's write queue as the socket will
/// currently accept.
fn flush_connection<M>(conn: &mut Connection<M>) -> FlushOutcome {
    let session = conn.session.clone();
    let stream = &mut conn.stream;
    loop {
        enum Outcome {
            Empty,
            WouldBlock,
            Partial,
            Done,
            Error(io::Error),
        }

        let outcome = session.write_queue().peek_mut(|req| match stream.write(req.remaining()) {
            Ok(0) => Outcome::WouldBlock,
            Ok(n) => {
                req.advance(n);
                if req.is_fully_written() {
                    Outcome::Done
                } else {
                    Outcome::Partial
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Outcome::WouldBlock,
            Err(e) if e.kind() == ErrorKind::Interrupted => Outcome::Partial,
            Err(e) => Outcome::Error(e),
        });

        match outcome.unwrap_or(Outcome::Empty) {
            Outcome::Empty => return FlushOutcome::Drained,
            Outcome::WouldBlock => return FlushOutcome::Pending,
            Outcome::Partial => continue,
            Outcome::Done => {
                if let Some(req) = session.write_queue().remove() {
                    let message = req.complete_success();
                    session.filter_chain().fire_message_sent(&session, message);
                }
                session.mark_written();
                continue;
            }
            Outcome::Error(e) => {
                session
                    .filter_chain()
                    .fire_exception_caught(&session, Error::Io(e));
                return FlushOutcome::Closed;
            }
        }
    }
}

fn sweep_idle<M>(connections: &HashMap<Token, Connection<M>>) {
    for conn in connections.values() {
        if let Some(kind) = conn.session.check_idle() {
            conn.session.filter_chain().fire_session_idle(&conn.session, kind);
        }
    }
}
