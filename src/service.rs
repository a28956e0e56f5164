//! The application-facing entry points: [`IoServer`] binds a listening
//! address and accepts inbound sessions, [`IoClient`] opens outbound
//! ones. Both are thin configuration + lifecycle wrappers around a
//! pool of [`SelectorProcessor`]s chosen by a [`SelectorStrategy`].

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use mio::net::{TcpListener, TcpStream};
use mio::Token;

use crate::codec::{ProtocolDecoder, ProtocolEncoder};
use crate::filter::{FilterChain, IoFilter};
use crate::future::ConnectFuture;
use crate::handler::IoHandler;
use crate::processor::{SelectorProcessor, ServiceHandles};
use crate::session::Session;
use crate::strategy::{RoundRobinStrategy, SelectorStrategy};

const DEFAULT_READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Shared lifecycle surface of [`IoServer`] and [`IoClient`]: the
/// processor pool they hand sessions off to and the strategy used to
/// spread load across it.
pub trait IoService {
    /// Message type carried by the sessions this service manages.
    type Message;

    /// Number of sessions currently open across the whole pool.
    fn managed_session_count(&self) -> usize;

    /// Snapshot of every session currently open across the pool, keyed
    /// by session id.
    fn managed_sessions(&self) -> HashMap<u64, Arc<Session<Self::Message>>>;

    /// Stops every processor in the pool. In-flight sessions are
    /// dropped, not drained; call this after closing sessions for an
    /// orderly shutdown.
    fn dispose(&self);
}

struct ProcessorPool<M> {
    processors: Vec<Arc<SelectorProcessor<M>>>,
    strategy: Arc<dyn SelectorStrategy>,
}

impl<M: Send + 'static> ProcessorPool<M> {
    fn new(size: usize, strategy: Arc<dyn SelectorStrategy>, name_prefix: &str) -> io::Result<Self> {
        let mut processors = Vec::with_capacity(size);
        for i in 0..size {
            processors.push(SelectorProcessor::spawn(format!("{name_prefix}-{i}"))?);
        }
        Ok(ProcessorPool { processors, strategy })
    }

    fn pick(&self) -> &Arc<SelectorProcessor<M>> {
        let loads: Vec<usize> = self.processors.iter().map(|p| p.session_count()).collect();
        let index = self.strategy.choose(&loads);
        &self.processors[index]
    }

    fn session_count(&self) -> usize {
        self.processors.iter().map(|p| p.session_count()).sum()
    }

    fn managed_sessions(&self) -> HashMap<u64, Arc<Session<M>>> {
        let mut out = HashMap::new();
        for processor in &self.processors {
            out.extend(processor.sessions());
        }
        out
    }

    fn dispose(&self) {
        for processor in &self.processors {
            processor.shutdown();
        }
    }
}

fn build_service_handles<M, D, E>(
    handler: Arc<dyn IoHandler<Message = M>>,
    filters: Vec<Arc<dyn IoFilter<M>>>,
    decoder_factory: impl Fn() -> D + Send + Sync + 'static,
    encoder: E,
    read_buffer_capacity: usize,
) -> Arc<ServiceHandles<M>>
where
    M: Send + 'static,
    D: ProtocolDecoder<Message = M> + 'static,
    E: ProtocolEncoder<Message = M> + 'static,
{
    let encoder = Arc::new(Mutex::new(encoder));
    let write_sink = Arc::new(
        move |session: &crate::session::Session<M>,
              message: M,
              completer: crate::future::Completer<crate::future::Done>| {
            let mut buf = BytesMut::new();
            encoder.lock().unwrap().encode(session, &message, &mut buf);
            session.queue_write(buf.freeze(), message, completer);
        },
    );

    let mut chain = FilterChain::new(handler, write_sink);
    for filter in filters {
        chain.add_last(filter);
    }

    Arc::new(ServiceHandles {
        filter_chain: Arc::new(chain),
        decoder_factory: Arc::new(move || Box::new(decoder_factory()) as Box<dyn ProtocolDecoder<Message = M>>),
        read_buffer_capacity,
    })
}

/// A bound listening service: accepts inbound TCP connections and
/// spreads them across a pool of processors.
pub struct IoServer<M> {
    pool: ProcessorPool<M>,
    read_buffer_capacity: AtomicUsize,
    disposed: AtomicBool,
    bound: Mutex<HashMap<SocketAddr, (Arc<SelectorProcessor<M>>, Token)>>,
}

impl<M: Send + 'static> IoServer<M> {
    /// `processor_count` is the size of the worker pool this server
    /// (and every address it binds) shares.
    pub fn new(processor_count: usize) -> io::Result<Self> {
        Self::with_strategy(processor_count, Arc::new(RoundRobinStrategy::new()))
    }

    pub fn with_strategy(
        processor_count: usize,
        strategy: Arc<dyn SelectorStrategy>,
    ) -> io::Result<Self> {
        Ok(IoServer {
            pool: ProcessorPool::new(processor_count, strategy, "reactor-server")?,
            read_buffer_capacity: AtomicUsize::new(DEFAULT_READ_BUFFER_CAPACITY),
            disposed: AtomicBool::new(false),
            bound: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_read_buffer_capacity(&self, capacity: usize) {
        self.read_buffer_capacity.store(capacity, Ordering::Relaxed);
    }

    /// Binds `addr` and begins accepting connections for it, dispatched
    /// to `handler` through `filters`, decoded by a fresh `decoder_factory()`
    /// instance per session and encoded by the shared `encoder`.
    #[allow(clippy::too_many_arguments)]
    pub fn bind<D, E>(
        &self,
        addr: SocketAddr,
        handler: Arc<dyn IoHandler<Message = M>>,
        filters: Vec<Arc<dyn IoFilter<M>>>,
        decoder_factory: impl Fn() -> D + Send + Sync + 'static,
        encoder: E,
    ) -> io::Result<SocketAddr>
    where
        D: ProtocolDecoder<Message = M> + 'static,
        E: ProtocolEncoder<Message = M> + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        let bound_addr = listener.local_addr()?;
        let service = build_service_handles(
            handler,
            filters,
            decoder_factory,
            encoder,
            self.read_buffer_capacity.load(Ordering::Relaxed),
        );
        let processor = self.pool.pick().clone();
        let token = processor.bind(listener, service)?;
        self.bound.lock().unwrap().insert(bound_addr, (processor, token));
        Ok(bound_addr)
    }

    /// Stops accepting new connections on `addr`. Sessions already
    /// accepted on it are unaffected. Silent if `addr` was never bound
    /// by this server (including a second `unbind` of the same address).
    pub fn unbind(&self, addr: SocketAddr) {
        if let Some((processor, token)) = self.bound.lock().unwrap().remove(&addr) {
            processor.unbind_token(token);
        }
    }
}

impl<M: Send + 'static> IoService for IoServer<M> {
    type Message = M;

    fn managed_session_count(&self) -> usize {
        self.pool.session_count()
    }

    fn managed_sessions(&self) -> HashMap<u64, Arc<Session<M>>> {
        self.pool.managed_sessions()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.pool.dispose();
        }
    }
}

/// Opens outbound TCP connections and spreads them across a pool of
/// processors.
pub struct IoClient<M> {
    pool: ProcessorPool<M>,
    disposed: AtomicBool,
    read_buffer_capacity: AtomicUsize,
}

impl<M: Send + 'static> IoClient<M> {
    pub fn new(processor_count: usize) -> io::Result<Self> {
        Self::with_strategy(processor_count, Arc::new(RoundRobinStrategy::new()))
    }

    pub fn with_strategy(
        processor_count: usize,
        strategy: Arc<dyn SelectorStrategy>,
    ) -> io::Result<Self> {
        Ok(IoClient {
            pool: ProcessorPool::new(processor_count, strategy, "reactor-client")?,
            disposed: AtomicBool::new(false),
            read_buffer_capacity: AtomicUsize::new(DEFAULT_READ_BUFFER_CAPACITY),
        })
    }

    pub fn set_read_buffer_capacity(&self, capacity: usize) {
        self.read_buffer_capacity.store(capacity, Ordering::Relaxed);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn connect<D, E>(
        &self,
        addr: SocketAddr,
        handler: Arc<dyn IoHandler<Message = M>>,
        filters: Vec<Arc<dyn IoFilter<M>>>,
        decoder_factory: impl Fn() -> D + Send + Sync + 'static,
        encoder: E,
    ) -> io::Result<ConnectFuture>
    where
        D: ProtocolDecoder<Message = M> + 'static,
        E: ProtocolEncoder<Message = M> + 'static,
    {
        let stream = TcpStream::connect(addr)?;
        let service = build_service_handles(
            handler,
            filters,
            decoder_factory,
            encoder,
            self.read_buffer_capacity.load(Ordering::Relaxed),
        );
        let processor = self.pool.pick();
        Ok(processor.connect(stream, service))
    }
}

impl<M: Send + 'static> IoService for IoClient<M> {
    type Message = M;

    fn managed_session_count(&self) -> usize {
        self.pool.session_count()
    }

    fn managed_sessions(&self) -> HashMap<u64, Arc<Session<M>>> {
        self.pool.managed_sessions()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.pool.dispose();
        }
    }
}
