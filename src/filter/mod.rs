//! The bidirectional filter pipeline sessions pass I/O events through
//! before (inbound) and after (outbound) the application's
//! [`IoHandler`](crate::handler::IoHandler).
//!
//! Each [`IoFilter`] decides, per event, whether to pass the event
//! further down the chain (by calling the [`NextFilter`] it's handed),
//! transform it first, short-circuit it, or swallow it entirely.
//! Inbound events (`session_opened`, `message_received`, ...) run
//! filters in registration order before reaching the handler; the
//! outbound `filter_write` event runs in reverse order on the way out
//! to the socket, mirroring how a request is wrapped and a response is
//! unwrapped. A write's `Completer` travels alongside its message so a
//! filter that drops or fails a write can resolve the caller's future
//! itself instead of forwarding it.

use std::sync::Arc;

use crate::error::Error;
use crate::future::{Completer, Done};
use crate::handler::{IdleKind, IoHandler};
use crate::session::Session;

/// One stage of the pipeline. Default methods simply forward to `next`
/// unchanged, so a filter only needs to override the events it cares
/// about.
pub trait IoFilter<M>: Send + Sync {
    fn session_created(&self, session: &Session<M>, next: &NextFilter<M>) {
        next.session_created(session);
    }

    fn session_opened(&self, session: &Session<M>, next: &NextFilter<M>) {
        next.session_opened(session);
    }

    fn session_closed(&self, session: &Session<M>, next: &NextFilter<M>) {
        next.session_closed(session);
    }

    fn session_idle(&self, session: &Session<M>, kind: IdleKind, next: &NextFilter<M>) {
        next.session_idle(session, kind);
    }

    fn message_received(&self, session: &Session<M>, message: M, next: &NextFilter<M>) {
        next.message_received(session, message);
    }

    fn message_sent(&self, session: &Session<M>, message: M, next: &NextFilter<M>) {
        next.message_sent(session, message);
    }

    fn exception_caught(&self, session: &Session<M>, cause: Error, next: &NextFilter<M>) {
        next.exception_caught(session, cause);
    }

    /// Runs on the way **out**: a message queued via `Session::write`
    /// passes through filters in reverse registration order before
    /// reaching the wire. `completer` resolves the future `write`
    /// returned to its caller.
    fn filter_write(
        &self,
        session: &Session<M>,
        message: M,
        completer: Completer<Done>,
        next: &NextFilter<M>,
    ) {
        next.filter_write(session, message, completer);
    }
}

/// The continuation an [`IoFilter`] calls to forward an event past
/// itself. Wraps either the remaining suffix of the chain or, once the
/// suffix is empty, the terminal handler (inbound events) or the
/// encode-and-queue sink (the outbound `filter_write` event).
pub struct NextFilter<'a, M> {
    rest: &'a [Arc<dyn IoFilter<M>>],
    handler: &'a dyn IoHandler<Message = M>,
    write_sink: &'a (dyn Fn(&Session<M>, M, Completer<Done>) + Send + Sync),
}

impl<'a, M> NextFilter<'a, M> {
    fn advance(&self) -> NextFilter<'a, M> {
        NextFilter {
            rest: &self.rest[1..],
            handler: self.handler,
            write_sink: self.write_sink,
        }
    }

    pub fn session_created(&self, session: &Session<M>) {
        match self.rest.first() {
            Some(f) => f.session_created(session, &self.advance()),
            None => self.handler.session_created(session),
        }
    }

    pub fn session_opened(&self, session: &Session<M>) {
        match self.rest.first() {
            Some(f) => f.session_opened(session, &self.advance()),
            None => self.handler.session_opened(session),
        }
    }

    pub fn session_closed(&self, session: &Session<M>) {
        match self.rest.first() {
            Some(f) => f.session_closed(session, &self.advance()),
            None => self.handler.session_closed(session),
        }
    }

    pub fn session_idle(&self, session: &Session<M>, kind: IdleKind) {
        match self.rest.first() {
            Some(f) => f.session_idle(session, kind, &self.advance()),
            None => self.handler.session_idle(session, kind),
        }
    }

    pub fn message_received(&self, session: &Session<M>, message: M) {
        match self.rest.first() {
            Some(f) => f.message_received(session, message, &self.advance()),
            None => self.handler.message_received(session, message),
        }
    }

    pub fn message_sent(&self, session: &Session<M>, message: M) {
        match self.rest.first() {
            Some(f) => f.message_sent(session, message, &self.advance()),
            None => self.handler.message_sent(session, message),
        }
    }

    pub fn exception_caught(&self, session: &Session<M>, cause: Error) {
        match self.rest.first() {
            Some(f) => f.exception_caught(session, cause, &self.advance()),
            None => self.handler.exception_caught(session, &cause),
        }
    }

    pub fn filter_write(&self, session: &Session<M>, message: M, completer: Completer<Done>) {
        match self.rest.first() {
            Some(f) => f.filter_write(session, message, completer, &self.advance()),
            None => (self.write_sink)(session, message, completer),
        }
    }
}

/// An ordered, bidirectional pipeline of [`IoFilter`]s sitting in front
/// of one [`IoHandler`]. Built once when a service is configured and
/// shared (via `Arc`) by every session the service manages.
pub struct FilterChain<M> {
    filters: Vec<Arc<dyn IoFilter<M>>>,
    handler: Arc<dyn IoHandler<Message = M>>,
    write_sink: Arc<dyn Fn(&Session<M>, M, Completer<Done>) + Send + Sync>,
}

impl<M> FilterChain<M> {
    /// `write_sink` is the terminal action for an outbound message once
    /// every filter has had a chance to see it — typically "encode with
    /// the service's `ProtocolEncoder` and push onto the session's raw
    /// write queue" (see `crate::service`).
    pub fn new(
        handler: Arc<dyn IoHandler<Message = M>>,
        write_sink: Arc<dyn Fn(&Session<M>, M, Completer<Done>) + Send + Sync>,
    ) -> Self {
        FilterChain {
            filters: Vec::new(),
            handler,
            write_sink,
        }
    }

    /// Appends a filter to the end of the chain (closest to the
    /// handler on the inbound path, outermost on the outbound path).
    pub fn add_last(&mut self, filter: Arc<dyn IoFilter<M>>) {
        self.filters.push(filter);
    }

    fn head(&self) -> NextFilter<'_, M> {
        NextFilter {
            rest: &self.filters,
            handler: self.handler.as_ref(),
            write_sink: self.write_sink.as_ref(),
        }
    }

    pub fn fire_session_created(&self, session: &Session<M>) {
        self.head().session_created(session);
    }

    pub fn fire_session_opened(&self, session: &Session<M>) {
        self.head().session_opened(session);
    }

    pub fn fire_session_closed(&self, session: &Session<M>) {
        self.head().session_closed(session);
    }

    pub fn fire_session_idle(&self, session: &Session<M>, kind: IdleKind) {
        self.head().session_idle(session, kind);
    }

    pub fn fire_message_received(&self, session: &Session<M>, message: M) {
        self.head().message_received(session, message);
    }

    pub fn fire_message_sent(&self, session: &Session<M>, message: M) {
        self.head().message_sent(session, message);
    }

    pub fn fire_exception_caught(&self, session: &Session<M>, cause: Error) {
        self.head().exception_caught(session, cause);
    }

    /// Entry point for the outbound path: walks the chain in reverse
    /// registration order (last-added filter sees the message first on
    /// its way out), ending at the write sink.
    pub fn filter_write(&self, session: &Session<M>, message: M, completer: Completer<Done>) {
        let mut rest: Vec<Arc<dyn IoFilter<M>>> = self.filters.clone();
        rest.reverse();
        let next = NextFilter {
            rest: &rest,
            handler: self.handler.as_ref(),
            write_sink: self.write_sink.as_ref(),
        };
        next.filter_write(session, message, completer);
    }
}
