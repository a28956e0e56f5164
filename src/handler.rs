//! The application callback interface: one `IoHandler` per service,
//! invoked by the owning `SelectorProcessor`'s worker thread for every
//! lifecycle and data event on every session it manages.
//!
//! Handlers are plain trait objects, not futures — a handler that needs
//! to do blocking work should hand it off to its own thread pool rather
//! than block the worker thread, exactly as the processor's own single
//! worker-per-instance model (see `crate::processor`) requires.

use crate::session::Session;

/// Which direction(s) of a session went idle, per the thresholds set
/// with `Session::set_idle_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleKind {
    Reader,
    Writer,
    Both,
}

/// Application-level reaction to the events a session's lifecycle
/// produces. `Message` is the decoded/encoded protocol type shared with
/// the session's `ProtocolDecoder`/`ProtocolEncoder`.
pub trait IoHandler: Send + Sync {
    type Message;

    /// The session has been allocated and registered with a processor,
    /// but `session_opened` has not yet fired — attributes may be
    /// seeded here before any data can arrive.
    fn session_created(&self, _session: &Session<Self::Message>) {}

    /// The session is registered for reads and ready to exchange data.
    fn session_opened(&self, _session: &Session<Self::Message>) {}

    /// The session has been fully torn down; no further events for it
    /// will be delivered.
    fn session_closed(&self, _session: &Session<Self::Message>) {}

    /// Fired when a session crosses one of its configured idle
    /// thresholds. Does not repeat until activity resets the timer.
    fn session_idle(&self, _session: &Session<Self::Message>, _kind: IdleKind) {}

    /// A complete protocol message was decoded from the session's input
    /// stream.
    fn message_received(&self, _session: &Session<Self::Message>, _message: Self::Message) {}

    /// A previously-queued message finished being written to the
    /// socket.
    fn message_sent(&self, _session: &Session<Self::Message>, _message: Self::Message) {}

    /// An error occurred while processing this session — a decode
    /// failure, a filter that returned `Err`, or an I/O error on the
    /// socket. The session is closed immediately after this callback
    /// returns.
    fn exception_caught(&self, _session: &Session<Self::Message>, _cause: &crate::error::Error) {}
}
