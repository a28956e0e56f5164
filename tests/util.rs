// Shared helpers for the functional scenario tests. Mirrors the split
// in the teacher's own test suite between a `tests/util/mod.rs` grab
// bag and per-scenario test files that build on it.
#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::BytesMut;
use reactor_net::buffer::Buffer;
use reactor_net::codec::{ProtocolDecoder, ProtocolEncoder};
use reactor_net::error::Error;
use reactor_net::handler::{IdleKind, IoHandler};
use reactor_net::session::Session;
use reactor_net::DecodeError;

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

/// A decoder that treats every readable chunk as one message, with no
/// framing of its own. Good enough for tests that only care about byte
/// payloads, not message boundaries.
pub struct RawDecoder;

impl ProtocolDecoder for RawDecoder {
    type Message = Vec<u8>;

    fn decode(
        &mut self,
        _session: &Session<Vec<u8>>,
        input: &mut Buffer,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<(), DecodeError> {
        if input.has_remaining() {
            let mut body = vec![0u8; input.remaining()];
            input.get_bytes(&mut body);
            out.push(body);
        }
        Ok(())
    }
}

pub struct RawEncoder;

impl ProtocolEncoder for RawEncoder {
    type Message = Vec<u8>;

    fn encode(&mut self, _session: &Session<Vec<u8>>, message: &Vec<u8>, out: &mut BytesMut) {
        out.extend_from_slice(message);
    }
}

/// Appends a two-letter code per lifecycle event it sees, matching the
/// event-trace scenarios: `CR`eated, `OP`ened, `RE`ceived, `SE`nt,
/// `CL`osed, `EX`ception. `echo` writes every received message back;
/// `close_after_receive` closes the session immediately after the
/// first `messageReceived`.
pub struct CodeHandler {
    tx: Mutex<Sender<&'static str>>,
    echo: bool,
    close_after_receive: bool,
}

impl CodeHandler {
    pub fn new(echo: bool, close_after_receive: bool) -> (Arc<Self>, Receiver<&'static str>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(CodeHandler {
                tx: Mutex::new(tx),
                echo,
                close_after_receive,
            }),
            rx,
        )
    }

    fn emit(&self, code: &'static str) {
        let _ = self.tx.lock().unwrap().send(code);
    }
}

impl IoHandler for CodeHandler {
    type Message = Vec<u8>;

    fn session_created(&self, _session: &Session<Vec<u8>>) {
        self.emit("CR");
    }

    fn session_opened(&self, _session: &Session<Vec<u8>>) {
        self.emit("OP");
    }

    fn session_closed(&self, _session: &Session<Vec<u8>>) {
        self.emit("CL");
    }

    fn message_received(&self, session: &Session<Vec<u8>>, message: Vec<u8>) {
        self.emit("RE");
        if self.echo {
            let _ = session.write(message);
        }
        if self.close_after_receive {
            let _ = session.close(false);
        }
    }

    fn message_sent(&self, _session: &Session<Vec<u8>>, _message: Vec<u8>) {
        self.emit("SE");
    }

    fn session_idle(&self, _session: &Session<Vec<u8>>, _kind: IdleKind) {
        self.emit("ID");
    }

    fn exception_caught(&self, _session: &Session<Vec<u8>>, _cause: &Error) {
        self.emit("EX");
    }
}

/// Collects codes off `rx` until none arrive within `timeout`,
/// concatenating them in receipt order.
pub fn drain_codes(rx: &Receiver<&'static str>, timeout: Duration) -> String {
    let mut trace = String::new();
    while let Ok(code) = rx.recv_timeout(timeout) {
        trace.push_str(code);
    }
    trace
}
