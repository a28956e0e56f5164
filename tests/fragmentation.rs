// Scenario 4: a length-prefixed decoder fed one byte per socket write
// must still produce exactly the right messages, in order, end to end
// through a real socket (the decoder substrate's own fragmentation
// invariant is unit-tested in `codec::state`; this exercises the same
// decoder behind an actual `SelectorProcessor` read loop).
mod util;

use std::io::Write;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use std::time::Duration;

use bytes::BytesMut;
use reactor_net::codec::{
    DecodingState, DecodingStateMachine, FixedLengthDecodingState, ProtocolEncoder,
    StateMachineDecoder, Uint32DecodingState,
};
use reactor_net::handler::IoHandler;
use reactor_net::service::{IoServer, IoService};
use reactor_net::session::Session;

use util::init;

struct LengthPrefixedEncoder;

impl ProtocolEncoder for LengthPrefixedEncoder {
    type Message = Vec<u8>;

    fn encode(&mut self, _session: &Session<Vec<u8>>, message: &Vec<u8>, out: &mut BytesMut) {
        out.extend_from_slice(&(message.len() as u32).to_be_bytes());
        out.extend_from_slice(message);
    }
}

fn length_prefixed_machine() -> DecodingStateMachine<Vec<u8>> {
    DecodingStateMachine::new(
        || {
            Box::new(Uint32DecodingState::big_endian(|len, out| {
                out.push(len.to_be_bytes().to_vec());
                Ok(Some(Box::new(FixedLengthDecodingState::new(
                    len as usize,
                    |body, out| {
                        out.push(body);
                        Ok(None)
                    },
                )) as Box<dyn DecodingState<Item = Vec<u8>>>))
            }))
        },
        |mut children, out| {
            let body = children.pop().expect("body product");
            out.push(body);
            Ok(())
        },
    )
}

struct CollectingHandler {
    tx: Mutex<mpsc::Sender<Vec<u8>>>,
}

impl CollectingHandler {
    fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        (CollectingHandler { tx: Mutex::new(tx) }, rx)
    }
}

impl IoHandler for CollectingHandler {
    type Message = Vec<u8>;

    fn message_received(&self, _session: &Session<Vec<u8>>, message: Vec<u8>) {
        let _ = self.tx.lock().unwrap().send(message);
    }
}

#[test]
fn byte_at_a_time_stream_decodes_to_two_frames() {
    init();

    let server = IoServer::<Vec<u8>>::new(1).unwrap();
    let (handler, rx) = CollectingHandler::new();
    let addr = server
        .bind(
            "127.0.0.1:0".parse().unwrap(),
            std::sync::Arc::new(handler),
            Vec::new(),
            || StateMachineDecoder::new(length_prefixed_machine()),
            LengthPrefixedEncoder,
        )
        .unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    let stream: &[u8] = &[
        0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o', 0, 0, 0, 3, b'a', b'b', b'c',
    ];
    for byte in stream {
        client.write_all(&[*byte]).unwrap();
    }

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first, b"hello");
    assert_eq!(second, b"abc");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    server.dispose();
}
