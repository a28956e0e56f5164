// close(immediate = false) must let a write already queued (even one
// large enough to backpressure) fully drain to the peer before the
// session actually closes, unlike close(immediate = true) which
// discards pending writes outright.
mod util;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactor_net::handler::IoHandler;
use reactor_net::service::{IoServer, IoService};
use reactor_net::session::Session;

use util::{init, RawDecoder, RawEncoder};

const PAYLOAD_LEN: usize = 8 * 1024 * 1024;

struct GracefulCloser {
    tx: Mutex<Sender<&'static str>>,
}

impl IoHandler for GracefulCloser {
    type Message = Vec<u8>;

    fn message_received(&self, session: &Session<Vec<u8>>, _message: Vec<u8>) {
        let _ = session.write(vec![b'y'; PAYLOAD_LEN]);
        let _ = session.close(false);
    }

    fn session_closed(&self, _session: &Session<Vec<u8>>) {
        let _ = self.tx.lock().unwrap().send("CL");
    }
}

#[test]
fn drains_pending_write_before_closing() {
    init();

    let server = IoServer::<Vec<u8>>::new(1).unwrap();
    let (tx, rx) = mpsc::channel();
    let handler = Arc::new(GracefulCloser { tx: Mutex::new(tx) });
    let addr = server
        .bind(
            "127.0.0.1:0".parse().unwrap(),
            handler,
            Vec::new(),
            || RawDecoder,
            RawEncoder,
        )
        .unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"go").unwrap();

    // Let the server queue the write and the close request before we
    // start reading, so the close has to wait on a real drain.
    std::thread::sleep(Duration::from_millis(200));
    assert!(
        rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "session must not close before its pending write drains"
    );

    let mut total = 0usize;
    let mut buf = [0u8; 64 * 1024];
    while total < PAYLOAD_LEN {
        let n = client.read(&mut buf).unwrap();
        assert!(n > 0, "peer closed before sending everything");
        total += n;
    }
    assert_eq!(total, PAYLOAD_LEN);

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "CL");

    server.dispose();
}
