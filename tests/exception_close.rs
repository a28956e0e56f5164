// Scenario 6: a handler that reports an I/O-classified error on its
// first messageReceived must see exactly one exceptionCaught, then
// exactly one sessionClosed.
mod util;

use std::io::Write;
use std::net::TcpStream;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactor_net::error::Error;
use reactor_net::handler::IoHandler;
use reactor_net::service::{IoServer, IoService};
use reactor_net::session::Session;

use util::{init, RawDecoder, RawEncoder};

struct FailOnReceive {
    tx: Mutex<Sender<&'static str>>,
}

impl IoHandler for FailOnReceive {
    type Message = Vec<u8>;

    fn message_received(&self, session: &Session<Vec<u8>>, _message: Vec<u8>) {
        session.report_exception(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated handler failure",
        )));
    }

    fn exception_caught(&self, _session: &Session<Vec<u8>>, _cause: &Error) {
        let _ = self.tx.lock().unwrap().send("EX");
    }

    fn session_closed(&self, _session: &Session<Vec<u8>>) {
        let _ = self.tx.lock().unwrap().send("CL");
    }
}

#[test]
fn exception_then_close_each_fire_once() {
    init();

    let server = IoServer::<Vec<u8>>::new(1).unwrap();
    let (tx, rx) = mpsc::channel();
    let handler = Arc::new(FailOnReceive { tx: Mutex::new(tx) });
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
    client.write_all(b"trigger").unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "EX");
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "CL");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    server.dispose();
}
