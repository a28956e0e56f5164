// unbind(addr) stops new connections from being accepted on that
// address without disturbing sessions already accepted on it, and is
// silent (idempotent) if called again or on an address never bound.
mod util;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use reactor_net::service::{IoServer, IoService};

use util::{init, CodeHandler, RawDecoder, RawEncoder};

#[test]
fn stops_new_accepts_without_disturbing_existing_sessions() {
    init();

    let server = IoServer::<Vec<u8>>::new(1).unwrap();
    let (handler, rx) = CodeHandler::new(true, false);
    let addr = server
        .bind(
            "127.0.0.1:0".parse().unwrap(),
            handler,
            Vec::new(),
            || RawDecoder,
            RawEncoder,
        )
        .unwrap();

    let mut first = TcpStream::connect(addr).unwrap();
    first.write_all(b"before").unwrap();
    let mut buf = [0u8; 6];
    first.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"before");

    server.unbind(addr);
    server.unbind(addr); // idempotent: second call on the same addr is a no-op
    server.unbind("127.0.0.1:1".parse().unwrap()); // never bound: silent

    // The already-accepted connection keeps working after unbind.
    first.write_all(b"after!").unwrap();
    let mut buf = [0u8; 6];
    first.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"after!");
    drop(first);

    // Give the worker a moment to drain the unbind request before
    // probing; deregistration is asynchronous like every other
    // lifecycle operation in this crate.
    std::thread::sleep(Duration::from_millis(200));

    // A fresh connect attempt either fails outright or the peer closes
    // immediately, depending on how quickly the OS notices nothing is
    // listening after deregistration; either way no bytes come back.
    if let Ok(mut second) = TcpStream::connect(addr) {
        second.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        let mut probe = [0u8; 1];
        let _ = second.write_all(b"x");
        let n = second.read(&mut probe).unwrap_or(0);
        assert_eq!(n, 0, "no service should be listening after unbind");
    }

    let _ = rx.recv_timeout(Duration::from_secs(1));

    server.dispose();
}
