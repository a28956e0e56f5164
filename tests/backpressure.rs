// Scenario 3: a write larger than the kernel send buffer must leave
// its future pending until the peer reads, must not let a later,
// smaller write jump ahead of it, and both must eventually complete.
mod util;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use reactor_net::future::WriteFuture;
use reactor_net::handler::IoHandler;
use reactor_net::service::{IoServer, IoService};
use reactor_net::session::Session;

use util::{init, RawDecoder, RawEncoder};

const PAYLOAD_LEN: usize = 16 * 1024 * 1024;

struct BackpressureHandler {
    futures: Mutex<Option<(WriteFuture, WriteFuture)>>,
}

impl IoHandler for BackpressureHandler {
    type Message = Vec<u8>;

    fn message_received(&self, session: &Session<Vec<u8>>, message: Vec<u8>) {
        if message.as_slice() == b"go" {
            let large = session.write(vec![b'x'; PAYLOAD_LEN]);
            let small = session.write(b"done".to_vec());
            *self.futures.lock().unwrap() = Some((large, small));
        }
    }
}

#[test]
fn large_write_backpressures_and_drains_in_order() {
    init();

    let server = IoServer::<Vec<u8>>::new(1).unwrap();
    let handler = Arc::new(BackpressureHandler {
        futures: Mutex::new(None),
    });
    let addr = server
        .bind(
            "127.0.0.1:0".parse().unwrap(),
            handler.clone(),
            Vec::new(),
            || RawDecoder,
            RawEncoder,
        )
        .unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"go").unwrap();

    // Give the server a moment to queue both writes and attempt its
    // first flush before we check that the large one is still pending.
    thread::sleep(Duration::from_millis(200));

    let (large, small) = loop {
        if let Some(pair) = handler.futures.lock().unwrap().take() {
            break pair;
        }
        thread::sleep(Duration::from_millis(10));
    };

    assert!(!large.is_done(), "large write should still be backpressured");
    assert!(
        !small.is_done(),
        "a later write must not complete ahead of the still-pending one"
    );

    let mut total = 0usize;
    let mut buf = [0u8; 64 * 1024];
    let expected = PAYLOAD_LEN + b"done".len();
    while total < expected {
        let n = client.read(&mut buf).unwrap();
        assert!(n > 0, "peer closed before sending everything");
        total += n;
    }

    assert!(large.await_timeout(Duration::from_secs(5)));
    assert!(large.is_success());
    assert!(small.await_timeout(Duration::from_secs(5)));
    assert!(small.is_success());

    server.dispose();
}
