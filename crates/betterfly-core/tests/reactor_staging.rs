//! Exercises the reactor's accept path against a real loopback socket,
//! independent of the persistence/storage/push gateways.

use std::net::TcpStream as StdStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use betterfly_core::reactor::Reactor;
use betterfly_core::registry::Registry;
use mio::Token;

#[test]
fn accepted_connection_lands_in_staging() {
    let mut reactor = Reactor::bind("127.0.0.1:0".parse().unwrap()).expect("bind reactor");
    let addr = reactor.local_addr().expect("reactor local addr");

    let registry = Registry::new();
    let (dispatch_tx, _dispatch_rx) = mpsc::channel::<Token>();
    let (init_tx, init_rx) = mpsc::channel();
    let (disc_tx, disc_rx) = mpsc::channel();
    let shutdown = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let _ = reactor.run(&registry, &dispatch_tx, &init_tx, &disc_tx, &shutdown);
        });

        let client = StdStream::connect(addr).expect("connect to reactor");

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if registry.snapshot_staged().len() == 1 {
                break;
            }
            assert!(Instant::now() < deadline, "connection never reached staging");
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(client);
        shutdown.store(true, Ordering::Relaxed);
    });

    drop(init_rx);
    drop(disc_rx);
}
