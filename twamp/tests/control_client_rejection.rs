//! S6: a Control-Client must fail fast when the server's Greeting doesn't
//! advertise unauthenticated mode.

use std::io::Write;
use std::net::TcpListener;

use bebytes::BeBytes;
use network_commons::socket::SocketOptions;
use twamp::control::ControlClient;
use twamp::message::{Modes, ServerGreeting};

#[test]
fn connect_rejects_a_server_that_does_not_offer_unauthenticated_mode() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let (mut stream, _peer) = listener.accept().unwrap();
        let greeting = ServerGreeting {
            unused: [0; 12],
            modes: Modes { bits: 0 },
            challenge: [0; 16],
            salt: [0; 16],
            count: 0,
            mbz: [0; 12],
        };
        stream.write_all(&greeting.to_be_bytes()).unwrap();
    });

    let result = ControlClient::connect(addr, &SocketOptions::default());
    server.join().unwrap();

    assert!(result.is_err());
}
