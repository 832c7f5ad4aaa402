//! Runs a reflector and a sender against each other over loopback and prints
//! the resulting statistics summary. Build and run with
//! `cargo run -p twamp --example twamp_example`.

use std::net::SocketAddr;
use std::time::Duration;

use network_commons::socket::SocketOptions;
use network_commons::Strategy;
use twamp::padding::PadMix;
use twamp::reflector::{Configuration as ReflectorConfiguration, Reflector};
use twamp::sender::{Configuration as SenderConfiguration, Sender};

fn main() {
    env_logger::init();

    let reflector_addr: SocketAddr = "127.0.0.1:22862".parse().unwrap();

    let mut reflector = Reflector::new(ReflectorConfiguration {
        bind_address: reflector_addr,
        socket_options: SocketOptions::default(),
        padmix: None,
        idle_timeout_secs: twamp::session::IDLE_RESET_SECS,
    });
    let reflector_running = reflector.running_handle();

    let handle = std::thread::spawn(move || reflector.execute());

    let mut sender = Sender::new(SenderConfiguration {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        remote_address: reflector_addr,
        socket_options: SocketOptions::default(),
        count: 20,
        interval: Duration::from_millis(100),
        padmix: PadMix::default_v4(),
    });

    match sender.execute() {
        Ok(result) => println!("{}", result.summary),
        Err(e) => eprintln!("sender failed: {}", e),
    }

    reflector_running.store(false, std::sync::atomic::Ordering::SeqCst);
    let _ = handle.join();
}
