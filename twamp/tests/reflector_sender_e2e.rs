//! End-to-end loopback scenarios against real UDP sockets, per §8's S1/S2 table.

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::Ordering;
use std::time::Duration;

use network_commons::socket::SocketOptions;
use network_commons::Strategy;
use twamp::padding::PadMix;
use twamp::reflector::{Configuration as ReflectorConfiguration, Reflector};
use twamp::sender::{Configuration as SenderConfiguration, Sender};

fn loopback_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn local_addr_of(fd: impl AsRawFd) -> SocketAddr {
    let mut storage: libc::sockaddr_storage = unsafe { core::mem::zeroed() };
    let mut len = core::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut storage as *mut _ as *mut libc::sockaddr,
            &mut len,
        );
    }
    network_commons::socket::storage_to_socket_addr(&storage).unwrap()
}

/// S1: a full-duration reflector against a 5-probe sender reports zero loss.
#[test]
fn full_round_trip_reports_zero_loss() {
    let socket = network_commons::udp_socket::TimestampedUdpSocket::bind(
        &loopback_addr(),
        &SocketOptions::default(),
    )
    .unwrap();
    let reflector_addr = local_addr_of(&socket);
    drop(socket);

    let mut reflector = Reflector::new(ReflectorConfiguration {
        bind_address: reflector_addr,
        socket_options: SocketOptions::default(),
        padmix: None,
        idle_timeout_secs: 30.0,
    });
    let running = reflector.running_handle();
    let handle = std::thread::spawn(move || reflector.execute());

    // give the reflector a moment to bind before the sender starts probing.
    std::thread::sleep(Duration::from_millis(50));

    let mut sender = Sender::new(SenderConfiguration {
        bind_address: loopback_addr(),
        remote_address: reflector_addr,
        socket_options: SocketOptions::default(),
        count: 5,
        interval: Duration::from_millis(20),
        padmix: PadMix::fixed(0),
    });
    let result = sender.execute().unwrap();

    running.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    assert_eq!(result.sent, 5);
    assert_eq!(result.received, 5);
}

/// S2: stopping the reflector partway through leaves the remaining probes
/// unanswered; the sender still reports the probes it actually sent.
#[test]
fn reflector_stopped_midway_yields_partial_loss() {
    let socket = network_commons::udp_socket::TimestampedUdpSocket::bind(
        &loopback_addr(),
        &SocketOptions::default(),
    )
    .unwrap();
    let reflector_addr = local_addr_of(&socket);
    drop(socket);

    let mut reflector = Reflector::new(ReflectorConfiguration {
        bind_address: reflector_addr,
        socket_options: SocketOptions::default(),
        padmix: None,
        idle_timeout_secs: 30.0,
    });
    let running = reflector.running_handle();
    let handle = std::thread::spawn(move || reflector.execute());

    std::thread::sleep(Duration::from_millis(50));

    // Stop the reflector well before the sender finishes its 5-probe run.
    let stopper = running.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(80));
        stopper.store(false, Ordering::SeqCst);
    });

    let mut sender = Sender::new(SenderConfiguration {
        bind_address: loopback_addr(),
        remote_address: reflector_addr,
        socket_options: SocketOptions::default(),
        count: 5,
        interval: Duration::from_millis(20),
        padmix: PadMix::fixed(0),
    });
    let result = sender.execute().unwrap();
    let _ = handle.join();

    assert_eq!(result.sent, 5);
    assert!(result.received < 5, "expected partial loss, got {}", result.received);
}
