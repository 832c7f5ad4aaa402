//! Session Sender: emits scheduled timestamped probes to a Reflector peer and
//! streams replies into a statistics accumulator (§4.5).

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use network_commons::{
    error::CommonError,
    socket::{Socket, SocketOptions},
    stats::{StatisticsAccumulator, Summary},
    time::{now, NtpTimestamp},
    udp_socket::TimestampedUdpSocket,
    Strategy, TestResult,
};

use crate::message::{ErrorEstimate, ReflectedMessage, SenderMessage};
use crate::padding::PadMix;

/// Reply-wait grace period once the last probe is sent, per §5.
const REPLY_GRACE_SECS: f64 = 5.0;
/// Jumbo-frame-safe receive buffer, per §4.3.
const RECV_BUFFER_LEN: usize = 9216;
/// Minimum bytes a reply must carry to be parsed, per §6: "minimum reply size 42 B"
/// (38-byte reply header + nothing); shorter frames are dropped per §4.5.
const MIN_REPLY_LEN: usize = 36;
/// Upper bound on how long a single scheduling-loop iteration sleeps while waiting
/// for the next probe slot or for trailing replies.
const MAX_POLL_QUANTUM: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Configuration {
    pub bind_address: SocketAddr,
    pub remote_address: SocketAddr,
    pub socket_options: SocketOptions,
    /// `N` in §4.5's scheduling loop.
    pub count: u32,
    /// `interval` in §4.5's scheduling loop.
    pub interval: Duration,
    pub padmix: PadMix,
}

pub struct Sender {
    configuration: Configuration,
    running: Arc<AtomicBool>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SenderResult {
    pub peer: SocketAddr,
    pub sent: u32,
    pub received: u64,
    pub summary: String,
}

impl TestResult for SenderResult {}

impl Sender {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clone of the flag the owning process's signal handler should flip to
    /// request a graceful shutdown (§5's "Cancellation").
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Parses one reply and feeds its delays into `stats`, per §4.5's delay formulas.
    fn ingest_reply(stats: &mut StatisticsAccumulator, bytes: &[u8], t4: f64) -> Option<u32> {
        let (reply, _consumed) = match ReflectedMessage::try_from_be_bytes(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("malformed reply: {}", e);
                return None;
            }
        };

        let t1 = reply.sender_timestamp.as_seconds();
        let t2 = reply.receive_timestamp.as_seconds();
        let t3 = reply.send_timestamp.as_seconds();

        let outbound = (1000.0 * (t2 - t1)).max(0.0);
        let inbound = (1000.0 * (t4 - t3)).max(0.0);
        let round_trip = (1000.0 * (t4 - t1 + t2 - t3)).max(0.0);

        stats.add(
            round_trip,
            outbound,
            inbound,
            reply.reflector_sequence_number,
            reply.sender_sequence_number,
        );

        Some(reply.sender_sequence_number)
    }
}

impl Strategy<SenderResult, CommonError> for Sender {
    fn execute(&mut self) -> Result<SenderResult, CommonError> {
        let socket =
            TimestampedUdpSocket::bind(&self.configuration.bind_address, &self.configuration.socket_options)?;
        socket.set_fcntl_options()?;
        log::info!(
            "sender {} -> {}",
            self.configuration.bind_address,
            self.configuration.remote_address
        );

        let count = self.configuration.count;
        let interval = self.configuration.interval.as_secs_f64();
        let start = now();
        let end_time = start + count as f64 * interval + REPLY_GRACE_SECS;

        let mut stats = StatisticsAccumulator::new();
        let mut idx: u32 = 0;
        let mut schedule = start;
        let mut buffer = vec![0u8; RECV_BUFFER_LEN];
        let mut last_reply_marks_done = false;

        while self.running.load(Ordering::Relaxed) {
            // 1. Drain all immediately available replies.
            loop {
                match socket.receive_from(&mut buffer) {
                    Ok((len, peer, _ts)) => {
                        let t4 = now();
                        if len < MIN_REPLY_LEN {
                            log::warn!("dropping {}-byte reply from {} (too short)", len, peer);
                            continue;
                        }
                        if let Some(sseq) = Self::ingest_reply(&mut stats, &buffer[..len], t4) {
                            if sseq + 1 == count {
                                last_reply_marks_done = true;
                            }
                        }
                    }
                    Err(CommonError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        log::warn!("recv error: {}", e);
                        break;
                    }
                }
            }

            let t = now();
            if t >= schedule && idx < count {
                let probe = SenderMessage::new(
                    idx,
                    NtpTimestamp::from_seconds(t),
                    ErrorEstimate::sender_default(),
                    vec![0u8; self.configuration.padmix.sample()],
                );
                if let Err(e) = socket.send_to(&self.configuration.remote_address, probe) {
                    log::warn!("send_to {} failed: {}", self.configuration.remote_address, e);
                }
                schedule += interval;
                idx += 1;
            }

            if idx >= count && (last_reply_marks_done || stats.count() as u32 >= count) {
                break;
            }
            if t > end_time {
                break;
            }

            let next_wake = if idx < count {
                (schedule - t).max(0.0)
            } else {
                MAX_POLL_QUANTUM.as_secs_f64()
            };
            std::thread::sleep(Duration::from_secs_f64(next_wake).min(MAX_POLL_QUANTUM));
        }

        let summary: Summary = stats.summary(count as u64);
        println!("{}", summary);

        Ok(SenderResult {
            peer: self.configuration.remote_address,
            sent: idx,
            received: stats.count(),
            summary: summary.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use network_commons::udp_socket::TimestampedUdpSocket;

    /// End-to-end loopback scenario S1: a real reflector thread and a real sender
    /// running the scheduling loop against it, no mocking.
    #[test]
    fn loopback_sender_against_a_manual_reflector_reports_zero_loss() {
        let reflector_socket = TimestampedUdpSocket::bind(
            &"127.0.0.1:0".parse().unwrap(),
            &SocketOptions::default(),
        )
        .unwrap();
        let reflector_addr = {
            let mut storage: libc::sockaddr_storage = unsafe { core::mem::zeroed() };
            let mut len = core::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            unsafe {
                libc::getsockname(
                    reflector_socket.as_raw_fd(),
                    &mut storage as *mut _ as *mut libc::sockaddr,
                    &mut len,
                );
            }
            network_commons::socket::storage_to_socket_addr(&storage).unwrap()
        };

        let handle = std::thread::spawn(move || {
            let mut sessions = crate::session::ReflectorSessionTable::new();
            let mut buf = [0u8; 9216];
            for _ in 0..5 {
                let (len, peer, _ts) = reflector_socket.receive_from(&mut buf).unwrap();
                let t2 = now();
                let (probe, _) = SenderMessage::try_from_be_bytes(&buf[..len]).unwrap();
                let accepted = sessions.accept(peer, probe.sequence_number, t2);
                let reply = ReflectedMessage::new(
                    accepted.rseq,
                    NtpTimestamp::from_seconds(t2),
                    NtpTimestamp::from_seconds(t2),
                    probe.sequence_number,
                    probe.timestamp,
                    probe.error_estimate,
                    vec![],
                );
                reflector_socket.send_to(&peer, reply).unwrap();
            }
        });

        let mut sender = Sender::new(Configuration {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            remote_address: reflector_addr,
            socket_options: SocketOptions::default(),
            count: 5,
            interval: Duration::from_millis(20),
            padmix: PadMix::fixed(0),
        });

        let result = sender.execute().unwrap();
        handle.join().unwrap();

        assert_eq!(result.sent, 5);
        assert_eq!(result.received, 5);
    }
}
