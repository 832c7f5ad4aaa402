//! Session Reflector: a per-peer reflection state machine that echoes a
//! timestamped reply for every probe it receives (§4.4).

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bebytes::BeBytes;
use network_commons::{
    error::CommonError,
    socket::SocketOptions,
    time::{now, NtpTimestamp},
    udp_socket::TimestampedUdpSocket,
    Strategy, TestResult,
};

use crate::message::{ErrorEstimate, ReflectedMessage, SenderMessage};
use crate::padding::PadMix;
use crate::session::{ReflectorSessionTable, IDLE_RESET_SECS};

/// Jumbo-frame-safe receive buffer, per §4.3.
const RECV_BUFFER_LEN: usize = 9216;
/// Minimum bytes a probe must carry before it's worth reflecting (§6: "Minimum request size 14 B").
const MIN_PROBE_LEN: usize = 14;
/// Reap the session table every this many accepted packets rather than on every one.
const REAP_INTERVAL: u64 = 256;
/// `recv` wakes up at least this often so the loop can observe `running` going false
/// without needing the signal handler to close the socket out from under it.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sets `SO_RCVTIMEO` so a blocking `recvmsg` returns `WouldBlock`/`TimedOut`
/// periodically instead of sleeping forever, per §9's cancellation note.
fn set_recv_timeout(fd: RawFd, timeout: Duration) -> Result<(), CommonError> {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(CommonError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub bind_address: SocketAddr,
    pub socket_options: SocketOptions,
    /// When set, every reply draws a fresh padding size from this mix instead of
    /// reusing the peer's symmetric-size cache (§4.4 step 4's "Alternatively").
    pub padmix: Option<PadMix>,
    /// Idle-reset window for the session table, in seconds; defaults to the §5
    /// constant but can be overridden via the `reflector` subcommand's `--timer`.
    pub idle_timeout_secs: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".parse().unwrap(),
            socket_options: SocketOptions::default(),
            padmix: None,
            idle_timeout_secs: IDLE_RESET_SECS,
        }
    }
}

pub struct Reflector {
    configuration: Configuration,
    running: Arc<AtomicBool>,
}

#[derive(Debug, Default, Clone)]
pub struct ReflectorResult {
    pub packets_reflected: u64,
}

impl TestResult for ReflectorResult {}

impl Reflector {
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

    fn reflect_one(
        socket: &TimestampedUdpSocket,
        sessions: &mut ReflectorSessionTable,
        padmix: &Option<PadMix>,
        buffer: &mut [u8],
    ) -> Result<(), CommonError> {
        use network_commons::socket::Socket;

        let (len, peer, _recv_ts) = socket.receive_from(buffer)?;
        if len < MIN_PROBE_LEN {
            log::warn!("dropping {}-byte probe from {} (too short)", len, peer);
            return Ok(());
        }

        let t2 = now();
        let (probe, _consumed) = SenderMessage::try_from_be_bytes(&buffer[..len])
            .map_err(|e| CommonError::ShortFrame(e.to_string()))?;

        let accepted = sessions.accept(peer, probe.sequence_number, t2);

        let padding_len = match padmix {
            Some(mix) => mix.sample(),
            None => sessions.padding_for(peer, len),
        };

        let reply = ReflectedMessage::new(
            accepted.rseq,
            NtpTimestamp::from_seconds(t2),
            NtpTimestamp::from_seconds(t2),
            probe.sequence_number,
            probe.timestamp,
            probe.error_estimate,
            vec![0u8; padding_len],
        );

        if let Err(e) = socket.send_to(&peer, reply) {
            log::warn!("send_to {} failed: {}", peer, e);
        }

        Ok(())
    }
}

impl Strategy<ReflectorResult, CommonError> for Reflector {
    fn execute(&mut self) -> Result<ReflectorResult, CommonError> {
        let socket =
            TimestampedUdpSocket::bind(&self.configuration.bind_address, &self.configuration.socket_options)?;
        set_recv_timeout(socket.as_raw_fd(), RECV_POLL_INTERVAL)?;
        log::info!("reflector listening on {}", self.configuration.bind_address);

        let mut sessions = ReflectorSessionTable::with_idle_timeout(self.configuration.idle_timeout_secs);
        let mut buffer = vec![0u8; RECV_BUFFER_LEN];
        let mut reflected = 0u64;

        while self.running.load(Ordering::Relaxed) {
            match Self::reflect_one(&socket, &mut sessions, &self.configuration.padmix, &mut buffer) {
                Ok(()) => reflected += 1,
                Err(CommonError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // recv timed out; loop back and recheck `running`.
                }
                Err(CommonError::Io(e)) if e.raw_os_error() == Some(libc::EBADF) => break,
                Err(e) => log::warn!("reflector loop error: {}", e),
            }

            if reflected % REAP_INTERVAL == 0 {
                sessions.reap_stale(now());
            }
        }

        Ok(ReflectorResult {
            packets_reflected: reflected,
        })
    }
}
