//! TWAMP Control-Client: drives the TCP handshake described in §4.7, taking a
//! connection through `IDLE -> GREETED -> READY -> ACTIVE` and back.

use std::net::{IpAddr, SocketAddr};

use bebytes::BeBytes;
use network_commons::{
    error::CommonError,
    socket::{Socket, SocketOptions},
    tcp_socket::TimestampedTcpSocket,
    time::NtpTimestamp,
};

use crate::message::{
    AcceptFields, AcceptSessionMessage, ClientSetupResponse, Mode, RequestTwSession,
    RequestTwSessionBuilder, ServerGreeting, ServerStart, StartAckMessage, StartSessionsMessage,
    StopSessionsMessage,
};

const SERVER_GREETING_LEN: usize = 64;
const CLIENT_SETUP_RESPONSE_LEN: usize = 164;
const SERVER_START_LEN: usize = 48;
const REQUEST_TW_SESSION_LEN: usize = 112;
const ACCEPT_SESSION_LEN: usize = 48;
const START_SESSIONS_LEN: usize = 32;
const START_ACK_LEN: usize = 32;
const STOP_SESSIONS_LEN: usize = 32;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ControlState {
    Idle,
    Greeted,
    Ready,
    Active,
}

/// The ports the server agreed to run the negotiated session on.
#[derive(Debug, Clone, Copy)]
pub struct NegotiatedSession {
    pub sender_port: u16,
    pub receiver_port: u16,
}

pub struct ControlClient {
    socket: TimestampedTcpSocket,
    state: ControlState,
    session_count: u32,
}

impl ControlClient {
    /// Connects to `server` and drives the handshake through `IDLE -> GREETED -> READY`
    /// in one call, per §4.7's state table.
    pub fn connect(server: SocketAddr, socket_options: &SocketOptions) -> Result<Self, CommonError> {
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
            SocketAddr::V6(_) => "[::]:0".parse().unwrap(),
        };
        let mut socket = TimestampedTcpSocket::bind(&local)?;
        socket.connect(server, socket_options)?;

        let mut client = Self {
            socket,
            state: ControlState::Idle,
            session_count: 0,
        };

        let greeting = client.read_server_greeting()?;
        client.state = ControlState::Greeted;

        if !greeting.modes.is_set(Mode::Unauthenticated) {
            return Err(CommonError::ProtocolReject(
                "server does not offer unauthenticated mode".into(),
            ));
        }

        client.socket.send(ClientSetupResponse::unauthenticated())?;

        let start = client.read_server_start()?;
        if start.accept != AcceptFields::Ok {
            return Err(CommonError::ProtocolReject(format!(
                "server rejected setup: {:?}",
                start.accept
            )));
        }
        client.state = ControlState::Ready;

        Ok(client)
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Sends Request-TW-Session and waits for Accept-Session, per RFC 5357 §3.5/§3.6.
    #[allow(clippy::too_many_arguments)]
    pub fn request_session(
        &mut self,
        sender_address: Option<IpAddr>,
        receiver_address: Option<IpAddr>,
        sender_port: u16,
        receiver_port: u16,
        num_packets: u32,
        padding_length: u32,
        type_p: u32,
    ) -> Result<NegotiatedSession, CommonError> {
        if self.state != ControlState::Ready {
            return Err(CommonError::ProtocolReject(
                "request_session requires the READY state".into(),
            ));
        }

        let ipvn = match (sender_address, receiver_address) {
            (Some(IpAddr::V6(_)), _) | (_, Some(IpAddr::V6(_))) => 6,
            _ => 4,
        };

        let request: RequestTwSession = RequestTwSessionBuilder::new()
            .ipvn(ipvn)
            .num_packets(num_packets)
            .sender_port(sender_port)
            .receiver_port(receiver_port)
            .sender_address(sender_address)
            .receiver_address(receiver_address)
            .padding_length(padding_length)
            .start_time(NtpTimestamp::now())
            .type_p(type_p)
            .build()?;

        self.socket.send(request)?;

        let mut buf = [0u8; ACCEPT_SESSION_LEN];
        self.recv_exact(&mut buf)?;
        let (accept, _) = AcceptSessionMessage::try_from_be_bytes(&buf)
            .map_err(|e| CommonError::ShortFrame(e.to_string()))?;

        if accept.accept != AcceptFields::Ok {
            return Err(CommonError::ProtocolReject(format!(
                "session request rejected: {:?}",
                accept.accept
            )));
        }

        self.session_count += 1;

        Ok(NegotiatedSession {
            sender_port,
            receiver_port: accept.port,
        })
    }

    /// Sends Start-Sessions and waits for Start-Ack, transitioning to `ACTIVE`.
    pub fn start_sessions(&mut self) -> Result<(), CommonError> {
        if self.state != ControlState::Ready {
            return Err(CommonError::ProtocolReject(
                "start_sessions requires the READY state".into(),
            ));
        }

        self.socket.send(StartSessionsMessage::new())?;

        let mut buf = [0u8; START_ACK_LEN];
        self.recv_exact(&mut buf)?;
        let (ack, _) = StartAckMessage::try_from_be_bytes(&buf)
            .map_err(|e| CommonError::ShortFrame(e.to_string()))?;

        if ack.accept != AcceptFields::Ok {
            return Err(CommonError::ProtocolReject(format!(
                "start-sessions rejected: {:?}",
                ack.accept
            )));
        }

        self.state = ControlState::Active;
        Ok(())
    }

    /// Sends Stop-Sessions for every negotiated session and returns to `READY`.
    pub fn stop_sessions(&mut self) -> Result<(), CommonError> {
        if self.state != ControlState::Active {
            return Err(CommonError::ProtocolReject(
                "stop_sessions requires the ACTIVE state".into(),
            ));
        }

        self.socket.send(StopSessionsMessage::new(self.session_count))?;
        self.session_count = 0;
        self.state = ControlState::Ready;
        Ok(())
    }

    fn read_server_greeting(&mut self) -> Result<ServerGreeting, CommonError> {
        let mut buf = [0u8; SERVER_GREETING_LEN];
        self.recv_exact(&mut buf)?;
        let (greeting, _) =
            ServerGreeting::try_from_be_bytes(&buf).map_err(|e| CommonError::ShortFrame(e.to_string()))?;
        Ok(greeting)
    }

    fn read_server_start(&mut self) -> Result<ServerStart, CommonError> {
        let mut buf = [0u8; SERVER_START_LEN];
        self.recv_exact(&mut buf)?;
        let (start, _) =
            ServerStart::try_from_be_bytes(&buf).map_err(|e| CommonError::ShortFrame(e.to_string()))?;
        Ok(start)
    }

    /// TCP gives no framing guarantee; loop until `buf` is completely filled.
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), CommonError> {
        let mut filled = 0;
        while filled < buf.len() {
            let (n, _ts) = self.socket.receive(&mut buf[filled..])?;
            if n == 0 {
                return Err(CommonError::ShortFrame("peer closed the connection".into()));
            }
            filled += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A placeholder size sanity check: reconfirms the fixed-frame byte counts this
    /// module's `recv_exact` calls are built around, since `bebytes` enum variants
    /// always encode to exactly one byte.
    #[test]
    fn fixed_frame_constants_match_struct_layouts() {
        assert_eq!(SERVER_GREETING_LEN, 12 + 4 + 16 + 16 + 4 + 12);
        assert_eq!(CLIENT_SETUP_RESPONSE_LEN, 4 + 80 + 64 + 16);
        assert_eq!(SERVER_START_LEN, 15 + 1 + 16 + 8 + 8);
        assert_eq!(
            REQUEST_TW_SESSION_LEN,
            1 + 1 + 1 + 1 + 4 + 4 + 2 + 2 + 16 + 16 + 16 + 4 + 8 + 8 + 4 + 8 + 16
        );
        assert_eq!(ACCEPT_SESSION_LEN, 1 + 1 + 2 + 16 + 12 + 16);
        assert_eq!(START_SESSIONS_LEN, 1 + 31);
        assert_eq!(START_ACK_LEN, 1 + 15 + 16);
        assert_eq!(STOP_SESSIONS_LEN, 1 + 1 + 2 + 4 + 24);
    }
}
