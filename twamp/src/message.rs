//! Wire-format structs for the TWAMP-Light UDP test packets (RFC 5357 §4.1/§4.2,
//! unauthenticated mode) and the TCP control-channel handshake (RFC 5357 §3.5).
//!
//! Field widths and ordering follow the byte layouts fixed by the protocol; see
//! the module-level comment on [`ReflectedMessage`] for the one place where the
//! receive/send timestamp slots needed disambiguating.

use bebytes::BeBytes;
use network_commons::{error::CommonError, time::NtpTimestamp};
use std::net::IpAddr;
use std::ops::BitAnd;

/// Estimation on the error on a timestamp based on synchronization method used,
/// per [RFC4656 §4.1.2](https://www.rfc-editor.org/rfc/rfc4656#section-4.1.2).
#[derive(BeBytes, Debug, PartialEq, Eq, Clone, Copy)]
pub struct ErrorEstimate {
    #[U8(size(1), pos(0))]
    pub s_bit: u8,
    #[U8(size(1), pos(1))]
    pub z_bit: u8,
    #[U8(size(6), pos(2))]
    pub scale: u8,
    pub multiplier: u8,
}

impl ErrorEstimate {
    pub fn new(s_bit: u8, z_bit: u8, scale: u8, multiplier: u8) -> Result<Self, CommonError> {
        Ok(Self {
            s_bit,
            z_bit,
            scale,
            multiplier,
        })
    }

    /// `0x3FFF`: unsynchronized sender clock, max scale, max multiplier.
    pub fn sender_default() -> Self {
        Self {
            s_bit: 0,
            z_bit: 0,
            scale: 63,
            multiplier: 255,
        }
    }

    /// `0x0001`: the reflector's own error estimate on its echoed timestamps.
    pub fn reflector_default() -> Self {
        Self {
            s_bit: 0,
            z_bit: 0,
            scale: 0,
            multiplier: 1,
        }
    }
}

/// Unauthenticated-mode TWAMP-Light probe, per
/// [RFC4656 §4.1.2](https://www.rfc-editor.org/rfc/rfc4656#section-4.1.2):
/// 14-byte header (sequence, T1, error estimate) followed by zero-padding.
#[derive(BeBytes, Debug, PartialEq, Eq, Clone)]
pub struct SenderMessage {
    pub sequence_number: u32,
    pub timestamp: NtpTimestamp,
    pub error_estimate: ErrorEstimate,
    pub padding: Vec<u8>,
}

impl SenderMessage {
    pub fn new(
        sequence_number: u32,
        timestamp: NtpTimestamp,
        error_estimate: ErrorEstimate,
        padding: Vec<u8>,
    ) -> Self {
        Self {
            sequence_number,
            timestamp,
            error_estimate,
            padding,
        }
    }
}

/// Reflected TWAMP-Light reply, per
/// [RFC5357 §4.2.1](https://www.rfc-editor.org/rfc/rfc5357.html#section-4.2.1).
///
/// Field order follows the 38-byte fixed header: `rseq(4) | T2(8) | error_estimate(2) |
/// mbz(2) | T3(8) | sseq(4) | T1(8) | sender_error_estimate(2)`, then padding. `T2` is the
/// reflector's receive timestamp, `T3` its send timestamp — the outbound/inbound delay
/// formulas (`T2 - T1` forward, `T4 - T3` backward) are what pin down which slot is which,
/// since the two timestamps occupy adjacent 8-byte windows and are easy to transpose.
#[derive(BeBytes, Debug, PartialEq, Eq, Clone)]
pub struct ReflectedMessage {
    pub reflector_sequence_number: u32,
    pub receive_timestamp: NtpTimestamp,
    pub error_estimate: ErrorEstimate,
    pub mbz1: u16,
    pub send_timestamp: NtpTimestamp,
    pub sender_sequence_number: u32,
    pub sender_timestamp: NtpTimestamp,
    pub sender_error_estimate: ErrorEstimate,
    pub padding: Vec<u8>,
}

impl ReflectedMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reflector_sequence_number: u32,
        receive_timestamp: NtpTimestamp,
        send_timestamp: NtpTimestamp,
        sender_sequence_number: u32,
        sender_timestamp: NtpTimestamp,
        sender_error_estimate: ErrorEstimate,
        padding: Vec<u8>,
    ) -> Self {
        Self {
            reflector_sequence_number,
            receive_timestamp,
            error_estimate: ErrorEstimate::reflector_default(),
            mbz1: 0,
            send_timestamp,
            sender_sequence_number,
            sender_timestamp,
            sender_error_estimate,
            padding,
        }
    }

    /// The 14 bytes of the original probe header this reply echoes back, matching
    /// §4.4's "echo of bytes `[0:14]` of the request".
    pub fn echoed_header_matches(&self, sender_probe: &SenderMessage) -> bool {
        self.sender_sequence_number == sender_probe.sequence_number
            && self.sender_timestamp == sender_probe.timestamp
            && self.sender_error_estimate == sender_probe.error_estimate
    }
}

/// Bit flags for the modes a TWAMP control peer supports or selects.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Mode {
    Closed = 0b0000,
    Unauthenticated = 0b0001,
    Authenticated = 0b0010,
    Encrypted = 0b0100,
}

/// A 32-bit mode bitmask, per RFC 5357 §3.1 (Server Greeting modes field).
#[derive(BeBytes, Debug, PartialEq, Clone, Copy, Default)]
pub struct Modes {
    pub bits: u32,
}

impl Modes {
    pub fn set(&mut self, mode: Mode) {
        self.bits |= mode as u32;
    }

    pub fn is_set(&self, mode: Mode) -> bool {
        self.bits & (mode as u32) == mode as u32
    }
}

impl BitAnd for Modes {
    type Output = Modes;

    fn bitand(self, rhs: Self) -> Self::Output {
        Modes {
            bits: self.bits & rhs.bits,
        }
    }
}

/// Server Greeting, per RFC 5357 §3.1. Bytes 12..16 carry the supported-modes mask.
#[derive(BeBytes, Debug, Default)]
pub struct ServerGreeting {
    pub unused: [u8; 12],
    pub modes: Modes,
    pub challenge: [u8; 16],
    pub salt: [u8; 16],
    pub count: u32,
    pub mbz: [u8; 12],
}

/// Client Setup Response, per RFC 5357 §3.2. Unauthenticated mode sends `mode = 1`
/// and zeroes the rest (160 bytes of key id / token / IV).
#[derive(BeBytes, Debug, PartialEq, Clone)]
pub struct ClientSetupResponse {
    pub mode: Modes,
    pub key_id: [u8; 80],
    pub token: [u8; 64],
    pub client_iv: [u8; 16],
}

impl ClientSetupResponse {
    pub fn unauthenticated() -> Self {
        let mut mode = Modes::default();
        mode.set(Mode::Unauthenticated);
        Self {
            mode,
            key_id: [0; 80],
            token: [0; 64],
            client_iv: [0; 16],
        }
    }
}

#[derive(BeBytes, Debug, PartialEq, Eq, Clone, Copy)]
pub enum AcceptFields {
    Ok = 0,
    Failure = 1,
    InternalError = 2,
    NotSupported = 3,
    PermanentResourceLimitation = 4,
    TemporaryResourceLimitation = 5,
}

/// Server Start, per RFC 5357 §3.3. Byte 15 (after 15 MBZ bytes) carries the accept code.
#[derive(BeBytes, Debug)]
pub struct ServerStart {
    pub mbz1: [u8; 15],
    pub accept: AcceptFields,
    pub server_iv: [u8; 16],
    pub start_time: NtpTimestamp,
    pub mbz2: [u8; 8],
}

#[derive(BeBytes, Debug, PartialEq, Clone, Default)]
pub enum TwampControlCommandNumber {
    #[default]
    Forbidden = 1,
    StartSessions = 2,
    StopSessions = 3,
    RequestTwSession = 5,
    StartNSessions = 7,
    StartNAck = 8,
    StopNSessions = 9,
    StopNAck = 10,
}

/// Request-TW-Session, per RFC 5357 §3.5. Always emits the long form (16-byte
/// address fields for both v4 and v6) per the resolved layout ambiguity — see
/// `RequestTwSessionBuilder::build`'s doc comment.
#[derive(BeBytes, Debug)]
pub struct RequestTwSession {
    pub request_type: TwampControlCommandNumber,
    #[U8(size(4), pos(0))]
    pub mbz1: u8,
    #[U8(size(4), pos(4))]
    pub ipvn: u8,
    pub conf_sender: u8,
    pub conf_receiver: u8,
    pub num_schedule_slots: u32,
    pub num_packets: u32,
    pub sender_port: u16,
    pub receiver_port: u16,
    pub sender_address: [u8; 16],
    pub receiver_address: [u8; 16],
    pub sid: [u8; 16],
    pub padding_length: u32,
    pub start_time: NtpTimestamp,
    pub timeout: NtpTimestamp,
    pub type_p: u32,
    pub mbz2: [u8; 8],
    pub hmac: [u8; 16],
}

/// Accept-Session, per RFC 5357 §3.6. Byte 0 carries the accept code.
#[derive(BeBytes, Debug)]
pub struct AcceptSessionMessage {
    pub accept: AcceptFields,
    pub mbz1: u8,
    pub port: u16,
    pub sid: [u8; 16],
    pub mbz2: [u8; 12],
    pub hmac: [u8; 16],
}

/// Start-Sessions, per RFC 5357 §3.7: command byte `2` followed by 31 zero bytes.
#[derive(BeBytes, Debug)]
pub struct StartSessionsMessage {
    pub control_command: TwampControlCommandNumber,
    pub mbz: [u8; 31],
}

impl StartSessionsMessage {
    pub fn new() -> Self {
        Self {
            control_command: TwampControlCommandNumber::StartSessions,
            mbz: [0; 31],
        }
    }
}

impl Default for StartSessionsMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Start-Ack, the server's reply to Start-Sessions.
#[derive(BeBytes, Debug)]
pub struct StartAckMessage {
    pub accept: AcceptFields,
    pub mbz: [u8; 15],
    pub hmac: [u8; 16],
}

/// Stop-Sessions, per RFC 5357 §3.8: command byte `3`, accept byte `0`,
/// 2 MBZ bytes, the session count, then 24 zero bytes.
#[derive(BeBytes, Debug)]
pub struct StopSessionsMessage {
    pub control_command: TwampControlCommandNumber,
    pub accept_field: u8,
    pub mbz1: u16,
    pub number_of_sessions: u32,
    pub mbz2: [u8; 24],
}

impl StopSessionsMessage {
    pub fn new(number_of_sessions: u32) -> Self {
        Self {
            control_command: TwampControlCommandNumber::StopSessions,
            accept_field: 0,
            mbz1: 0,
            number_of_sessions,
            mbz2: [0; 24],
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub struct RequestTwSessionBuilder {
    ipvn: Option<u8>,
    num_schedule_slots: Option<u32>,
    num_packets: Option<u32>,
    sender_port: Option<u16>,
    receiver_port: Option<u16>,
    sender_address: Option<IpAddr>,
    receiver_address: Option<IpAddr>,
    sid: Option<[u8; 16]>,
    padding_length: Option<u32>,
    start_time: Option<NtpTimestamp>,
    timeout: Option<NtpTimestamp>,
    type_p: Option<u32>,
    hmac: Option<[u8; 16]>,
}

impl RequestTwSessionBuilder {
    pub fn new() -> Self {
        Self {
            ipvn: None,
            num_schedule_slots: None,
            num_packets: None,
            sender_port: None,
            receiver_port: None,
            sender_address: None,
            receiver_address: None,
            sid: None,
            padding_length: None,
            start_time: None,
            timeout: None,
            type_p: None,
            hmac: None,
        }
    }

    pub fn ipvn(mut self, ipvn: u8) -> Self {
        self.ipvn = Some(ipvn);
        self
    }

    pub fn num_schedule_slots(mut self, num_schedule_slots: u32) -> Self {
        self.num_schedule_slots = Some(num_schedule_slots);
        self
    }

    pub fn num_packets(mut self, num_packets: u32) -> Self {
        self.num_packets = Some(num_packets);
        self
    }

    pub fn sender_port(mut self, sender_port: u16) -> Self {
        self.sender_port = Some(sender_port);
        self
    }

    pub fn receiver_port(mut self, receiver_port: u16) -> Self {
        self.receiver_port = Some(receiver_port);
        self
    }

    pub fn sender_address(mut self, sender_address: Option<IpAddr>) -> Self {
        self.sender_address = sender_address;
        self
    }

    pub fn receiver_address(mut self, receiver_address: Option<IpAddr>) -> Self {
        self.receiver_address = receiver_address;
        self
    }

    pub fn sid(mut self, sid: [u8; 16]) -> Self {
        self.sid = Some(sid);
        self
    }

    pub fn padding_length(mut self, padding_length: u32) -> Self {
        self.padding_length = Some(padding_length);
        self
    }

    pub fn start_time(mut self, start_time: NtpTimestamp) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn timeout(mut self, timeout: NtpTimestamp) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn type_p(mut self, type_p: u32) -> Self {
        self.type_p = Some(type_p);
        self
    }

    pub fn hmac(mut self, hmac: [u8; 16]) -> Self {
        self.hmac = Some(hmac);
        self
    }

    /// Always builds the long form (16-byte zero-padded v4 address, 16-byte v6
    /// address) rather than the legacy short form some TWAMP sources special-case:
    /// the RFC requires the address fields be present regardless of IP version.
    pub fn build(self) -> Result<RequestTwSession, CommonError> {
        let ipvn = self.ipvn.ok_or_else(|| CommonError::from("ipvn is not set"))?;
        match ipvn {
            4 => {
                if matches!(self.sender_address, Some(IpAddr::V6(_)))
                    || matches!(self.receiver_address, Some(IpAddr::V6(_)))
                {
                    return Err(CommonError::from("address family does not match ipvn=4"));
                }
            }
            6 => {
                if matches!(self.sender_address, Some(IpAddr::V4(_)))
                    || matches!(self.receiver_address, Some(IpAddr::V4(_)))
                {
                    return Err(CommonError::from("address family does not match ipvn=6"));
                }
            }
            _ => return Err(CommonError::from("ipvn must be 4 or 6")),
        }

        let start_time = self
            .start_time
            .ok_or_else(|| CommonError::from("start_time is not set"))?;

        let sender_address = addr_to_bytes(self.sender_address);
        let receiver_address = addr_to_bytes(self.receiver_address);

        Ok(RequestTwSession {
            request_type: TwampControlCommandNumber::RequestTwSession,
            mbz1: 0,
            ipvn,
            // Both fields MUST be zero: the Session-Reflector both sends and receives.
            conf_sender: 0,
            conf_receiver: 0,
            num_schedule_slots: self.num_schedule_slots.unwrap_or(0),
            num_packets: self.num_packets.unwrap_or(0),
            sender_port: self.sender_port.unwrap_or(0),
            receiver_port: self.receiver_port.unwrap_or(0),
            sender_address,
            receiver_address,
            sid: self.sid.unwrap_or([0; 16]),
            padding_length: self.padding_length.unwrap_or(0),
            start_time,
            timeout: self.timeout.unwrap_or_else(|| NtpTimestamp::from_seconds(3.0)),
            type_p: self.type_p.unwrap_or(0),
            mbz2: [0; 8],
            hmac: self.hmac.unwrap_or([0; 16]),
        })
    }
}

impl Default for RequestTwSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn addr_to_bytes(addr: Option<IpAddr>) -> [u8; 16] {
    match addr {
        Some(IpAddr::V4(addr)) => {
            let mut bytes = [0u8; 16];
            bytes[12..16].copy_from_slice(&addr.octets());
            bytes
        }
        Some(IpAddr::V6(addr)) => addr.octets(),
        None => [0u8; 16],
    }
}

/// `DSCP << 24`, per §4.7's Type-P field.
pub fn type_p_from_dscp(dscp: u8) -> u32 {
    (dscp as u32) << 24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_estimate_defaults_match_spec_constants() {
        let sender = ErrorEstimate::sender_default();
        assert_eq!(sender.scale, 63);
        assert_eq!(sender.multiplier, 255);

        let reflector = ErrorEstimate::reflector_default();
        assert_eq!(reflector.scale, 0);
        assert_eq!(reflector.multiplier, 1);
    }

    #[test]
    fn reflected_message_echoes_sender_header() {
        let probe = SenderMessage::new(
            7,
            NtpTimestamp::from_seconds(100.0),
            ErrorEstimate::sender_default(),
            vec![0; 10],
        );
        let reply = ReflectedMessage::new(
            0,
            NtpTimestamp::from_seconds(101.0),
            NtpTimestamp::from_seconds(101.0),
            probe.sequence_number,
            probe.timestamp,
            probe.error_estimate,
            vec![],
        );
        assert!(reply.echoed_header_matches(&probe));
    }

    #[test]
    fn request_tw_session_builder_rejects_family_mismatch() {
        let result = RequestTwSessionBuilder::new()
            .ipvn(4)
            .sender_address(Some("::1".parse().unwrap()))
            .start_time(NtpTimestamp::from_seconds(0.0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn request_tw_session_builder_long_form_always_has_16_byte_addresses() {
        let session = RequestTwSessionBuilder::new()
            .ipvn(4)
            .sender_address(Some("10.0.0.1".parse().unwrap()))
            .receiver_address(Some("10.0.0.2".parse().unwrap()))
            .start_time(NtpTimestamp::from_seconds(0.0))
            .type_p(0)
            .build()
            .unwrap();
        assert_eq!(session.sender_address.len(), 16);
        assert_eq!(&session.sender_address[12..16], &[10, 0, 0, 1]);
    }
}
