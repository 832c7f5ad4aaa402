use bebytes::BeBytes;
use libc::{in6_addr, iovec, msghdr, recvmsg, sendmsg, sockaddr_in, sockaddr_in6, sockaddr_storage};

use std::io::{self, IoSliceMut};
use std::os::fd::{AsRawFd, RawFd};
use std::{
    io::IoSlice,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    ops::Deref,
};

use crate::error::CommonError;
use crate::libc_call;
use crate::socket::{apply_socket_options, Socket, SocketOptions};
use crate::time::DateTime;

/// `TimestampedUdpSocket` is a wrapper around a raw file descriptor for a socket.
/// It provides methods for sending and receiving data over UDP, with timestamping capabilities.
pub struct TimestampedUdpSocket {
    inner: RawFd,
}

/// When a `TimestampedUdpSocket` goes out of scope, we want to ensure it is properly closed.
/// The `Drop` trait is implemented to automatically close the socket when it is dropped.
impl Drop for TimestampedUdpSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.inner) };
    }
}

/// The `AsRawFd` trait is implemented to allow us to access the raw file descriptor of the socket.
impl AsRawFd for TimestampedUdpSocket {
    /// Returns the raw file descriptor of the socket.
    fn as_raw_fd(&self) -> RawFd {
        self.inner
    }
}

/// Allows conversion from a mutable reference to an i32 to a `TimestampedUdpSocket`.
impl From<&mut i32> for TimestampedUdpSocket {
    /// Creates a new `TimestampedUdpSocket` from a mutable reference to an i32.
    fn from(value: &mut i32) -> Self {
        Self::new(value.as_raw_fd())
    }
}

impl Deref for TimestampedUdpSocket {
    type Target = RawFd;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TimestampedUdpSocket {
    /// Constructs a new `TimestampedUdpSocket` from a given raw file descriptor.
    pub fn new(socket: RawFd) -> Self {
        Self { inner: socket }
    }

    /// Binds the socket to a specific address, applying the §4.3 TOS/TTL/DF/IPv6-class
    /// options before returning it ready for use.
    ///
    /// # Errors
    ///
    /// This method returns an error if the socket cannot be created, configured, or bound
    /// to the provided address.
    pub fn bind(addr: &SocketAddr, opts: &SocketOptions) -> Result<Self, CommonError> {
        let socket_fd = match addr {
            SocketAddr::V4(_) => unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) },
            SocketAddr::V6(_) => unsafe { libc::socket(libc::AF_INET6, libc::SOCK_DGRAM, 0) },
        };

        if socket_fd < 0 {
            return Err(CommonError::SocketCreateFailed(io::Error::last_os_error()));
        }

        let mut socket = Self { inner: socket_fd };
        apply_socket_options(&mut socket, addr, opts)?;

        let mut storage: libc::sockaddr_storage = unsafe { core::mem::zeroed() };
        let (sock_addr, sock_addr_len) = match addr {
            SocketAddr::V4(a) => {
                let sockaddr_in: *mut libc::sockaddr_in =
                    &mut storage as *mut _ as *mut libc::sockaddr_in;
                unsafe {
                    (*sockaddr_in).sin_family = libc::AF_INET as libc::sa_family_t;
                    (*sockaddr_in).sin_port = a.port().to_be();
                    (*sockaddr_in).sin_addr.s_addr = u32::from_be_bytes(a.ip().octets());
                }
                (
                    sockaddr_in as *const libc::sockaddr,
                    core::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            }
            SocketAddr::V6(a) => {
                let sockaddr_in6: *mut libc::sockaddr_in6 =
                    &mut storage as *mut _ as *mut libc::sockaddr_in6;
                unsafe {
                    (*sockaddr_in6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                    (*sockaddr_in6).sin6_port = a.port().to_be();
                    (*sockaddr_in6)
                        .sin6_addr
                        .s6_addr
                        .copy_from_slice(&a.ip().octets());
                    (*sockaddr_in6).sin6_flowinfo = a.flowinfo();
                    (*sockaddr_in6).sin6_scope_id = a.scope_id();
                }
                (
                    sockaddr_in6 as *const libc::sockaddr,
                    core::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                )
            }
        };

        if unsafe { libc::bind(socket_fd, sock_addr, sock_addr_len) } < 0 {
            return Err(CommonError::SocketBindFailed(io::Error::last_os_error()));
        }

        Ok(socket)
    }
}

/// Implementation of the `Socket` trait for `TimestampedUdpSocket`.
impl Socket<TimestampedUdpSocket> for TimestampedUdpSocket {
    unsafe fn from_raw_fd(fd: RawFd) -> TimestampedUdpSocket {
        Self { inner: fd }
    }

    fn send(&self, buffer: impl BeBytes) -> Result<(usize, DateTime), CommonError> {
        let data = buffer.to_be_bytes();
        let length = data.len();

        let timestamp = DateTime::utc_now();
        let result = libc_call!(send(self.inner, data.as_ptr() as *const _, length, 0))
            .map_err(CommonError::Io)?;

        Ok((result as usize, timestamp))
    }

    fn send_to(
        &self,
        address: &SocketAddr,
        message: impl BeBytes,
    ) -> Result<(usize, DateTime), CommonError> {
        let fd = self.as_raw_fd();
        let utc_now: DateTime;
        let bytes = message.to_be_bytes();

        let iov = [IoSlice::new(&bytes)];
        let result: isize;
        match address.ip() {
            IpAddr::V4(ipv4) => {
                log::debug!("ipv4 address {}", ipv4.to_string());

                let mut sockaddr = sockaddr_in {
                    sin_family: libc::AF_INET as u16,
                    sin_port: address.port().to_be(),
                    sin_addr: libc::in_addr {
                        s_addr: u32::from(ipv4).to_be(),
                    },
                    sin_zero: [0; 8],
                };

                let msg = msghdr {
                    msg_name: &mut sockaddr as *mut _ as *mut libc::c_void,
                    msg_namelen: core::mem::size_of_val(&sockaddr) as u32,
                    msg_iov: iov.as_ptr() as *mut libc::iovec,
                    msg_iovlen: iov.len(),
                    msg_control: std::ptr::null_mut(),
                    msg_controllen: 0,
                    msg_flags: 0,
                };
                utc_now = DateTime::utc_now();
                result = unsafe { sendmsg(fd, &msg, 0) };
            }
            IpAddr::V6(ipv6) => {
                log::debug!("ipv6 address {}", ipv6.to_string());

                let mut sockaddr = sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as u16,
                    sin6_port: address.port().to_be(),
                    sin6_addr: in6_addr {
                        s6_addr: ipv6.octets(),
                    },
                    sin6_flowinfo: 0,
                    sin6_scope_id: 0,
                };

                let msg = msghdr {
                    msg_name: &mut sockaddr as *mut _ as *mut libc::c_void,
                    msg_namelen: core::mem::size_of_val(&sockaddr) as u32,
                    msg_iov: iov.as_ptr() as *mut libc::iovec,
                    msg_iovlen: iov.len(),
                    msg_control: std::ptr::null_mut(),
                    msg_controllen: 0,
                    msg_flags: 0,
                };
                utc_now = DateTime::utc_now();
                result = unsafe { sendmsg(fd, &msg, 0) };
            }
        }

        if result < 0 {
            return Err(CommonError::Io(std::io::Error::last_os_error()));
        }

        Ok((result as usize, utc_now))
    }

    fn receive(&self, _buffer: &mut [u8]) -> Result<(usize, DateTime), CommonError> {
        unimplemented!("TWAMP endpoints always know their peer; use receive_from")
    }

    fn receive_from(
        &self,
        buffer: &mut [u8],
    ) -> Result<(usize, SocketAddr, DateTime), CommonError> {
        let fd = self.as_raw_fd();
        let mut addr_storage: sockaddr_storage = unsafe { core::mem::zeroed() };

        let iov = [IoSliceMut::new(buffer)];
        let mut msg: msghdr = unsafe { core::mem::zeroed() };
        msg.msg_name = &mut addr_storage as *mut _ as *mut libc::c_void;
        msg.msg_namelen = core::mem::size_of_val(&addr_storage) as u32;
        msg.msg_iov = iov.as_ptr() as *mut iovec;
        msg.msg_iovlen = iov.len();

        let timestamp = DateTime::utc_now();

        let n = unsafe { recvmsg(fd, &mut msg, 0) };
        if n < 0 {
            return Err(CommonError::Io(std::io::Error::last_os_error()));
        }

        let socket_addr = match addr_storage.ss_family as i32 {
            libc::AF_INET => {
                let sockaddr: &libc::sockaddr_in = unsafe { core::mem::transmute(&addr_storage) };
                let ip_bytes = sockaddr.sin_addr.s_addr.to_be_bytes();
                SocketAddr::new(
                    IpAddr::V4(Ipv4Addr::new(
                        ip_bytes[3],
                        ip_bytes[2],
                        ip_bytes[1],
                        ip_bytes[0],
                    )),
                    sockaddr.sin_port.to_be(),
                )
            }
            libc::AF_INET6 => {
                let sockaddr: &libc::sockaddr_in6 = unsafe { core::mem::transmute(&addr_storage) };
                SocketAddr::new(
                    IpAddr::V6(std::net::Ipv6Addr::from(sockaddr.sin6_addr.s6_addr)),
                    sockaddr.sin6_port.to_be(),
                )
            }
            _ => return Err(CommonError::UnknownAddressFamily),
        };

        Ok((n as usize, socket_addr, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_send_and_receive_round_trip() {
        let sender = TimestampedUdpSocket::bind(
            &"127.0.0.1:0".parse().unwrap(),
            &SocketOptions::default(),
        )
        .unwrap();
        let receiver = TimestampedUdpSocket::bind(
            &"127.0.0.1:0".parse().unwrap(),
            &SocketOptions::default(),
        )
        .unwrap();

        let receiver_addr = local_addr(&receiver);
        let payload = crate::time::NtpTimestamp {
            seconds: 42,
            fraction: 7,
        };
        sender.send_to(&receiver_addr, payload).unwrap();

        let mut buf = [0u8; 64];
        let (n, _peer, _ts) = receiver.receive_from(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..4], &42u32.to_be_bytes());
        assert_eq!(&buf[4..8], &7u32.to_be_bytes());
    }

    fn local_addr(sock: &TimestampedUdpSocket) -> SocketAddr {
        let mut storage: sockaddr_storage = unsafe { core::mem::zeroed() };
        let mut len = core::mem::size_of::<sockaddr_storage>() as libc::socklen_t;
        unsafe {
            libc::getsockname(
                sock.as_raw_fd(),
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            );
        }
        crate::socket::storage_to_socket_addr(&storage).unwrap()
    }
}
