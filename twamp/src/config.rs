//! Turns parsed CLI flags into the `Configuration` structs `reflector`/`sender`/
//! `control` expect, per §6's interface table and §4.3's socket options.

use std::net::{IpAddr, SocketAddr};

use network_commons::{
    addr::{parse_addr, Family},
    error::CommonError,
    socket::SocketOptions,
};

use crate::cli::Cli;
use crate::dscp;
use crate::padding::PadMix;

/// Resolves a CLI endpoint string (`§4.2`'s six forms) to a concrete `SocketAddr`.
/// An empty host binds to the unspecified address for the given family, defaulting
/// to IPv4 when the input carried no family hint at all.
pub fn resolve_socket_addr(spec: &str, default_port: u16) -> Result<SocketAddr, CommonError> {
    let parsed = parse_addr(spec, default_port)?;

    let ip: IpAddr = if parsed.host.is_empty() {
        match parsed.family {
            Family::V6 => "::".parse().unwrap(),
            _ => "0.0.0.0".parse().unwrap(),
        }
    } else {
        parsed
            .host
            .parse()
            .map_err(|_| CommonError::AddrSyntax(format!("not an IP literal: {}", parsed.host)))?
    };

    Ok(SocketAddr::new(ip, parsed.port))
}

/// Resolves `--tos`/`--dscp` to a single TOS byte; `--dscp` wins when both are given
/// (clap already enforces that mutual exclusion, so this just covers the plain-`--tos`
/// and neither-given cases).
pub fn resolve_tos(cli: &Cli) -> Result<u8, CommonError> {
    if let Some(name) = &cli.dscp {
        return dscp::tos_byte_for_name(name);
    }
    Ok(cli.tos.unwrap_or(0))
}

/// Builds the socket options for a connection, applying §9's DF rule: when the
/// user passed `--do-not-fragment` explicitly, failing to set it is a setup
/// error rather than a logged warning.
pub fn socket_options(cli: &Cli) -> Result<SocketOptions, CommonError> {
    Ok(SocketOptions {
        tos: resolve_tos(cli)?,
        ttl: cli.ttl,
        dont_fragment: cli.do_not_fragment,
        dont_fragment_required: cli.do_not_fragment,
    })
}

/// Builds the padding-size source for an endpoint: a fixed size when `--padding`
/// was given, otherwise the family-appropriate IMIX default (§3's padding policy).
pub fn padmix_for(cli: &Cli, remote: &SocketAddr) -> PadMix {
    match cli.padding {
        Some(n) => PadMix::fixed(n),
        None if remote.is_ipv6() => PadMix::default_v6(),
        None => PadMix::default_v4(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_binds_the_unspecified_v4_address() {
        let addr = resolve_socket_addr("", 862).unwrap();
        assert_eq!(addr, "0.0.0.0:862".parse().unwrap());
    }

    #[test]
    fn bracketed_v6_resolves_to_the_literal() {
        let addr = resolve_socket_addr("[::1]:862", 862).unwrap();
        assert_eq!(addr, "[::1]:862".parse().unwrap());
    }

    #[test]
    fn bare_v4_host_uses_the_default_port() {
        let addr = resolve_socket_addr("10.0.0.1", 862).unwrap();
        assert_eq!(addr, "10.0.0.1:862".parse().unwrap());
    }
}
