//! Command-line surface, per §6's interface table.

use clap::{Parser, Subcommand};

fn parse_hex_byte(s: &str) -> Result<u8, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| format!("invalid hex byte {:?}: {}", s, e))
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// IP TOS byte, as two hex digits (e.g. `--tos B8`).
    #[arg(long, value_parser = parse_hex_byte, global = true)]
    pub tos: Option<u8>,

    /// DSCP name (e.g. `EF`, `AF41`, `CS5`); overrides `--tos` when both are given.
    #[arg(long, global = true, conflicts_with = "tos")]
    pub dscp: Option<String>,

    /// IP TTL / hop limit.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=128), default_value_t = 64, global = true)]
    pub ttl: u8,

    /// Fixed padding size in bytes; omit to draw from the default IMIX padding mix.
    #[arg(long, global = true)]
    pub padding: Option<usize>,

    /// Sets the don't-fragment bit on outgoing packets.
    #[arg(long = "do-not-fragment", global = true)]
    pub do_not_fragment: bool,

    /// Number of probes to send.
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u32).range(1..=9999), default_value_t = 100, global = true)]
    pub count: u32,

    /// Probe interval in milliseconds.
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u64).range(100..=1000), default_value_t = 100, global = true)]
    pub interval: u64,

    /// Suppress informational logging.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs a TWAMP-Light Session-Reflector.
    Reflector {
        /// Local bind address, e.g. `:862` or `0.0.0.0:862`.
        local: String,

        /// Idle-session reset timeout in seconds; overrides the §5 default of 30s.
        #[arg(long)]
        timer: Option<u64>,
    },
    /// Runs a TWAMP-Light Session-Sender.
    Sender {
        /// Local bind address, e.g. `:0`.
        local: String,
        /// Remote reflector address, e.g. `203.0.113.5:862`.
        remote: String,
    },
    /// Runs a TWAMP Control-Client that negotiates a session and then drives
    /// the Session-Sender role itself, per §10.5.
    Controller {
        /// Local TWAMP-Test bind address.
        local: String,
        /// Remote TWAMP-Control server address, e.g. `203.0.113.5:862`.
        remote: String,
    },
    /// Runs the TWAMP Control-Client handshake only, against a pre-existing
    /// Session-Sender/Session-Reflector pair.
    Controlclient {
        /// Address:port the negotiated TWAMP-Test Session-Sender listens on.
        twamp_sender: String,
        /// TWAMP-Control server address, e.g. `203.0.113.5:862`.
        twamp_server: String,
    },
}
