use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use network_commons::{error::CommonError, Strategy};

use twamp::cli::{Cli, Command};
use twamp::config::{padmix_for, resolve_socket_addr, socket_options};
use twamp::control::ControlClient;
use twamp::padding::PadMix;
use twamp::reflector::{Configuration as ReflectorConfiguration, Reflector};
use twamp::sender::{Configuration as SenderConfiguration, Sender};
use twamp::signal;

/// Default TWAMP-Control port, per RFC 5357 §1.
const DEFAULT_CONTROL_PORT: u16 = 862;
/// Default Session-Sender UDP port, per §6.
const DEFAULT_SENDER_PORT: u16 = 20000;
/// Default Session-Reflector/Receiver UDP port, per §6.
const DEFAULT_REFLECTOR_PORT: u16 = 20001;

fn run(cli: Cli) -> Result<(), CommonError> {
    let options = socket_options(&cli)?;

    match &cli.command {
        Command::Reflector { local, timer } => {
            let bind_address = resolve_socket_addr(local, DEFAULT_REFLECTOR_PORT)?;
            let padmix = cli.padding.map(PadMix::fixed);
            let idle_timeout_secs = match *timer {
                Some(idle_secs) => {
                    log::info!("overriding reflector idle timeout to {}s", idle_secs);
                    idle_secs as f64
                }
                None => twamp::session::IDLE_RESET_SECS,
            };
            let mut reflector = Reflector::new(ReflectorConfiguration {
                bind_address,
                socket_options: options,
                padmix,
                idle_timeout_secs,
            });
            signal::watch(reflector.running_handle());
            let result = reflector.execute()?;
            log::info!("reflected {} packets", result.packets_reflected);
        }
        Command::Sender { ref local, ref remote } => {
            let bind_address = resolve_socket_addr(local, DEFAULT_SENDER_PORT)?;
            let remote_address = resolve_socket_addr(remote, DEFAULT_REFLECTOR_PORT)?;
            let mut sender = Sender::new(SenderConfiguration {
                bind_address,
                remote_address,
                socket_options: options,
                count: cli.count,
                interval: Duration::from_millis(cli.interval),
                padmix: padmix_for(&cli, &remote_address),
            });
            signal::watch(sender.running_handle());
            let result = sender.execute()?;
            log::info!("sent {} probes, received {} replies", result.sent, result.received);
            if let Ok(json) = serde_json::to_string_pretty(&result) {
                log::debug!("sender result: {}", json);
            }
        }
        Command::Controlclient {
            ref twamp_sender,
            ref twamp_server,
        } => {
            let sender_address = resolve_socket_addr(twamp_sender, DEFAULT_SENDER_PORT)?;
            let server_address = resolve_socket_addr(twamp_server, DEFAULT_CONTROL_PORT)?;

            let mut client = ControlClient::connect(server_address, &options)?;
            let negotiated = client.request_session(
                Some(sender_address.ip()),
                None,
                sender_address.port(),
                0,
                cli.count,
                cli.padding.unwrap_or(0) as u32,
                0,
            )?;
            log::info!("negotiated test ports: {:?}", negotiated);
            client.start_sessions()?;
            std::thread::sleep(
                Duration::from_millis(cli.interval) * cli.count + Duration::from_secs(5),
            );
            client.stop_sessions()?;
        }
        Command::Controller { ref local, ref remote } => {
            let bind_address = resolve_socket_addr(local, DEFAULT_SENDER_PORT)?;
            let server_address = resolve_socket_addr(remote, DEFAULT_CONTROL_PORT)?;

            let mut client = ControlClient::connect(server_address, &options)?;
            let negotiated = client.request_session(
                Some(bind_address.ip()),
                Some(server_address.ip()),
                bind_address.port(),
                0,
                cli.count,
                cli.padding.unwrap_or(0) as u32,
                0,
            )?;
            client.start_sessions()?;

            let remote_test_address =
                std::net::SocketAddr::new(server_address.ip(), negotiated.receiver_port);
            let mut sender = Sender::new(SenderConfiguration {
                bind_address,
                remote_address: remote_test_address,
                socket_options: options,
                count: cli.count,
                interval: Duration::from_millis(cli.interval),
                padmix: padmix_for(&cli, &remote_test_address),
            });
            signal::watch(sender.running_handle());
            let result = sender.execute()?;
            log::info!("sent {} probes, received {} replies", result.sent, result.received);

            client.stop_sessions()?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    }
    builder.init();

    signal::install();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
