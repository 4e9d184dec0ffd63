//! Host and network probes.
//!
//! Provides:
//! - Reachability checks through the system ping command
//! - Local and public IPv4 discovery
//! - Hardware address lookup
//! - TCP port probing and scanning
//!
//! Every public operation fails closed: errors become `false`, `0.0.0.0`,
//! the zero MAC, or an unreachable/closed result carrying the reason.

mod address;
mod mac;
mod ping;
mod ports;

pub use address::parse_echo_body;
pub use mac::{MacAddress, get_mac_address, try_get_mac_address};
pub use ping::{PingOutcome, parse_ping_time};
pub use ports::{HOST_UNREACHABLE, PortCheck, PortProgressCallback, try_connect};

use crate::config::Config;
use crate::runner::{CommandRunner, SystemRunner};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Probe entry point bundling the process runner and configuration.
///
/// The value is immutable once built, so one instance can serve any number
/// of probes.
#[derive(Debug, Clone)]
pub struct Diagnostics<R = SystemRunner> {
    runner: R,
    config: Config,
}

impl Diagnostics<SystemRunner> {
    /// System ping and default configuration.
    pub fn system() -> Self {
        Self::new(SystemRunner, Config::default())
    }

    /// System ping with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self::new(SystemRunner, config)
    }
}

impl Default for Diagnostics<SystemRunner> {
    fn default() -> Self {
        Self::system()
    }
}

impl<R: CommandRunner> Diagnostics<R> {
    pub fn new(runner: R, config: Config) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

/// Ping `host` with the system ping command. See [`Diagnostics::ping_host`].
pub async fn ping_host(host: &str, count: u32, timeout: Duration) -> PingOutcome {
    Diagnostics::system().ping_host(host, count, timeout).await
}

/// Whether `host` answers a ping. See [`Diagnostics::ping`].
pub async fn ping(host: &str, timeout: Duration, count: u32) -> bool {
    Diagnostics::system().ping(host, timeout, count).await
}

/// Whether any well-known DNS server answers a ping.
pub async fn is_online(timeout: Duration) -> bool {
    Diagnostics::system().is_online(timeout).await
}

pub async fn ping_list<S: AsRef<str>>(
    hosts: &[S],
    timeout: Duration,
    count: u32,
) -> BTreeMap<String, bool> {
    Diagnostics::system().ping_list(hosts, timeout, count).await
}

/// Outbound IPv4 address of this machine, or `0.0.0.0`.
pub async fn get_local_ip() -> Ipv4Addr {
    Diagnostics::system().get_local_ip().await
}

/// Public IPv4 address as seen by IP-echo services, or `0.0.0.0`.
pub async fn get_public_ip(timeout: Duration) -> Ipv4Addr {
    Diagnostics::system().get_public_ip(timeout).await
}

pub async fn check_port(host: &str, port: u16, timeout: Duration) -> PortCheck {
    Diagnostics::system().check_port(host, port, timeout).await
}

pub async fn is_port_open(host: &str, port: u16, timeout: Duration) -> bool {
    Diagnostics::system().is_port_open(host, port, timeout).await
}

pub async fn scan_ports_list(host: &str, ports: &[u16], timeout: Duration) -> BTreeMap<u16, bool> {
    Diagnostics::system().scan_ports_list(host, ports, timeout).await
}

/// Ports in `start_port..=end_port` that are *not* open.
pub async fn free_port_scanner(
    host: &str,
    start_port: u16,
    end_port: u16,
    timeout: Duration,
    show_progress: bool,
) -> Vec<u16> {
    Diagnostics::system()
        .free_port_scanner(host, start_port, end_port, timeout, show_progress)
        .await
}
