//! netdiag Core Library
//!
//! Small host and network diagnostics:
//! - Reachability (system ping, online check against public DNS servers)
//! - Local and public IPv4 discovery
//! - Hardware address lookup
//! - TCP port probing, list scans and free-port range scans
//!
//! Every operation fails closed. Instead of returning errors they report
//! `false`, `0.0.0.0`, `00:00:00:00:00:00` or a closed/unreachable result with
//! the reason attached. The `try_*` variants expose the underlying
//! [`ProbeError`] for callers that want it.
//!
//! # Example
//!
//! ```no_run
//! use netdiag_core::{probe, Diagnostics, DEFAULT_PORT_TIMEOUT};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     if probe::is_online(Duration::from_secs(5)).await {
//!         println!("Public IP: {}", probe::get_public_ip(Duration::from_secs(5)).await);
//!     }
//!
//!     let diag = Diagnostics::with_config(netdiag_core::load_config());
//!     let open = diag
//!         .scan_ports_list("192.168.1.1", &[22, 80, 443], DEFAULT_PORT_TIMEOUT)
//!         .await;
//!     println!("{:?}", open);
//! }
//! ```

pub mod config;
pub mod error;
pub mod probe;
pub mod runner;

// Re-export commonly used types
pub use config::{
    Config, ConfigSource, DEFAULT_ONLINE_TIMEOUT, DEFAULT_PING_COUNT, DEFAULT_PING_HOST_COUNT,
    DEFAULT_PING_TIMEOUT, DEFAULT_PORT_TIMEOUT, DEFAULT_PUBLIC_IP_TIMEOUT, EchoEndpoint,
    EchoFormat, load_config,
};
pub use error::{ProbeError, ProbeResult};
pub use probe::{Diagnostics, MacAddress, PingOutcome, PortCheck, get_mac_address};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
