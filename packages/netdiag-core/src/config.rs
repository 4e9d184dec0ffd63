//! Probe configuration.
//!
//! Values are layered with priority:
//! 1. Environment variables (`NETDIAG_*`)
//! 2. Config file (`~/.config/netdiag/config.toml`)
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-packet timeout used by `ping` when the caller has no preference
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);
/// Packet count used by `ping_host` when the caller has no preference
pub const DEFAULT_PING_HOST_COUNT: u32 = 4;
/// Packet count used by `ping`, `ping_list` and the port reachability gate
pub const DEFAULT_PING_COUNT: u32 = 1;
pub const DEFAULT_ONLINE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_PING_PROGRAM: &str = "ping";
const DEFAULT_ONLINE_SERVERS: [&str; 3] = ["1.1.1.1", "8.8.8.8", "9.9.9.9"];
const DEFAULT_LOCAL_IP_PROBE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80);
const DEFAULT_LOCAL_IP_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_PUBLIC_IP_ENDPOINTS: [&str; 3] = [
    "https://api.ipify.org?format=json",
    "https://ifconfig.me/ip",
    "https://ipinfo.io/ip",
];

const ENV_PING_PROGRAM: &str = "NETDIAG_PING_PROGRAM";
const ENV_ONLINE_SERVERS: &str = "NETDIAG_ONLINE_SERVERS";
const ENV_PUBLIC_IP_ENDPOINTS: &str = "NETDIAG_PUBLIC_IP_ENDPOINTS";

/// How an IP-echo endpoint encodes the address in its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoFormat {
    /// `{"ip": "203.0.113.7"}`
    Json,
    /// The bare address as plain text
    Text,
}

impl EchoFormat {
    /// Guess the format from the URL: `format=json` queries answer with JSON.
    pub fn infer(url: &str) -> Self {
        if url.ends_with("format=json") {
            EchoFormat::Json
        } else {
            EchoFormat::Text
        }
    }
}

/// A public IP-echo service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoEndpoint {
    pub url: String,
    pub format: EchoFormat,
}

impl EchoEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let format = EchoFormat::infer(&url);
        Self { url, format }
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from config file
    ConfigFile,
    /// Overridden by environment variables
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

/// Runtime probe configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Program invoked for ICMP reachability checks
    pub ping_program: String,
    /// Hosts tried in order by `is_online`
    pub online_servers: Vec<String>,
    /// When set and the ping program is missing, a TCP connect to this port
    /// stands in for the ping.
    pub tcp_fallback_port: Option<u16>,
    /// Address the UDP socket "connects" to when discovering the local IP
    pub local_ip_probe: SocketAddr,
    pub local_ip_timeout: Duration,
    /// IP-echo services tried in order by `get_public_ip`
    pub public_ip_endpoints: Vec<EchoEndpoint>,
    /// Highest-priority layer that contributed a value
    pub source: ConfigSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_program: DEFAULT_PING_PROGRAM.to_string(),
            online_servers: DEFAULT_ONLINE_SERVERS.iter().map(|s| s.to_string()).collect(),
            tcp_fallback_port: None,
            local_ip_probe: SocketAddr::V4(DEFAULT_LOCAL_IP_PROBE),
            local_ip_timeout: DEFAULT_LOCAL_IP_TIMEOUT,
            public_ip_endpoints: DEFAULT_PUBLIC_IP_ENDPOINTS
                .iter()
                .map(|url| EchoEndpoint::new(*url))
                .collect(),
            source: ConfigSource::Default,
        }
    }
}

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    ping: Option<PingSection>,
    local_ip: Option<LocalIpSection>,
    public_ip: Option<PublicIpSection>,
}

#[derive(Debug, Deserialize, Default)]
struct PingSection {
    program: Option<String>,
    online_servers: Option<Vec<String>>,
    tcp_fallback_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalIpSection {
    /// e.g. "8.8.8.8:80"
    probe: Option<SocketAddr>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PublicIpSection {
    endpoints: Option<Vec<EndpointEntry>>,
}

#[derive(Debug, Deserialize)]
struct EndpointEntry {
    url: String,
    format: Option<EchoFormat>,
}

impl Config {
    /// Parse a TOML document and layer it over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = Config::default();
        if config.apply_file(file) {
            config.source = ConfigSource::ConfigFile;
        }
        Ok(config)
    }

    /// Returns true if the file changed anything.
    fn apply_file(&mut self, file: ConfigFile) -> bool {
        let mut changed = false;

        if let Some(ping) = file.ping {
            if let Some(program) = non_empty(ping.program) {
                self.ping_program = program;
                changed = true;
            }
            if let Some(servers) = ping.online_servers {
                let servers = clean_list(servers);
                if servers.is_empty() {
                    tracing::warn!("Ignoring empty ping.online_servers in config file");
                } else {
                    self.online_servers = servers;
                    changed = true;
                }
            }
            if ping.tcp_fallback_port.is_some() {
                self.tcp_fallback_port = ping.tcp_fallback_port;
                changed = true;
            }
        }

        if let Some(local_ip) = file.local_ip {
            if let Some(probe) = local_ip.probe {
                self.local_ip_probe = probe;
                changed = true;
            }
            if let Some(ms) = local_ip.timeout_ms {
                self.local_ip_timeout = Duration::from_millis(ms.max(1));
                changed = true;
            }
        }

        if let Some(endpoints) = file.public_ip.and_then(|p| p.endpoints) {
            let endpoints: Vec<EchoEndpoint> = endpoints
                .into_iter()
                .filter_map(|entry| {
                    let url = entry.url.trim().to_string();
                    if url.is_empty() {
                        return None;
                    }
                    let format = entry.format.unwrap_or_else(|| EchoFormat::infer(&url));
                    Some(EchoEndpoint { url, format })
                })
                .collect();
            if endpoints.is_empty() {
                tracing::warn!("Ignoring empty public_ip.endpoints in config file");
            } else {
                self.public_ip_endpoints = endpoints;
                changed = true;
            }
        }

        changed
    }

    /// Apply `NETDIAG_*` overrides read through `lookup`. Returns true if any applied.
    fn apply_env<F>(&mut self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut changed = false;

        if let Some(program) = non_empty(lookup(ENV_PING_PROGRAM)) {
            tracing::info!("Using ping program from environment variable: {}", program);
            self.ping_program = program;
            changed = true;
        }

        if let Some(raw) = lookup(ENV_ONLINE_SERVERS) {
            let servers = split_list(&raw);
            if !servers.is_empty() {
                tracing::info!("Using online check servers from environment: {:?}", servers);
                self.online_servers = servers;
                changed = true;
            }
        }

        if let Some(raw) = lookup(ENV_PUBLIC_IP_ENDPOINTS) {
            let endpoints: Vec<EchoEndpoint> =
                split_list(&raw).into_iter().map(EchoEndpoint::new).collect();
            if !endpoints.is_empty() {
                tracing::info!(
                    "Using {} public IP endpoints from environment",
                    endpoints.len()
                );
                self.public_ip_endpoints = endpoints;
                changed = true;
            }
        }

        changed
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(String::from).collect())
}

/// Get the path to the configuration file
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("netdiag").join("config.toml"))
}

/// Get the config file path as a displayable string
pub fn config_file_path_string() -> String {
    config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(unavailable)".to_string())
}

/// Read the `[ping]`, `[local_ip]` and `[public_ip]` sections from `path`.
///
/// A missing file is silent. An unreadable or malformed file is logged and
/// ignored, leaving the defaults in place.
fn read_config_file(path: &Path) -> Option<ConfigFile> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable probe config {:?}: {}", path, e);
            return None;
        }
    };

    toml::from_str(&content)
        .inspect(|_| tracing::debug!("Probe settings read from {:?}", path))
        .inspect_err(|e| tracing::warn!("Ignoring malformed probe config {:?}: {}", path, e))
        .ok()
}

/// Load the effective configuration (environment, then config file, then defaults).
pub fn load_config() -> Config {
    let mut config = Config::default();

    if let Some(file) = config_file_path().and_then(|p| read_config_file(&p)) {
        if config.apply_file(file) {
            config.source = ConfigSource::ConfigFile;
        }
    }

    if config.apply_env(|key| std::env::var(key).ok()) {
        config.source = ConfigSource::Environment;
    }

    tracing::debug!("Probe configuration loaded from {}", config.source);
    config
}

/// Generate an example configuration file
pub fn generate_example_config() -> String {
    r#"# netdiag configuration
# Place this file at ~/.config/netdiag/config.toml

[ping]
# Program used for reachability checks
# program = "ping"

# Servers tried in order by the online check
# online_servers = ["1.1.1.1", "8.8.8.8", "9.9.9.9"]

# Probe this TCP port instead when the ping program is not installed
# tcp_fallback_port = 443

[local_ip]
# probe = "8.8.8.8:80"
# timeout_ms = 500

[public_ip]
# endpoints = [
#     { url = "https://api.ipify.org?format=json", format = "json" },
#     { url = "https://ifconfig.me/ip", format = "text" },
#     { url = "https://ipinfo.io/ip", format = "text" },
# ]
"#
    .to_string()
}
