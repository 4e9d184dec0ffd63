//! netdiag CLI - host and network diagnostics from the terminal
//!
//! This binary wraps the core probes:
//! - Reachability checks (single host, lists and subnets, online check)
//! - Local and public IP discovery, hardware address
//! - TCP port checks, list scans and free-port range scans
//! - Continuous reachability monitoring

mod targets;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use netdiag_core::{
    DEFAULT_ONLINE_TIMEOUT, DEFAULT_PING_COUNT, DEFAULT_PING_HOST_COUNT, DEFAULT_PING_TIMEOUT,
    DEFAULT_PORT_TIMEOUT, DEFAULT_PUBLIC_IP_TIMEOUT, Config, Diagnostics, config, get_mac_address,
};
use std::collections::BTreeMap;
use std::time::Duration;
use targets::parse_seconds;

#[derive(Parser)]
#[command(name = "netdiag")]
#[command(author = "netdiag maintainers")]
#[command(version)]
#[command(about = "Host reachability, address discovery and TCP port probing")]
#[command(long_about = "
netdiag answers the usual first questions about a host or network:
is it up, which address am I using, is that port open.

Examples:
  Reachability:   netdiag ping 192.168.1.1
  Subnet sweep:   netdiag ping-list 192.168.1.0/24 --concurrency 32
  Port check:     netdiag port example.com 443
  Free ports:     netdiag free-ports 127.0.0.1 8000 8010 --progress

Probes never fail the command: an unreachable host or closed port is a
result, reported with exit code 0.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ping a host with the system ping command
    Ping {
        host: String,

        /// Number of echo requests
        #[arg(short, long, default_value_t = DEFAULT_PING_HOST_COUNT)]
        count: u32,

        /// Seconds to wait for each reply
        #[arg(short, long, value_parser = parse_seconds, default_value = "2")]
        timeout: Duration,
    },

    /// Ping several hosts or subnets (CIDR) and report which answer
    PingList {
        /// Hostnames, addresses or CIDR blocks
        #[arg(required = true)]
        targets: Vec<String>,

        #[arg(short, long, default_value_t = DEFAULT_PING_COUNT)]
        count: u32,

        #[arg(short, long, value_parser = parse_seconds, default_value = "2")]
        timeout: Duration,

        /// Pings in flight at once (1 = one after another)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Check internet connectivity against well-known DNS servers
    Online {
        #[arg(short, long, value_parser = parse_seconds, default_value = "5")]
        timeout: Duration,
    },

    /// Show the local outbound IPv4 address
    LocalIp,

    /// Show the public IPv4 address as seen by IP-echo services
    PublicIp {
        #[arg(short, long, value_parser = parse_seconds, default_value = "5")]
        timeout: Duration,
    },

    /// Show this machine's hardware (MAC) address
    Mac,

    /// Check whether a TCP port accepts connections
    Port {
        host: String,
        port: u16,

        #[arg(short, long, value_parser = parse_seconds, default_value = "1")]
        timeout: Duration,
    },

    /// Check a list of TCP ports (e.g. 22,80,443 or 8000-8010)
    Scan {
        host: String,

        #[arg(required = true)]
        ports: Vec<String>,

        #[arg(short, long, value_parser = parse_seconds, default_value = "1")]
        timeout: Duration,

        /// Probes in flight at once (1 = one after another)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },

    /// List ports in a range that are not open
    FreePorts {
        host: String,
        start: u16,
        end: u16,

        #[arg(short, long, value_parser = parse_seconds, default_value = "1")]
        timeout: Duration,

        /// Print a line per checked port
        #[arg(short, long)]
        progress: bool,
    },

    /// Keep pinging hosts and report reachability changes
    Watch {
        #[arg(required = true)]
        targets: Vec<String>,

        /// Seconds between rounds
        #[arg(short, long, value_parser = parse_seconds, default_value = "30")]
        interval: Duration,

        #[arg(short, long, value_parser = parse_seconds, default_value = "2")]
        timeout: Duration,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("netdiag={},netdiag_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let diag = Diagnostics::with_config(config::load_config());

    match &cli.command {
        Commands::Ping {
            host,
            count,
            timeout,
        } => cmd_ping(&cli, &diag, host, *count, *timeout).await,
        Commands::PingList {
            targets,
            count,
            timeout,
            concurrency,
        } => cmd_ping_list(&cli, &diag, targets, *count, *timeout, *concurrency).await,
        Commands::Online { timeout } => cmd_online(&cli, &diag, *timeout).await,
        Commands::LocalIp => cmd_local_ip(&cli, &diag).await,
        Commands::PublicIp { timeout } => cmd_public_ip(&cli, &diag, *timeout).await,
        Commands::Mac => cmd_mac(&cli),
        Commands::Port {
            host,
            port,
            timeout,
        } => cmd_port(&cli, &diag, host, *port, *timeout).await,
        Commands::Scan {
            host,
            ports,
            timeout,
            concurrency,
        } => cmd_scan(&cli, &diag, host, ports, *timeout, *concurrency).await,
        Commands::FreePorts {
            host,
            start,
            end,
            timeout,
            progress,
        } => cmd_free_ports(&cli, &diag, host, *start, *end, *timeout, *progress).await,
        Commands::Watch {
            targets,
            interval,
            timeout,
        } => {
            let hosts = targets::expand_targets(targets)?;
            watch::run_watch(&diag, &hosts, *interval, *timeout, cli.format).await
        }
        Commands::Config => cmd_config(&cli, &diag),
    }
}

async fn cmd_ping(
    cli: &Cli,
    diag: &Diagnostics,
    host: &str,
    count: u32,
    timeout: Duration,
) -> Result<()> {
    let outcome = diag.ping_host(host, count, timeout).await;

    match cli.format {
        OutputFormat::Text => {
            if !outcome.output.is_empty() {
                println!("{}", outcome.output);
                println!();
            }
            match (outcome.reachable, outcome.round_trip_ms()) {
                (true, Some(ms)) => println!("{} is reachable ({:.1}ms)", host, ms),
                (true, None) => println!("{} is reachable", host),
                (false, _) => println!("{} is unreachable", host),
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": host,
                    "reachable": outcome.reachable,
                    "roundTripMs": outcome.round_trip_ms(),
                    "output": outcome.output,
                })
            );
        }
    }

    Ok(())
}

async fn cmd_ping_list(
    cli: &Cli,
    diag: &Diagnostics,
    targets: &[String],
    count: u32,
    timeout: Duration,
    concurrency: usize,
) -> Result<()> {
    let hosts = targets::expand_targets(targets)?;
    tracing::debug!("Pinging {} hosts", hosts.len());

    let results = if concurrency > 1 {
        diag.ping_list_concurrent(&hosts, timeout, count, concurrency)
            .await
    } else {
        diag.ping_list(&hosts, timeout, count).await
    };

    match cli.format {
        OutputFormat::Text => {
            for host in &hosts {
                let state = match results.get(host) {
                    Some(true) => "up",
                    _ => "down",
                };
                println!("  {:<40} {}", host, state);
            }
            let up = results.values().filter(|&&r| r).count();
            println!();
            println!("{}/{} hosts reachable", up, results.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!(results));
        }
    }

    Ok(())
}

async fn cmd_online(cli: &Cli, diag: &Diagnostics, timeout: Duration) -> Result<()> {
    let online = diag.is_online(timeout).await;

    match cli.format {
        OutputFormat::Text => {
            if online {
                println!("Online");
            } else {
                println!(
                    "Offline (no answer from {})",
                    diag.config().online_servers.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "online": online }));
        }
    }

    Ok(())
}

async fn cmd_local_ip(cli: &Cli, diag: &Diagnostics) -> Result<()> {
    let ip = diag.get_local_ip().await;
    print_address(cli, "localIp", &ip.to_string());
    Ok(())
}

async fn cmd_public_ip(cli: &Cli, diag: &Diagnostics, timeout: Duration) -> Result<()> {
    let ip = diag.get_public_ip(timeout).await;
    print_address(cli, "publicIp", &ip.to_string());
    Ok(())
}

fn cmd_mac(cli: &Cli) -> Result<()> {
    let mac = get_mac_address();
    print_address(cli, "macAddress", &mac.to_string());
    Ok(())
}

fn print_address(cli: &Cli, key: &str, value: &str) {
    match cli.format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            let mut object = serde_json::Map::new();
            object.insert(key.to_string(), serde_json::Value::from(value));
            println!("{}", serde_json::Value::Object(object));
        }
    }
}

async fn cmd_port(
    cli: &Cli,
    diag: &Diagnostics,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<()> {
    let check = diag.check_port(host, port, timeout).await;

    match cli.format {
        OutputFormat::Text => println!("{}: {}", host, check.message),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": host,
                    "port": port,
                    "open": check.open,
                    "message": check.message,
                })
            );
        }
    }

    Ok(())
}

async fn cmd_scan(
    cli: &Cli,
    diag: &Diagnostics,
    host: &str,
    port_args: &[String],
    timeout: Duration,
    concurrency: usize,
) -> Result<()> {
    let ports = targets::parse_ports(port_args)?;

    let results: BTreeMap<u16, bool> = if concurrency > 1 {
        diag.scan_ports_concurrent(host, &ports, timeout, concurrency)
            .await
    } else {
        diag.scan_ports_list(host, &ports, timeout).await
    };

    match cli.format {
        OutputFormat::Text => {
            println!("Scanned {} ports on {}:", results.len(), host);
            println!();
            for (port, open) in &results {
                println!("  {:>5}/tcp  {}", port, if *open { "open" } else { "closed" });
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": host,
                    "ports": results,
                })
            );
        }
    }

    Ok(())
}

async fn cmd_free_ports(
    cli: &Cli,
    diag: &Diagnostics,
    host: &str,
    start: u16,
    end: u16,
    timeout: Duration,
    progress: bool,
) -> Result<()> {
    if start > end {
        tracing::warn!("Empty range: start port {} is after end port {}", start, end);
    }

    // Progress lines would corrupt JSON output
    let show_progress = progress && matches!(cli.format, OutputFormat::Text);
    let free = diag
        .free_port_scanner(host, start, end, timeout, show_progress)
        .await;

    match cli.format {
        OutputFormat::Text => {
            if show_progress {
                println!();
            }
            let total = usize::from(end.saturating_sub(start)) + usize::from(start <= end);
            println!("{}/{} ports free on {}:", free.len(), total, host);
            let list: Vec<String> = free.iter().map(|p| p.to_string()).collect();
            println!("  {}", list.join(", "));
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "host": host,
                    "start": start,
                    "end": end,
                    "free": free,
                })
            );
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, diag: &Diagnostics) -> Result<()> {
    let cfg = diag.config();
    let config_path = config::config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:        {}", config_path);
            println!("Loaded from:        {}", cfg.source);
            println!("Ping program:       {}", cfg.ping_program);
            println!("Online servers:     {}", cfg.online_servers.join(", "));
            println!(
                "TCP fallback port:  {}",
                cfg.tcp_fallback_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "Local IP probe:     {} ({}ms)",
                cfg.local_ip_probe,
                cfg.local_ip_timeout.as_millis()
            );
            println!("Public IP services:");
            for endpoint in &cfg.public_ip_endpoints {
                println!("  {:?}  {}", endpoint.format, endpoint.url);
            }
            println!();
            println!(
                "Default timeouts: ping {}s, online {}s, public IP {}s, port {}s",
                DEFAULT_PING_TIMEOUT.as_secs(),
                DEFAULT_ONLINE_TIMEOUT.as_secs(),
                DEFAULT_PUBLIC_IP_TIMEOUT.as_secs(),
                DEFAULT_PORT_TIMEOUT.as_secs()
            );
            println!();
            println!("Environment variables:");
            println!("  NETDIAG_PING_PROGRAM         - Override ping program");
            println!("  NETDIAG_ONLINE_SERVERS       - Comma-separated online check servers");
            println!("  NETDIAG_PUBLIC_IP_ENDPOINTS  - Comma-separated IP-echo URLs");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", config_json(cfg, &config_path));
        }
    }

    Ok(())
}

fn config_json(cfg: &Config, config_path: &str) -> serde_json::Value {
    serde_json::json!({
        "configFile": config_path,
        "source": cfg.source.to_string(),
        "pingProgram": cfg.ping_program,
        "onlineServers": cfg.online_servers,
        "tcpFallbackPort": cfg.tcp_fallback_port,
        "localIpProbe": cfg.local_ip_probe.to_string(),
        "localIpTimeoutMs": cfg.local_ip_timeout.as_millis() as u64,
        "publicIpEndpoints": cfg.public_ip_endpoints,
    })
}
