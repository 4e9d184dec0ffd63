//! Parsing of host and port arguments

use anyhow::{Context, Result, bail};
use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::time::Duration;

/// Upper bound on hosts produced by expanding CIDR blocks
pub const MAX_EXPANDED_HOSTS: usize = 1024;

/// Expand hosts and CIDR blocks into individual targets, keeping input order.
///
/// Network and broadcast addresses of IPv4 blocks wider than /31 are skipped.
pub fn expand_targets(targets: &[String]) -> Result<Vec<String>> {
    let mut hosts = Vec::new();

    for target in targets {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }

        if !target.contains('/') {
            hosts.push(target.to_string());
            continue;
        }

        let network: IpNetwork = target
            .parse()
            .with_context(|| format!("Failed to parse subnet {}", target))?;

        let skip_edges = matches!(network, IpNetwork::V4(net) if net.prefix() < 31);
        let host_bits = match network {
            IpNetwork::V4(net) => 32 - u32::from(net.prefix()),
            IpNetwork::V6(net) => 128 - u32::from(net.prefix()),
        };
        let size = if host_bits >= 127 { u128::MAX } else { 1u128 << host_bits };
        let usable = if skip_edges { size - 2 } else { size };
        if usable > MAX_EXPANDED_HOSTS.saturating_sub(hosts.len()) as u128 {
            bail!(
                "{} expands to {} hosts; at most {} targets are allowed",
                target,
                usable,
                MAX_EXPANDED_HOSTS
            );
        }

        let addrs: Vec<_> = network.iter().collect();
        let addrs = if skip_edges {
            &addrs[1..addrs.len() - 1]
        } else {
            &addrs[..]
        };
        hosts.extend(addrs.iter().map(|ip| ip.to_string()));
    }

    Ok(hosts)
}

/// Parse port lists such as `22`, `80,443` or `8000-8010`, deduplicated and sorted.
pub fn parse_ports(args: &[String]) -> Result<Vec<u16>> {
    let mut ports = BTreeSet::new();

    for arg in args {
        for part in arg.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_port(start)?;
                    let end = parse_port(end)?;
                    if start > end {
                        bail!("Invalid port range {}: start is after end", part);
                    }
                    ports.extend(start..=end);
                }
                None => {
                    ports.insert(parse_port(part)?);
                }
            }
        }
    }

    if ports.is_empty() {
        bail!("No ports given");
    }
    Ok(ports.into_iter().collect())
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .with_context(|| format!("Invalid port {:?}", value))
}

/// clap value parser for timeouts given in (fractional) seconds.
pub fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("{:?} is not a number of seconds", value))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}
