//! TCP port probing

use super::Diagnostics;
use crate::config::DEFAULT_PING_COUNT;
use crate::error::{ProbeError, ProbeResult};
use crate::runner::CommandRunner;
use colored::Colorize;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;

/// Message reported for every port of a host that did not answer the ping
pub const HOST_UNREACHABLE: &str = "Host unreachable";

/// Callback invoked after each port of a range scan with `(port, is_free)`
pub type PortProgressCallback = Box<dyn Fn(u16, bool) + Send + Sync>;

/// Result of probing a single port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortCheck {
    pub open: bool,
    pub message: String,
}

impl PortCheck {
    fn unreachable() -> Self {
        Self {
            open: false,
            message: HOST_UNREACHABLE.to_string(),
        }
    }
}

/// Open and immediately drop a TCP connection to `host:port`.
pub async fn try_connect(host: &str, port: u16, timeout: Duration) -> ProbeResult<()> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => Err(ProbeError::Connection {
            target: format!("{}:{}", host, port),
            source,
        }),
        Err(_) => Err(ProbeError::ConnectTimeout(format!("{}:{}", host, port))),
    }
}

impl<R: CommandRunner> Diagnostics<R> {
    /// Probe `host:port`, reporting why it is not open.
    ///
    /// The host must answer a ping first. A host that drops ICMP is reported
    /// as [`HOST_UNREACHABLE`] even if the port would accept connections.
    pub async fn check_port(&self, host: &str, port: u16, timeout: Duration) -> PortCheck {
        if !self.ping(host, timeout, DEFAULT_PING_COUNT).await {
            return PortCheck::unreachable();
        }

        match try_connect(host, port, timeout).await {
            Ok(()) => PortCheck {
                open: true,
                message: format!("{} is open", port),
            },
            Err(e) => {
                tracing::trace!("{}", e);
                PortCheck {
                    open: false,
                    message: format!("{} is closed", port),
                }
            }
        }
    }

    pub async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        self.check_port(host, port, timeout).await.open
    }

    /// Probe each port in turn.
    pub async fn scan_ports_list(
        &self,
        host: &str,
        ports: &[u16],
        timeout: Duration,
    ) -> BTreeMap<u16, bool> {
        let mut results = BTreeMap::new();
        for &port in ports {
            let open = self.is_port_open(host, port, timeout).await;
            results.insert(port, open);
        }
        results
    }

    /// [`scan_ports_list`](Self::scan_ports_list) with up to `concurrency` probes in flight.
    pub async fn scan_ports_concurrent(
        &self,
        host: &str,
        ports: &[u16],
        timeout: Duration,
        concurrency: usize,
    ) -> BTreeMap<u16, bool> {
        futures::stream::iter(ports.iter().copied())
            .map(|port| async move { (port, self.is_port_open(host, port, timeout).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Ports in `start_port..=end_port` for which [`is_port_open`](Self::is_port_open)
    /// is false, in ascending order.
    ///
    /// With `show_progress`, prints a colored Free/Used line per port.
    pub async fn free_port_scanner(
        &self,
        host: &str,
        start_port: u16,
        end_port: u16,
        timeout: Duration,
        show_progress: bool,
    ) -> Vec<u16> {
        let printer: Option<PortProgressCallback> = if show_progress {
            Some(Box::new(|port: u16, free: bool| println!("{}", progress_line(port, free))))
        } else {
            None
        };
        self.free_port_scanner_with_progress(host, start_port, end_port, timeout, printer)
            .await
    }

    /// [`free_port_scanner`](Self::free_port_scanner) reporting each port to a callback.
    pub async fn free_port_scanner_with_progress(
        &self,
        host: &str,
        start_port: u16,
        end_port: u16,
        timeout: Duration,
        on_progress: Option<PortProgressCallback>,
    ) -> Vec<u16> {
        let mut free_ports = Vec::new();

        for port in start_port..=end_port {
            let free = !self.is_port_open(host, port, timeout).await;
            if free {
                free_ports.push(port);
            }
            if let Some(ref callback) = on_progress {
                callback(port, free);
            }
        }

        tracing::debug!(
            "Checked {}-{} on {}: {} free",
            start_port,
            end_port,
            host,
            free_ports.len()
        );
        free_ports
    }
}

fn progress_line(port: u16, free: bool) -> String {
    if free {
        format!("Checked port {}  {}", port, "Free".bright_green())
    } else {
        format!("Checked port {}  {}", port, "Used".bright_red())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::probe::testing::FakeRunner;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn diagnostics(runner: FakeRunner) -> Diagnostics<FakeRunner> {
        Diagnostics::new(runner, Config::default())
    }

    /// A port that was just released and should refuse connections.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let diag = diagnostics(FakeRunner::answering(&["127.0.0.1"]));

        assert_eq!(
            diag.check_port("127.0.0.1", open, TIMEOUT).await,
            PortCheck {
                open: true,
                message: format!("{} is open", open),
            }
        );
        assert_eq!(
            diag.check_port("127.0.0.1", closed, TIMEOUT).await,
            PortCheck {
                open: false,
                message: format!("{} is closed", closed),
            }
        );
        assert!(diag.is_port_open("127.0.0.1", open, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_short_circuits() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let diag = diagnostics(FakeRunner::answering(&[]));

        let check = diag.check_port("127.0.0.1", open, TIMEOUT).await;
        assert_eq!(check, PortCheck::unreachable());
        assert_eq!(check.message, "Host unreachable");
        assert!(!diag.is_port_open("127.0.0.1", open, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_scan_ports_list() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let diag = diagnostics(FakeRunner::answering(&["127.0.0.1"]));
        let results = diag.scan_ports_list("127.0.0.1", &[open, closed], TIMEOUT).await;

        assert_eq!(results, BTreeMap::from([(open, true), (closed, false)]));
    }

    #[tokio::test]
    async fn test_scan_ports_list_keys_match_input() {
        let diag = diagnostics(FakeRunner::answering(&[]));
        let results = diag.scan_ports_list("192.0.2.1", &[22, 80, 443], TIMEOUT).await;

        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![22, 80, 443]);
        assert!(results.values().all(|open| !open));
    }

    #[tokio::test]
    async fn test_scan_ports_concurrent_matches_sequential() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let diag = diagnostics(FakeRunner::answering(&["127.0.0.1"]));
        let results = diag
            .scan_ports_concurrent("127.0.0.1", &[closed, open], TIMEOUT, 4)
            .await;

        assert_eq!(results, BTreeMap::from([(open, true), (closed, false)]));
    }

    #[tokio::test]
    async fn test_free_port_scanner_returns_ports_that_are_not_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let start = open.saturating_sub(1);
        let end = open.saturating_add(1);

        let diag = diagnostics(FakeRunner::answering(&["127.0.0.1"]));
        let free = diag
            .free_port_scanner("127.0.0.1", start, end, TIMEOUT, false)
            .await;

        assert!(!free.contains(&open));
        assert!(free.iter().all(|p| (start..=end).contains(p)));
        assert!(free.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_free_port_scanner_unreachable_host_is_all_free() {
        let diag = diagnostics(FakeRunner::answering(&[]));
        let free = diag
            .free_port_scanner("192.0.2.1", 1000, 1002, TIMEOUT, false)
            .await;
        assert_eq!(free, vec![1000, 1001, 1002]);
    }

    #[tokio::test]
    async fn test_free_port_scanner_empty_range() {
        let diag = diagnostics(FakeRunner::answering(&[]));
        let free = diag
            .free_port_scanner("192.0.2.1", 1002, 1000, TIMEOUT, true)
            .await;
        assert!(free.is_empty());
        assert!(diag.runner().pinged_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_free_port_scanner_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: PortProgressCallback =
            Box::new(move |port: u16, free: bool| sink.lock().unwrap().push((port, free)));

        let diag = diagnostics(FakeRunner::answering(&[]));
        diag.free_port_scanner_with_progress("192.0.2.1", 7, 9, TIMEOUT, Some(callback))
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(7, true), (8, true), (9, true)]
        );
    }

    #[tokio::test]
    async fn test_unbounded_timeout_on_closed_port() {
        let closed = closed_port().await;
        let diag = diagnostics(FakeRunner::answering(&["127.0.0.1"]));
        assert!(!diag.is_port_open("127.0.0.1", closed, Duration::MAX).await);
        assert_eq!(
            diag.free_port_scanner("127.0.0.1", closed, closed, Duration::MAX, false)
                .await,
            vec![closed]
        );
    }

    #[test]
    fn test_progress_line() {
        colored::control::set_override(false);
        assert_eq!(progress_line(1000, true), "Checked port 1000  Free");
        assert_eq!(progress_line(1001, false), "Checked port 1001  Used");
    }
}
