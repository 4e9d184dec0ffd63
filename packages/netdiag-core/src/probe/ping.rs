//! Reachability checks using the system ping command

use super::Diagnostics;
use crate::config::DEFAULT_PING_COUNT;
use crate::error::{ProbeError, ProbeResult};
use crate::runner::CommandRunner;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Lower bound on how long the ping process may run
const MIN_PROCESS_DEADLINE: Duration = Duration::from_secs(10);
/// Slack on top of `count * timeout` before the process is killed
const PROCESS_DEADLINE_SLACK: Duration = Duration::from_secs(5);

/// Result of a single `ping_host` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingOutcome {
    pub reachable: bool,
    /// Ping output, or the reason the ping could not run
    pub output: String,
}

impl PingOutcome {
    fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            reachable: false,
            output: reason.into(),
        }
    }

    /// Round-trip time of the first reply, if the output reports one.
    pub fn round_trip_ms(&self) -> Option<f64> {
        parse_ping_time(&self.output)
    }
}

/// Build ping arguments for the target platform.
///
/// Windows takes the per-reply timeout in milliseconds, everything else in
/// whole seconds (rounded up, at least one).
pub(crate) fn ping_args(host: &str, count: u32, timeout: Duration, windows: bool) -> Vec<String> {
    if windows {
        vec![
            "-n".to_string(),
            count.to_string(),
            "-w".to_string(),
            timeout.as_millis().to_string(),
            host.to_string(),
        ]
    } else {
        let secs = timeout
            .as_secs()
            .saturating_add(u64::from(timeout.subsec_nanos() > 0));
        vec![
            "-c".to_string(),
            count.to_string(),
            "-W".to_string(),
            secs.max(1).to_string(),
            host.to_string(),
        ]
    }
}

/// Deadline for the whole ping process: `max(10s, count * timeout + 5s)`,
/// saturating at `Duration::MAX`.
pub(crate) fn process_deadline(count: u32, timeout: Duration) -> Duration {
    timeout
        .saturating_mul(count)
        .saturating_add(PROCESS_DEADLINE_SLACK)
        .max(MIN_PROCESS_DEADLINE)
}

/// First round-trip time in milliseconds reported by ping output.
///
/// Understands both `time=12.4 ms` (Unix) and `time<1ms`/`time=23ms` (Windows).
pub fn parse_ping_time(output: &str) -> Option<f64> {
    output.split_whitespace().find_map(|word| {
        let value = word
            .strip_prefix("time=")
            .or_else(|| word.strip_prefix("time<"))?;
        value.trim_end_matches("ms").parse().ok()
    })
}

impl<R: CommandRunner> Diagnostics<R> {
    /// Run the ping program once, surfacing why it could not run.
    pub async fn try_ping_host(
        &self,
        host: &str,
        count: u32,
        timeout: Duration,
    ) -> ProbeResult<PingOutcome> {
        let args = ping_args(host, count, timeout, cfg!(target_os = "windows"));
        let output = self
            .runner
            .run(
                &self.config.ping_program,
                &args,
                process_deadline(count, timeout),
            )
            .await?;

        Ok(PingOutcome {
            reachable: output.success,
            output: output.combined(),
        })
    }

    /// Ping `host` with `count` packets, waiting up to `timeout` per reply.
    ///
    /// Reachable iff the ping program exits with status zero. Never fails:
    /// a missing program, a hung process or any other error produce an
    /// unreachable outcome whose output names the reason.
    pub async fn ping_host(&self, host: &str, count: u32, timeout: Duration) -> PingOutcome {
        match self.try_ping_host(host, count, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let (ProbeError::ProcessUnavailable(_), Some(port)) =
                    (&e, self.config.tcp_fallback_port)
                {
                    return self.tcp_reachability(host, port, timeout).await;
                }
                tracing::debug!("Ping {} failed: {}", host, e);
                PingOutcome::unreachable(e.reason())
            }
        }
    }

    /// TCP stand-in for ping. A refused connection still proves the host is up.
    async fn tcp_reachability(&self, host: &str, port: u16, timeout: Duration) -> PingOutcome {
        match super::try_connect(host, port, timeout).await {
            Ok(()) => PingOutcome {
                reachable: true,
                output: format!("{} accepted a connection on tcp/{}", host, port),
            },
            Err(ProbeError::Connection { ref source, .. })
                if source.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                PingOutcome {
                    reachable: true,
                    output: format!("{} refused a connection on tcp/{}", host, port),
                }
            }
            Err(e) => {
                tracing::debug!("TCP reachability probe of {} failed: {}", host, e);
                PingOutcome::unreachable(e.reason())
            }
        }
    }

    /// Whether `host` answers within `timeout`.
    pub async fn ping(&self, host: &str, timeout: Duration, count: u32) -> bool {
        self.ping_host(host, count, timeout).await.reachable
    }

    /// Try each configured DNS server in order; true on the first that answers.
    pub async fn is_online(&self, timeout: Duration) -> bool {
        for server in &self.config.online_servers {
            if self.ping(server, timeout, DEFAULT_PING_COUNT).await {
                tracing::debug!("Online: {} answered", server);
                return true;
            }
        }
        tracing::debug!(
            "Offline: none of {} servers answered",
            self.config.online_servers.len()
        );
        false
    }

    /// Ping each host in turn.
    pub async fn ping_list<S: AsRef<str>>(
        &self,
        hosts: &[S],
        timeout: Duration,
        count: u32,
    ) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for host in hosts {
            let host = host.as_ref();
            let reachable = self.ping(host, timeout, count).await;
            results.insert(host.to_string(), reachable);
        }
        results
    }

    /// [`ping_list`](Self::ping_list) with up to `concurrency` pings in flight.
    pub async fn ping_list_concurrent<S: AsRef<str>>(
        &self,
        hosts: &[S],
        timeout: Duration,
        count: u32,
        concurrency: usize,
    ) -> BTreeMap<String, bool> {
        futures::stream::iter(hosts)
            .map(|host| {
                let host = host.as_ref().to_string();
                async move {
                    let reachable = self.ping(&host, timeout, count).await;
                    (host, reachable)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}
