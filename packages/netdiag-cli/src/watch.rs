//! Continuous reachability monitoring
//!
//! Re-pings a set of hosts on an interval and reports every host whose state
//! changed since the previous round, until Ctrl+C or SIGTERM.

use crate::OutputFormat;
use anyhow::Result;
use netdiag_core::{CommandRunner, DEFAULT_PING_COUNT, Diagnostics};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::time::{Duration, interval};

/// One host changing state between rounds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub host: String,
    pub reachable: bool,
    /// `None` on the first round
    pub previous: Option<bool>,
}

/// Hosts whose reachability differs from `previous` (all hosts on the first round).
pub fn transitions(
    previous: &BTreeMap<String, bool>,
    current: &BTreeMap<String, bool>,
) -> Vec<Transition> {
    current
        .iter()
        .filter_map(|(host, &reachable)| {
            let before = previous.get(host).copied();
            (before != Some(reachable)).then(|| Transition {
                host: host.clone(),
                reachable,
                previous: before,
            })
        })
        .collect()
}

/// Run the watch loop until Ctrl+C or SIGTERM
pub async fn run_watch<R: CommandRunner>(
    diag: &Diagnostics<R>,
    hosts: &[String],
    every: Duration,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    run_watch_until(diag, hosts, every, timeout, format, shutdown_signal()).await?;
    Ok(())
}

/// Run the watch loop until `shutdown` resolves, returning the last known state.
///
/// `shutdown` is raced against both the wait between rounds and the round
/// itself, so a signal is never missed while pings are in flight.
pub async fn run_watch_until<R: CommandRunner>(
    diag: &Diagnostics<R>,
    hosts: &[String],
    every: Duration,
    timeout: Duration,
    format: OutputFormat,
    shutdown: impl Future<Output = ()>,
) -> Result<BTreeMap<String, bool>> {
    tracing::info!(
        "Watching {} hosts every {:.1}s (Ctrl+C to stop)",
        hosts.len(),
        every.as_secs_f64()
    );

    tokio::pin!(shutdown);
    let mut state: BTreeMap<String, bool> = BTreeMap::new();
    let mut ticker = interval(every);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let current = tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("Abandoning round in progress");
                break;
            }
            current = diag.ping_list(hosts, timeout, DEFAULT_PING_COUNT) => current,
        };

        for change in transitions(&state, &current) {
            report(&change, format);
        }
        state = current;
    }

    let up = state.values().filter(|&&r| r).count();
    tracing::info!("Watch stopped: {}/{} hosts reachable at last check", up, state.len());
    Ok(state)
}

fn report(change: &Transition, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            let state = if change.reachable { "UP" } else { "DOWN" };
            match change.previous {
                None => println!("{:<4} {}", state, change.host),
                Some(_) => println!("{:<4} {} (changed)", state, change.host),
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!(change));
        }
    }
}

/// Resolves on the first Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-Unix platforms only Ctrl+C stops the loop
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdiag_core::{CommandOutput, Config, ProbeResult};

    fn state(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries.iter().map(|(h, r)| (h.to_string(), *r)).collect()
    }

    #[test]
    fn test_first_round_reports_everything() {
        let changes = transitions(&BTreeMap::new(), &state(&[("a", true), ("b", false)]));
        assert_eq!(
            changes,
            vec![
                Transition {
                    host: "a".to_string(),
                    reachable: true,
                    previous: None,
                },
                Transition {
                    host: "b".to_string(),
                    reachable: false,
                    previous: None,
                },
            ]
        );
    }

    #[test]
    fn test_only_changes_are_reported() {
        let before = state(&[("a", true), ("b", false), ("c", true)]);
        let after = state(&[("a", true), ("b", true), ("c", false)]);

        let changes = transitions(&before, &after);
        let hosts: Vec<_> = changes.iter().map(|c| c.host.as_str()).collect();
        assert_eq!(hosts, vec!["b", "c"]);
        assert_eq!(changes[0].previous, Some(false));
        assert!(changes[0].reachable);
    }

    /// Ping that answers for `up` hosts after `delay`
    struct SlowRunner {
        delay: Duration,
        up: &'static [&'static str],
    }

    impl CommandRunner for SlowRunner {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> ProbeResult<CommandOutput> {
            tokio::time::sleep(self.delay).await;
            let host = args.last().cloned().unwrap_or_default();
            Ok(CommandOutput {
                success: self.up.contains(&host.as_str()),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn slow_diagnostics(delay: Duration, up: &'static [&'static str]) -> Diagnostics<SlowRunner> {
        Diagnostics::new(SlowRunner { delay, up }, Config::default())
    }

    #[tokio::test]
    async fn test_shutdown_during_round_stops_promptly() {
        let diag = slow_diagnostics(Duration::from_secs(60), &["a"]);
        let hosts = vec!["a".to_string()];

        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            run_watch_until(
                &diag,
                &hosts,
                Duration::from_secs(30),
                Duration::from_secs(1),
                OutputFormat::Json,
                tokio::time::sleep(Duration::from_millis(200)),
            ),
        )
        .await
        .expect("watch kept running after shutdown")
        .unwrap();

        // The only round was abandoned, so nothing was recorded
        assert!(stopped.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_between_rounds_keeps_last_state() {
        let diag = slow_diagnostics(Duration::from_millis(10), &["a"]);
        let hosts = vec!["a".to_string(), "b".to_string()];

        let stopped = run_watch_until(
            &diag,
            &hosts,
            Duration::from_secs(30),
            Duration::from_secs(1),
            OutputFormat::Json,
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .unwrap();

        assert_eq!(stopped, state(&[("a", true), ("b", false)]));
    }

    #[test]
    fn test_steady_state_is_quiet() {
        let s = state(&[("a", true)]);
        assert!(transitions(&s, &s).is_empty());
    }
}
