//! Local and public IPv4 discovery

use super::Diagnostics;
use crate::config::{EchoEndpoint, EchoFormat};
use crate::error::{ProbeError, ProbeResult};
use crate::runner::CommandRunner;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// JSON body of echo services such as `api.ipify.org?format=json`
#[derive(Debug, Deserialize)]
struct EchoJson {
    ip: Option<String>,
}

/// Extract the IPv4 address from an echo service response body.
///
/// JSON bodies that fail to parse are treated as plain text.
pub fn parse_echo_body(body: &str, format: EchoFormat) -> ProbeResult<Ipv4Addr> {
    let body = body.trim();

    let candidate = match format {
        EchoFormat::Json => match serde_json::from_str::<EchoJson>(body) {
            Ok(EchoJson { ip: Some(ip) }) => ip,
            Ok(EchoJson { ip: None }) => {
                return Err(ProbeError::Parse("JSON response has no ip field".to_string()));
            }
            Err(_) => body.to_string(),
        },
        EchoFormat::Text => body.to_string(),
    };

    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(ProbeError::Parse("empty response".to_string()));
    }

    candidate
        .parse::<Ipv4Addr>()
        .map_err(|_| ProbeError::Parse(format!("{:?} is not an IPv4 address", candidate)))
}

async fn fetch_echo(client: &reqwest::Client, endpoint: &EchoEndpoint) -> ProbeResult<Ipv4Addr> {
    let body = client
        .get(&endpoint.url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_echo_body(&body, endpoint.format)
}

impl<R: CommandRunner> Diagnostics<R> {
    /// Address of the interface that routes towards the configured probe.
    ///
    /// UDP `connect` only selects a route; no packet leaves the machine.
    pub async fn try_get_local_ip(&self) -> ProbeResult<Ipv4Addr> {
        let probe = self.config.local_ip_probe;

        let discover = async {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
            socket.connect(probe).await?;
            socket.local_addr()
        };

        let local = match tokio::time::timeout(self.config.local_ip_timeout, discover).await {
            Ok(Ok(addr)) => addr,
            Ok(Err(source)) => {
                return Err(ProbeError::Connection {
                    target: probe.to_string(),
                    source,
                });
            }
            Err(_) => return Err(ProbeError::ConnectTimeout(probe.to_string())),
        };

        match local.ip() {
            IpAddr::V4(ip) => Ok(ip),
            IpAddr::V6(ip) => Err(ProbeError::Parse(format!(
                "local address {} is not IPv4",
                ip
            ))),
        }
    }

    /// Local outbound IPv4 address, or `0.0.0.0` on any failure.
    pub async fn get_local_ip(&self) -> Ipv4Addr {
        self.try_get_local_ip().await.unwrap_or_else(|e| {
            tracing::debug!("Local IP discovery failed: {}", e);
            Ipv4Addr::UNSPECIFIED
        })
    }

    /// Ask each configured echo service in turn; the first valid IPv4 answer wins.
    pub async fn try_get_public_ip(&self, timeout: Duration) -> ProbeResult<Ipv4Addr> {
        // Binding the IPv4 wildcard keeps dual-stack echo services from
        // answering with our IPv6 address.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .build()?;

        let mut last_error = None;
        for endpoint in &self.config.public_ip_endpoints {
            match fetch_echo(&client, endpoint).await {
                Ok(ip) => {
                    tracing::debug!("Public IP {} from {}", ip, endpoint.url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::debug!("IP echo {} failed: {}", endpoint.url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProbeError::Parse("no public IP endpoints configured".to_string())))
    }

    /// Public IPv4 address, or `0.0.0.0` when every echo service fails.
    pub async fn get_public_ip(&self, timeout: Duration) -> Ipv4Addr {
        self.try_get_public_ip(timeout).await.unwrap_or_else(|e| {
            tracing::debug!("Public IP discovery failed: {}", e);
            Ipv4Addr::UNSPECIFIED
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::probe::testing::FakeRunner;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `status` and `body` to every connection; returns the base URL.
    async fn echo_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut request = Vec::new();
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    fn with_endpoints(endpoints: Vec<EchoEndpoint>) -> Diagnostics<FakeRunner> {
        let config = Config {
            public_ip_endpoints: endpoints,
            ..Config::default()
        };
        Diagnostics::new(FakeRunner::default(), config)
    }

    #[test]
    fn test_parse_json_body() {
        assert_eq!(
            parse_echo_body("{\"ip\":\"203.0.113.7\"}\n", EchoFormat::Json).unwrap(),
            Ipv4Addr::new(203, 0, 113, 7)
        );
        assert!(matches!(
            parse_echo_body("{\"address\":\"203.0.113.7\"}", EchoFormat::Json),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_json_body_falls_back_to_text() {
        assert_eq!(
            parse_echo_body("198.51.100.4", EchoFormat::Json).unwrap(),
            Ipv4Addr::new(198, 51, 100, 4)
        );
    }

    #[test]
    fn test_parse_text_body() {
        assert_eq!(
            parse_echo_body("  198.51.100.4\n", EchoFormat::Text).unwrap(),
            Ipv4Addr::new(198, 51, 100, 4)
        );
        assert!(parse_echo_body("", EchoFormat::Text).is_err());
        assert!(parse_echo_body("2001:db8::1", EchoFormat::Text).is_err());
        assert!(parse_echo_body("<html>rate limited</html>", EchoFormat::Text).is_err());
    }

    #[tokio::test]
    async fn test_local_ip_via_loopback_probe() {
        let config = Config {
            local_ip_probe: "127.0.0.1:9".parse().unwrap(),
            ..Config::default()
        };
        let diag = Diagnostics::new(FakeRunner::default(), config);
        assert_eq!(diag.get_local_ip().await, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn test_local_ip_ipv6_probe_is_sentinel() {
        let config = Config {
            local_ip_probe: "[::1]:9".parse().unwrap(),
            ..Config::default()
        };
        let diag = Diagnostics::new(FakeRunner::default(), config);
        assert_eq!(diag.get_local_ip().await, Ipv4Addr::UNSPECIFIED);
    }

    #[tokio::test]
    async fn test_public_ip_from_json_endpoint() {
        let base = echo_server("200 OK", "{\"ip\":\"203.0.113.7\"}").await;
        let diag = with_endpoints(vec![EchoEndpoint::new(format!("{}/?format=json", base))]);

        assert_eq!(
            diag.get_public_ip(Duration::from_secs(2)).await,
            Ipv4Addr::new(203, 0, 113, 7)
        );
    }

    #[tokio::test]
    async fn test_public_ip_skips_failing_endpoints() {
        let broken = echo_server("500 Internal Server Error", "oops").await;
        let garbage = echo_server("200 OK", "not an address").await;
        let good = echo_server("200 OK", "198.51.100.4\n").await;

        let diag = with_endpoints(vec![
            EchoEndpoint::new(broken),
            EchoEndpoint::new(garbage),
            EchoEndpoint::new(good),
        ]);

        assert_eq!(
            diag.get_public_ip(Duration::from_secs(2)).await,
            Ipv4Addr::new(198, 51, 100, 4)
        );
    }

    #[tokio::test]
    async fn test_public_ip_sentinel_when_all_fail() {
        let empty = echo_server("200 OK", "").await;
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };

        let diag = with_endpoints(vec![EchoEndpoint::new(empty), EchoEndpoint::new(closed)]);

        assert_eq!(
            diag.get_public_ip(Duration::from_secs(2)).await,
            Ipv4Addr::UNSPECIFIED
        );
        assert!(diag.try_get_public_ip(Duration::from_secs(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_public_ip_without_endpoints() {
        let diag = with_endpoints(Vec::new());
        assert_eq!(
            diag.get_public_ip(Duration::from_secs(1)).await,
            Ipv4Addr::UNSPECIFIED
        );
    }
}
