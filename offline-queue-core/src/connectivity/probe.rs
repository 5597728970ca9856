//! Reachability probes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

/// Timeout for a reachability probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the local gateway health check
pub const GATEWAY_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;

/// Media type DoH resolvers require for JSON answers
const DNS_JSON: &str = "application/dns-json";

/// A single reachability check
///
/// Implementations never fail: any error is an "offline" verdict.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns `true` if the target is reachable
    async fn probe(&self) -> bool;

    /// Human-readable description of what is probed
    fn target(&self) -> &str;
}

/// HTTP(S) probe: any 2xx response means reachable
///
/// DoH endpoints (path ending in `/dns-query`) are sent
/// `accept: application/dns-json`; other endpoints get no accept header.
pub struct HttpProbe {
    client: Client,
    url: String,
    accept: Option<&'static str>,
}

impl HttpProbe {
    /// Probe `url` with the default timeout
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        Self::with_timeout(url, PROBE_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        let url = url.into();
        let accept = is_doh_url(&url).then_some(DNS_JSON);
        Ok(Self {
            client,
            url,
            accept,
        })
    }

    /// Probe the local gateway's `/health` endpoint
    pub fn gateway(host: &str, port: u16) -> crate::Result<Self> {
        Self::with_timeout(
            format!("http://{}:{}/health", host, port),
            GATEWAY_PROBE_TIMEOUT,
        )
    }
}

fn is_doh_url(url: &str) -> bool {
    url.split(['?', '#'])
        .next()
        .map(|path| path.trim_end_matches('/').ends_with("/dns-query"))
        .unwrap_or(false)
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        let mut request = self.client.get(&self.url);
        if let Some(accept) = self.accept {
            request = request.header(header::ACCEPT, accept);
        }
        let result = request.send().await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("Probe {} returned {}", self.url, response.status());
                false
            }
            Err(e) => {
                debug!("Probe {} failed: {}", self.url, e);
                false
            }
        }
    }

    fn target(&self) -> &str {
        &self.url
    }
}

/// Check whether the local gateway answers its health endpoint
pub async fn check_gateway(host: &str, port: u16) -> bool {
    match HttpProbe::gateway(host, port) {
        Ok(probe) => probe.probe().await,
        Err(e) => {
            warn!("Gateway probe unavailable: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("accept", mockito::Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.url())).unwrap();
        assert!(probe.probe().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_doh_probe_sends_dns_json_accept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/dns-query")
            .match_query(mockito::Matcher::Any)
            .match_header("accept", "application/dns-json")
            .with_status(200)
            .create_async()
            .await;

        let probe =
            HttpProbe::new(format!("{}/dns-query?name=example.com&type=A", server.url())).unwrap();
        assert!(probe.probe().await);
        mock.assert_async().await;
    }

    #[test]
    fn test_doh_url_detection() {
        assert!(is_doh_url(
            "https://cloudflare-dns.com/dns-query?name=example.com&type=A"
        ));
        assert!(is_doh_url("https://dns.google/dns-query/"));
        assert!(!is_doh_url("http://127.0.0.1:18789/health"));
        assert!(!is_doh_url("https://api.example.com/v1/models?q=dns-query"));
    }

    #[tokio::test]
    async fn test_probe_non_success_is_offline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        let probe = HttpProbe::new(format!("{}/health", server.url())).unwrap();
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn test_probe_connection_error_is_offline() {
        let probe =
            HttpProbe::with_timeout("http://127.0.0.1:1/health", Duration::from_millis(500))
                .unwrap();
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn test_check_gateway() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("accept", mockito::Matcher::Missing)
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let address = server.host_with_port();
        let (host, port) = address.rsplit_once(':').unwrap();
        assert!(check_gateway(host, port.parse().unwrap()).await);
        mock.assert_async().await;
    }

    #[test]
    fn test_gateway_probe_target() {
        let probe = HttpProbe::gateway(DEFAULT_GATEWAY_HOST, DEFAULT_GATEWAY_PORT).unwrap();
        assert_eq!(probe.target(), "http://127.0.0.1:18789/health");
    }
}
