// # HTTP IP Source
//
// This crate provides the HTTP-based public IP source for the DDNS reconciler.
//
// ## Architecture
//
// Fetches the caller's public address from an external "what is my IP"
// service (e.g. api.ipify.org, ifconfig.me, icanhazip.com) with a single
// request per run. Two response shapes are understood:
//
// - plain text: `203.0.113.7\n`
// - JSON: `{"ip": "203.0.113.7"}` (ipify `?format=json` style)
//
// Only IPv4 answers are accepted.

use ddns_core::ProviderRegistry;
use ddns_core::config::{DEFAULT_IP_SOURCE_TIMEOUT_SECS, IpSourceConfig};
use ddns_core::traits::{IpSource, IpSourceFactory};
use ddns_core::{Error, Result};

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default request timeout for the IP lookup
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_IP_SOURCE_TIMEOUT_SECS);

/// JSON body returned by ipify-style services
#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// HTTP-based public IP source
#[derive(Debug)]
pub struct HttpIpSource {
    /// URL to fetch IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source with the default timeout
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch IP from (e.g., "https://api.ipify.org?format=json")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Create with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ip_source(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Fetch current IP from HTTP service
    async fn fetch_ip(&self) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::ip_source(format!("Request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_source(format!(
                "HTTP error from {}: {}",
                self.url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_source(format!("Failed to read response: {}", e)))?;

        parse_ipv4(&body)
    }
}

/// Extract an IPv4 address from a plain-text or JSON response body
fn parse_ipv4(body: &str) -> Result<Ipv4Addr> {
    let body = body.trim();

    let ip_text = if body.starts_with('{') {
        let parsed: IpResponse = serde_json::from_str(body)
            .map_err(|e| Error::ip_source(format!("Malformed JSON response: {}", e)))?;
        parsed.ip
    } else {
        body.to_string()
    };
    let ip_text = ip_text.trim();

    let ip: IpAddr = ip_text
        .parse()
        .map_err(|_| Error::ip_source(format!("Invalid IP address: {}", ip_text)))?;

    match ip {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(_) => Err(Error::ip_source(format!("Expected IPv4, got: {}", ip))),
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        let ip = self.fetch_ip().await?;
        tracing::debug!("Public IP from {}: {}", self.url, ip);
        Ok(ip)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP IP sources
pub struct HttpFactory;

impl IpSourceFactory for HttpFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Http { url, timeout_secs } => Ok(Box::new(HttpIpSource::with_timeout(
                url.clone(),
                Duration::from_secs(*timeout_secs),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP IP source")),
        }
    }
}

/// Register the HTTP IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source("http", Box::new(HttpFactory));
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_json_ip() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ip": "203.0.113.7"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = HttpIpSource::new(format!("{}/", mock_server.uri())).unwrap();
        let ip = assert_ok!(source.current().await);
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 7));
    }

    #[tokio::test]
    async fn test_fetch_plain_ip() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.2\n"))
            .mount(&mock_server)
            .await;

        let source = HttpIpSource::new(format!("{}/ip", mock_server.uri())).unwrap();
        let ip = assert_ok!(source.current().await);
        assert_eq!(ip, Ipv4Addr::new(198, 51, 100, 2));
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let source = HttpIpSource::new(mock_server.uri()).unwrap();
        let err = assert_err!(source.current().await);
        assert!(matches!(err, Error::IpSource(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("1.2.3.4")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let source =
            HttpIpSource::with_timeout(mock_server.uri(), Duration::from_millis(200)).unwrap();
        assert_err!(source.current().await);
    }
}
