// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare implementation of the `DnsProvider`
// gateway for the DDNS reconciler.
//
// ## Implementation Status
//
// - ✅ One HTTP request per gateway operation
// - ✅ Full error propagation to the reconciler (no panics, no retries)
// - ✅ HTTP timeout configured (30 seconds by default)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 409, 429, 5xx)
// - ✅ Cloudflare envelope checking (`success: false` with a 2xx status)
// - ✅ Dry-run mode for safe testing
// - ✅ API token or global API key authentication
// - ❌ NO retry logic (a failed call aborts the run)
// - ❌ NO caching (every run re-reads the provider)
// - ❌ NO background tasks
//
// ## Security Constraints
//
// - API token / key NEVER appears in logs or Debug output
// - Provider MUST fail fast if credentials are empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns_core::config::{CloudflareCredentials, ProviderConfig};
use ddns_core::traits::{
    AUTOMATIC_TTL, DnsProvider, DnsProviderFactory, DnsRecord, RecordId, RecordLookup, RecordType,
    UpsertOutcome, ZoneId,
};
use ddns_core::{Error, ProviderRegistry, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Record ID reported for creates skipped in dry-run mode
const DRY_RUN_RECORD_ID: &str = "dry-run";

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CloudflareApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RecordResult {
    id: String,
    name: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct IdResult {
    id: String,
}

/// Body of POST/PUT record requests
#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended POST/PUT/DELETE and its payload
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose credentials.
pub struct CloudflareProvider {
    /// API credentials
    /// ⚠️ NEVER log the secret part
    credentials: CloudflareCredentials,

    /// API base URL (overridable for tests)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider against the public API
    ///
    /// # Parameters
    ///
    /// - `credentials`: API token with Zone:DNS:Edit permissions, or global key
    /// - `timeout`: Per-request timeout
    /// - `dry_run`: If true, perform GET requests but skip mutations
    pub fn new(credentials: CloudflareCredentials, timeout: Duration, dry_run: bool) -> Result<Self> {
        Self::with_base_url(credentials, CLOUDFLARE_API_BASE, timeout, dry_run)
    }

    /// Create a provider in live mode with the default timeout
    pub fn new_live(credentials: CloudflareCredentials) -> Result<Self> {
        Self::new(credentials, DEFAULT_HTTP_TIMEOUT, false)
    }

    /// Create a provider in dry-run mode with the default timeout
    pub fn new_dry_run(credentials: CloudflareCredentials) -> Result<Self> {
        Self::new(credentials, DEFAULT_HTTP_TIMEOUT, true)
    }

    /// Create a provider against a custom API base URL
    pub fn with_base_url(
        credentials: CloudflareCredentials,
        base_url: impl Into<String>,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        match &credentials {
            CloudflareCredentials::ApiToken { api_token } if api_token.is_empty() => {
                return Err(Error::config("Cloudflare API token cannot be empty"));
            }
            CloudflareCredentials::GlobalKey { email, api_key }
                if email.is_empty() || api_key.is_empty() =>
            {
                return Err(Error::config(
                    "Cloudflare account email and API key cannot be empty",
                ));
            }
            _ => {}
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            dry_run,
        })
    }

    fn records_url(&self, zone_id: &ZoneId) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    fn record_url(&self, zone_id: &ZoneId, record_id: &RecordId) -> String {
        format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id)
    }

    /// Start a request with authentication attached
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json");

        match &self.credentials {
            CloudflareCredentials::ApiToken { api_token } => builder.bearer_auth(api_token),
            CloudflareCredentials::GlobalKey { email, api_key } => builder
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", api_key),
        }
    }

    /// Send a request and unwrap the Cloudflare envelope
    ///
    /// Every failure (transport, status, body, `success: false`) comes back
    /// as an `Error` naming `operation`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &error_text, operation));
        }

        let envelope: CloudflareResponse<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("{}: failed to parse response: {}", operation, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("{}: {}", operation, describe_errors(&envelope.errors)),
            ));
        }

        Ok(envelope.result)
    }
}

/// Map a non-2xx status to an error carrying the provider's payload
fn status_error(status: StatusCode, error_text: &str, operation: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid API credentials or insufficient permissions. Status: {} - {}",
            operation, status, error_text
        )),
        404 => Error::not_found(format!("{}: {} - {}", operation, status, error_text)),
        409 => Error::provider(
            "cloudflare",
            format!("{}: conflict. Status: {} - {}", operation, status, error_text),
        ),
        429 => Error::rate_limited(format!(
            "{}: rate limit exceeded. Status: {} - {}",
            operation, status, error_text
        )),
        500..=599 => Error::provider(
            "cloudflare",
            format!(
                "{}: Cloudflare server error (transient): {} - {}",
                operation, status, error_text
            ),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{}: {} - {}", operation, status, error_text),
        ),
    }
}

fn describe_errors(errors: &[CloudflareApiError]) -> String {
    if errors.is_empty() {
        return "request unsuccessful (no error details)".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// ```http
    /// GET /zones?name=example.com
    /// ```
    async fn resolve_zone(&self, zone_name: &str) -> Result<Option<ZoneId>> {
        tracing::debug!("Looking up zone ID for: {}", zone_name);

        let url = format!("{}/zones", self.base_url);
        let request = self.request(Method::GET, &url).query(&[("name", zone_name)]);
        let zones: Vec<ZoneResult> = self
            .send(request, "zone lookup")
            .await?
            .unwrap_or_default();

        let zone_id = zones.into_iter().next().map(|z| ZoneId::new(z.id));
        tracing::debug!("Zone {} resolved to {:?}", zone_name, zone_id);
        Ok(zone_id)
    }

    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com
    /// ```
    async fn find_record(
        &self,
        zone_id: &ZoneId,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<RecordLookup> {
        tracing::debug!(
            "Looking up record: {} (type: {})",
            record_name,
            record_type
        );

        let request = self
            .request(Method::GET, &self.records_url(zone_id))
            .query(&[("type", record_type.as_str()), ("name", record_name)]);
        let records: Vec<RecordResult> = self
            .send(request, "record lookup")
            .await?
            .unwrap_or_default();

        let records = records
            .into_iter()
            .map(|r| DnsRecord {
                id: RecordId::new(r.id),
                record_type,
                name: r.name,
                content: r.content,
            })
            .collect();
        Ok(RecordLookup::from_matches(records))
    }

    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn delete_record(&self, zone_id: &ZoneId, record_id: Option<&RecordId>) -> Result<()> {
        let Some(record_id) = record_id else {
            return Ok(());
        };

        let url = self.record_url(zone_id, record_id);
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        self.send::<IdResult>(self.request(Method::DELETE, &url), "record delete")
            .await?;
        tracing::debug!("Deleted DNS record {}", record_id);
        Ok(())
    }

    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id    (existing record)
    /// POST /zones/:zone_id/dns_records              (new record)
    /// {"type": "A", "name": "...", "content": "1.2.3.4", "ttl": 1, "proxied": false}
    /// ```
    async fn upsert_record(
        &self,
        zone_id: &ZoneId,
        existing: Option<&RecordId>,
        record_name: &str,
        content: Ipv4Addr,
    ) -> Result<UpsertOutcome> {
        let payload = RecordPayload {
            record_type: RecordType::A.as_str(),
            name: record_name,
            content: content.to_string(),
            ttl: AUTOMATIC_TTL,
            proxied: false,
        };

        let (method, url, operation) = match existing {
            Some(record_id) => (Method::PUT, self.record_url(zone_id, record_id), "record update"),
            None => (Method::POST, self.records_url(zone_id), "record create"),
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} request to {} with payload: {}",
                method,
                url,
                serde_json::to_string(&payload)?
            );
            return Ok(match existing {
                Some(record_id) => UpsertOutcome::Updated {
                    record_id: record_id.clone(),
                },
                None => UpsertOutcome::Created {
                    record_id: RecordId::new(DRY_RUN_RECORD_ID),
                },
            });
        }

        let result: Option<IdResult> = self
            .send(self.request(method, &url).json(&payload), operation)
            .await?;

        match existing {
            Some(record_id) => Ok(UpsertOutcome::Updated {
                record_id: result
                    .map(|r| RecordId::new(r.id))
                    .unwrap_or_else(|| record_id.clone()),
            }),
            None => {
                let created = result.ok_or_else(|| {
                    Error::provider("cloudflare", "record create: response has no result")
                })?;
                Ok(UpsertOutcome::Created {
                    record_id: RecordId::new(created.id),
                })
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                credentials,
                api_base_url,
                timeout_secs,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                let base_url = api_base_url.as_deref().unwrap_or(CLOUDFLARE_API_BASE);
                Ok(Box::new(CloudflareProvider::with_base_url(
                    credentials.clone(),
                    base_url,
                    Duration::from_secs(*timeout_secs),
                    *dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
