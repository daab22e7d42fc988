//! Configuration types for the DDNS system
//!
//! Configuration is built once at startup and then only borrowed: the
//! `Reconciler`, providers and IP sources copy what they need out of it in
//! their constructors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default URL for the HTTP IP source
pub const DEFAULT_IP_SOURCE_URL: &str = "https://api.ipify.org?format=json";

/// Default request timeout for the HTTP IP source (in seconds)
pub const DEFAULT_IP_SOURCE_TIMEOUT_SECS: u64 = 10;

/// Default request timeout for provider API calls (in seconds)
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Main DDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// IP source configuration
    pub ip_source: IpSourceConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// The record to keep in sync
    pub record: RecordConfig,
}

impl DdnsConfig {
    /// Create a new configuration with default IP source and provider
    pub fn new(record: RecordConfig) -> Self {
        Self {
            ip_source: IpSourceConfig::default(),
            provider: ProviderConfig::default(),
            record,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.record.validate()?;
        self.provider.validate()?;
        self.ip_source.validate()?;

        Ok(())
    }
}

/// IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// HTTP-based IP source (uses external service)
    Http {
        /// URL to fetch IP from
        url: String,
        /// Request timeout in seconds
        #[serde(default = "default_ip_source_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom IP source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http { url, timeout_secs } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP IP source URL cannot be empty"));
                }
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "HTTP IP source URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("HTTP IP source timeout must be > 0"));
                }
                Ok(())
            }
            IpSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom IP source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom IP source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Http { .. } => "http",
            IpSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            url: DEFAULT_IP_SOURCE_URL.to_string(),
            timeout_secs: DEFAULT_IP_SOURCE_TIMEOUT_SECS,
        }
    }
}

/// Cloudflare API credentials
///
/// The Debug implementation never prints the secret part.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CloudflareCredentials {
    /// Scoped API token (`Authorization: Bearer ...`)
    ApiToken { api_token: String },

    /// Legacy global API key (`X-Auth-Email` + `X-Auth-Key`)
    GlobalKey { email: String, api_key: String },
}

impl CloudflareCredentials {
    fn validate(&self) -> Result<(), crate::Error> {
        match self {
            CloudflareCredentials::ApiToken { api_token } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
            }
            CloudflareCredentials::GlobalKey { email, api_key } => {
                if email.is_empty() || !email.contains('@') {
                    return Err(crate::Error::config(
                        "Cloudflare account email must be a valid address",
                    ));
                }
                if api_key.is_empty() {
                    return Err(crate::Error::config("Cloudflare API key cannot be empty"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CloudflareCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudflareCredentials::ApiToken { .. } => f
                .debug_struct("ApiToken")
                .field("api_token", &"<REDACTED>")
                .finish(),
            CloudflareCredentials::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("email", email)
                .field("api_key", &"<REDACTED>")
                .finish(),
        }
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// API credentials
        credentials: CloudflareCredentials,
        /// Override of the API base URL (tests, proxies)
        #[serde(default)]
        api_base_url: Option<String>,
        /// Request timeout in seconds
        #[serde(default = "default_provider_timeout_secs")]
        timeout_secs: u64,
        /// Perform lookups but skip every mutating call
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                credentials,
                api_base_url,
                timeout_secs,
                ..
            } => {
                credentials.validate()?;
                if let Some(url) = api_base_url
                    && !url.starts_with("https://")
                    && !url.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "Cloudflare API base URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Provider timeout must be > 0"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            credentials: CloudflareCredentials::ApiToken {
                api_token: String::new(),
            },
            api_base_url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            dry_run: false,
        }
    }
}

/// The managed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Zone (registered domain) that holds the record, e.g. "example.com"
    pub zone_name: String,

    /// Fully-qualified record name, e.g. "home.example.com"
    pub name: String,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(zone_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
            name: name.into(),
        }
    }

    /// Copy with the root-label dot removed from fully-qualified names
    ///
    /// `home.example.com.` and `home.example.com` name the same record; the
    /// provider API only understands the latter.
    pub fn normalized(&self) -> Self {
        Self {
            zone_name: strip_root_dot(&self.zone_name).to_string(),
            name: strip_root_dot(&self.name).to_string(),
        }
    }

    /// Validate both names and check that the record lies inside the zone
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.zone_name)?;
        validate_domain_name(&self.name)?;

        let zone = strip_root_dot(&self.zone_name).to_ascii_lowercase();
        let name = strip_root_dot(&self.name).to_ascii_lowercase();
        if name != zone && !name.ends_with(&format!(".{}", zone)) {
            return Err(crate::Error::config(format!(
                "Record '{}' is not inside zone '{}'",
                self.name, self.zone_name
            )));
        }

        Ok(())
    }
}

fn strip_root_dot(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors. A single trailing dot
/// (fully-qualified form) is accepted.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    let domain = strip_root_dot(domain);
    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        // Underscore is allowed for service-style labels
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

fn default_ip_source_timeout_secs() -> u64 {
    DEFAULT_IP_SOURCE_TIMEOUT_SECS
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}
