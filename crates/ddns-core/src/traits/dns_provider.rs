// # DNS Provider Trait
//
// Defines the gateway interface over a DNS provider's record-management API.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
// - Future: Route53, DigitalOcean, GoDaddy, etc.
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{DnsProvider, RecordLookup, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone = provider.resolve_zone("example.com").await?.expect("zone exists");
//     match provider.find_record(&zone, "home.example.com", RecordType::A).await? {
//         RecordLookup::Found { record, .. } => println!("{} -> {}", record.name, record.content),
//         RecordLookup::Absent => println!("no A record yet"),
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Provider TTL value meaning "automatic"
pub const AUTOMATIC_TTL: u32 = 1;

/// Provider-assigned zone identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-assigned record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// DNS record types this system reads
///
/// Only `A` is ever written; `Cname` is read so that a conflicting alias can
/// be removed before an `A` record is created under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as observed at the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// The record ID (provider-specific)
    pub id: RecordId,
    /// The record type
    pub record_type: RecordType,
    /// The fully-qualified record name
    pub name: String,
    /// Record content (an address for `A`, a target name for `CNAME`)
    pub content: String,
}

impl DnsRecord {
    /// Whether this record already points at `ip`
    ///
    /// Content that does not parse as an IPv4 address never matches, so a
    /// malformed record is treated as stale and overwritten.
    pub fn points_to(&self, ip: Ipv4Addr) -> bool {
        self.content.trim().parse::<Ipv4Addr>().ok() == Some(ip)
    }
}

/// Result of a record query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    /// At least one record matched
    Found {
        /// The first match, in provider order
        record: DnsRecord,
        /// Total number of matches returned by the provider
        matches: usize,
    },
    /// No record matched (not an error)
    Absent,
}

impl RecordLookup {
    /// Build a lookup result from the provider's list of matches
    pub fn from_matches(records: Vec<DnsRecord>) -> Self {
        let matches = records.len();
        match records.into_iter().next() {
            Some(record) => RecordLookup::Found { record, matches },
            None => RecordLookup::Absent,
        }
    }

    /// The selected record, if any
    pub fn record(&self) -> Option<&DnsRecord> {
        match self {
            RecordLookup::Found { record, .. } => Some(record),
            RecordLookup::Absent => None,
        }
    }

    /// Whether the provider returned more than one match
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RecordLookup::Found { matches, .. } if *matches > 1)
    }
}

/// Result of an upsert operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// An existing record was overwritten
    Updated { record_id: RecordId },
    /// A new record was created
    Created { record_id: RecordId },
}

/// Trait for DNS provider implementations
///
/// This is a thin gateway over a provider's record API. It holds no business
/// logic: deciding *whether* to create, update or delete is owned by the
/// `Reconciler`.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure as a value
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Cache state beyond single request
/// - ❌ Decide whether an update is needed (owned by `Reconciler`)
/// - ❌ Panic on any network, status or body failure
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up a zone by exact name
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ZoneId))`: The first matching zone
    /// - `Ok(None)`: The provider reported zero matching zones
    /// - `Err(Error)`: Transport, HTTP or body failure
    async fn resolve_zone(&self, zone_name: &str) -> Result<Option<ZoneId>, crate::Error>;

    /// Query records by exact name and type
    ///
    /// When several records match, the first one in provider order is
    /// selected and the total count is reported in `RecordLookup::Found`.
    async fn find_record(
        &self,
        zone_id: &ZoneId,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<RecordLookup, crate::Error>;

    /// Delete a record by ID
    ///
    /// Succeeds trivially when `record_id` is `None`, so callers may invoke
    /// cleanup unconditionally.
    async fn delete_record(
        &self,
        zone_id: &ZoneId,
        record_id: Option<&RecordId>,
    ) -> Result<(), crate::Error>;

    /// Create or update the `A` record for `record_name`
    ///
    /// Updates `existing` when given, creates a new record otherwise. Always
    /// writes type `A`, TTL automatic and proxied `false`.
    async fn upsert_record(
        &self,
        zone_id: &ZoneId,
        existing: Option<&RecordId>,
        record_name: &str,
        content: Ipv4Addr,
    ) -> Result<UpsertOutcome, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
