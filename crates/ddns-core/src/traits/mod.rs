//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Obtain the desired (public) IP address
//! - [`DnsProvider`]: Read and write DNS records via provider APIs

pub mod ip_source;
pub mod dns_provider;

pub use ip_source::{IpSource, IpSourceFactory};
pub use dns_provider::{
    DnsProvider, DnsProviderFactory, DnsRecord, RecordId, RecordLookup, RecordType,
    UpsertOutcome, ZoneId, AUTOMATIC_TTL,
};
