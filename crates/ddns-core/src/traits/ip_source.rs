// # IP Source Trait
//
// Defines the interface for obtaining the desired IP address for a run.
//
// ## Implementations
//
// - HTTP-based: `ddns-ip-http` crate (ipify, icanhazip, ifconfig.me, ...)
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::IpSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     let desired_ip = source.current().await?;
//     println!("Public IP: {desired_ip}");
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for IP source implementations
///
/// An IP source answers one question per run: what is the caller's public
/// IPv4 address right now. The answer is treated as ground truth for the
/// whole run and is never re-fetched.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform a single request to their configured endpoint
/// - ✅ Parse the endpoint's response format
///
/// ## Forbidden Capabilities
/// - ❌ Perform DNS updates (use `DnsProvider`)
/// - ❌ Implement retry logic
/// - ❌ Cache an address between calls
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Addr)`: The current address
    /// - `Err(Error)`: If the address could not be determined
    async fn current(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Short name of the source (for logging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
