// # ddns-core
//
// Core library for the one-shot DDNS reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping one DNS "A" record
// pointed at the caller's public IPv4 address:
// - **IpSource**: Trait for obtaining the desired (public) IP address
// - **DnsProvider**: Trait for reading and writing records via a provider API
// - **Reconciler**: Runs one read-compare-write cycle and reports what it did
// - **ProviderRegistry**: Plugin-based registry for providers and IP sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Decision logic lives here, provider plumbing elsewhere
// 2. **One-Shot**: Each reconcile call is independent; nothing is cached between runs
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: The binary is a thin wrapper around this crate
// 5. **Idempotency**: A second run with an unchanged IP performs no mutation

pub mod traits;
pub mod reconciler;
pub mod registry;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{IpSource, DnsProvider};
pub use reconciler::{Reconciler, ReconcileError, ReconcileEvent, ReconcileOutcome};
pub use registry::ProviderRegistry;
pub use config::{DdnsConfig, IpSourceConfig, ProviderConfig, RecordConfig};
pub use error::{Error, Result};
