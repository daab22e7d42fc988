//! One-shot DNS reconciler
//!
//! The Reconciler is responsible for:
//! - Obtaining the desired IP from an IpSource
//! - Reading the provider's current view of the managed record
//! - Deciding the minimal mutation that converges the two
//! - Executing that mutation through the DnsProvider
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  IpSource   │─── desired IP ──────┐
//! └─────────────┘                     │
//!                                     ▼
//!                            ┌──────────────┐
//!                            │  Reconciler  │
//!                            └──────────────┘
//!                                     │
//!                     ┌───────────────┴───────────────┐
//!                     │                               │
//!                     ▼                               ▼
//!           ┌──────────────┐                 ┌─────────────┐
//!           │ DnsProvider  │                 │   Events    │
//!           │ (read/write) │                 │  (report)   │
//!           └──────────────┘                 └─────────────┘
//! ```
//!
//! ## Decision Procedure
//!
//! 1. Fetch desired IP (abort on failure, no provider call made)
//! 2. Resolve zone (abort if missing or lookup fails)
//! 3. Query the `A` record (abort if the query fails)
//! 4. Record present and current → no-op
//! 5. Record absent → best-effort removal of a conflicting `CNAME`
//! 6. Otherwise → update the stale record, or create a new one
//!
//! Every successful run leaves the record pointing at the desired IP.

use crate::config::{DdnsConfig, RecordConfig};
use crate::error::{Error, Result};
use crate::traits::{
    DnsProvider, IpSource, RecordId, RecordLookup, RecordType, UpsertOutcome, ZoneId,
};
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Capacity of the event channel
///
/// A single run emits well under this many events.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Events emitted by the Reconciler
///
/// Events carry everything the caller needs for user-facing reporting, so
/// the decision procedure itself never prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Run started
    Started { record_name: String },

    /// Desired IP obtained from the IP source
    DesiredIpResolved { ip: Ipv4Addr, source: &'static str },

    /// Zone resolved to its provider ID
    ZoneResolved { zone_name: String, zone_id: ZoneId },

    /// The provider returned several records where one was expected;
    /// the first one was used
    AmbiguousRecords {
        record_type: RecordType,
        matches: usize,
        selected: RecordId,
    },

    /// Record already points at the desired IP
    RecordUnchanged { record_name: String, ip: Ipv4Addr },

    /// A `CNAME` with the managed name blocks creation of the `A` record
    ConflictFound { record_id: RecordId, target: String },

    /// The conflicting `CNAME` was deleted
    ConflictRemoved { record_id: RecordId },

    /// Best-effort conflict cleanup failed; the upsert is still attempted
    ConflictCleanupFailed { error: String },

    /// Existing record was pointed at the desired IP
    RecordUpdated {
        record_id: RecordId,
        previous_content: String,
        new_ip: Ipv4Addr,
    },

    /// A new record was created
    RecordCreated { record_id: RecordId, new_ip: Ipv4Addr },

    /// Run aborted
    Failed { error: String, fatal: bool },
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record already pointed at the desired IP
    Unchanged { ip: Ipv4Addr },

    /// A stale record was updated in place
    Updated {
        record_id: RecordId,
        previous_content: String,
        new_ip: Ipv4Addr,
    },

    /// The record did not exist and was created
    Created {
        record_id: RecordId,
        new_ip: Ipv4Addr,
        /// ID of the conflicting `CNAME` removed beforehand, if any
        removed_conflict: Option<RecordId>,
    },
}

impl ReconcileOutcome {
    /// Whether the run changed provider state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ReconcileOutcome::Unchanged { .. })
    }
}

/// Reasons a run was aborted
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The IP source could not provide the desired address
    #[error("Could not determine public IP address: {0}")]
    IpUnavailable(#[source] Error),

    /// The provider has no zone with the configured name
    #[error("Zone '{0}' not found")]
    ZoneNotFound(String),

    /// Zone lookup failed at the transport level
    #[error("Failed to resolve zone '{zone}': {source}")]
    ZoneLookup {
        zone: String,
        #[source]
        source: Error,
    },

    /// The `A` record query failed
    #[error("Failed to query record '{record_name}': {source}")]
    RecordLookup {
        record_name: String,
        #[source]
        source: Error,
    },

    /// Create or update failed
    #[error("Failed to set record '{record_name}' to {ip}: {source}")]
    Upsert {
        record_name: String,
        ip: Ipv4Addr,
        #[source]
        source: Error,
    },
}

impl ReconcileError {
    /// Whether the error is one of the fatal upstream conditions
    /// (no public IP, zone not resolvable)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::IpUnavailable(_)
                | ReconcileError::ZoneNotFound(_)
                | ReconcileError::ZoneLookup { .. }
        )
    }
}

/// One-shot DNS reconciler
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::reconcile()`] once per scheduled invocation
/// 3. Drain the event receiver for reporting
///
/// No state survives between calls: each run re-derives the record's state
/// from the provider.
pub struct Reconciler {
    /// IP source for the desired address
    ip_source: Box<dyn IpSource>,

    /// DNS provider gateway
    provider: Box<dyn DnsProvider>,

    /// The managed record
    record: RecordConfig,

    /// Event sender for external reporting
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// the events of every subsequent run
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn DnsProvider>,
        config: &DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.record.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let reconciler = Self {
            ip_source,
            provider,
            record: config.record.normalized(),
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Run one read-compare-write cycle
    pub async fn reconcile(&self) -> std::result::Result<ReconcileOutcome, ReconcileError> {
        self.emit_event(ReconcileEvent::Started {
            record_name: self.record.name.clone(),
        });

        let result = self.reconcile_inner().await;

        if let Err(ref e) = result {
            self.emit_event(ReconcileEvent::Failed {
                error: e.to_string(),
                fatal: e.is_fatal(),
            });
        }

        result
    }

    async fn reconcile_inner(&self) -> std::result::Result<ReconcileOutcome, ReconcileError> {
        let record_name = self.record.name.as_str();

        let desired_ip = self
            .ip_source
            .current()
            .await
            .map_err(ReconcileError::IpUnavailable)?;
        debug!("Desired IP for {}: {}", record_name, desired_ip);
        self.emit_event(ReconcileEvent::DesiredIpResolved {
            ip: desired_ip,
            source: self.ip_source.source_name(),
        });

        let zone_id = self.resolve_zone().await?;

        let current = self
            .provider
            .find_record(&zone_id, record_name, RecordType::A)
            .await
            .map_err(|source| ReconcileError::RecordLookup {
                record_name: record_name.to_string(),
                source,
            })?;
        self.note_ambiguity(RecordType::A, &current);

        match current {
            RecordLookup::Found { record, .. } if record.points_to(desired_ip) => {
                debug!("{} already points at {}", record_name, desired_ip);
                self.emit_event(ReconcileEvent::RecordUnchanged {
                    record_name: record_name.to_string(),
                    ip: desired_ip,
                });
                Ok(ReconcileOutcome::Unchanged { ip: desired_ip })
            }
            RecordLookup::Found { record, .. } => {
                let outcome = self.upsert(&zone_id, Some(&record.id), desired_ip).await?;
                let record_id = outcome_record_id(outcome);
                self.emit_event(ReconcileEvent::RecordUpdated {
                    record_id: record_id.clone(),
                    previous_content: record.content.clone(),
                    new_ip: desired_ip,
                });
                Ok(ReconcileOutcome::Updated {
                    record_id,
                    previous_content: record.content,
                    new_ip: desired_ip,
                })
            }
            RecordLookup::Absent => {
                let removed_conflict = self.remove_conflicting_cname(&zone_id).await;
                let outcome = self.upsert(&zone_id, None, desired_ip).await?;
                let record_id = outcome_record_id(outcome);
                self.emit_event(ReconcileEvent::RecordCreated {
                    record_id: record_id.clone(),
                    new_ip: desired_ip,
                });
                Ok(ReconcileOutcome::Created {
                    record_id,
                    new_ip: desired_ip,
                    removed_conflict,
                })
            }
        }
    }

    async fn resolve_zone(&self) -> std::result::Result<ZoneId, ReconcileError> {
        let zone_name = self.record.zone_name.as_str();

        let zone_id = self
            .provider
            .resolve_zone(zone_name)
            .await
            .map_err(|source| ReconcileError::ZoneLookup {
                zone: zone_name.to_string(),
                source,
            })?
            .ok_or_else(|| ReconcileError::ZoneNotFound(zone_name.to_string()))?;

        self.emit_event(ReconcileEvent::ZoneResolved {
            zone_name: zone_name.to_string(),
            zone_id: zone_id.clone(),
        });
        Ok(zone_id)
    }

    /// Delete a `CNAME` that shares the managed name
    ///
    /// Best-effort: a failed query or delete is reported as an event and the
    /// caller proceeds with the create. Returns the ID of the removed record.
    async fn remove_conflicting_cname(&self, zone_id: &ZoneId) -> Option<RecordId> {
        let record_name = self.record.name.as_str();

        let lookup = match self
            .provider
            .find_record(zone_id, record_name, RecordType::Cname)
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                debug!("CNAME lookup for {} failed: {}", record_name, e);
                self.emit_event(ReconcileEvent::ConflictCleanupFailed {
                    error: e.to_string(),
                });
                return None;
            }
        };
        self.note_ambiguity(RecordType::Cname, &lookup);

        let record = lookup.record()?;
        self.emit_event(ReconcileEvent::ConflictFound {
            record_id: record.id.clone(),
            target: record.content.clone(),
        });

        match self.provider.delete_record(zone_id, Some(&record.id)).await {
            Ok(()) => {
                self.emit_event(ReconcileEvent::ConflictRemoved {
                    record_id: record.id.clone(),
                });
                Some(record.id.clone())
            }
            Err(e) => {
                debug!("Deleting CNAME {} failed: {}", record.id, e);
                self.emit_event(ReconcileEvent::ConflictCleanupFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn upsert(
        &self,
        zone_id: &ZoneId,
        existing: Option<&RecordId>,
        desired_ip: Ipv4Addr,
    ) -> std::result::Result<UpsertOutcome, ReconcileError> {
        let record_name = self.record.name.as_str();

        self.provider
            .upsert_record(zone_id, existing, record_name, desired_ip)
            .await
            .map_err(|source| ReconcileError::Upsert {
                record_name: record_name.to_string(),
                ip: desired_ip,
                source,
            })
    }

    fn note_ambiguity(&self, record_type: RecordType, lookup: &RecordLookup) {
        if lookup.is_ambiguous()
            && let RecordLookup::Found { record, matches } = lookup
        {
            self.emit_event(ReconcileEvent::AmbiguousRecords {
                record_type,
                matches: *matches,
                selected: record.id.clone(),
            });
        }
    }

    /// Emit a reconcile event
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping event: {:?}", event);
            }
            // Nobody is listening; reporting is optional
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn outcome_record_id(outcome: UpsertOutcome) -> RecordId {
    match outcome {
        UpsertOutcome::Updated { record_id } | UpsertOutcome::Created { record_id } => record_id,
    }
}
