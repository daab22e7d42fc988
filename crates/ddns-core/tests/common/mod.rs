//! Test doubles and common utilities for reconciler contract tests
//!
//! The in-memory provider behaves like a real record store (creates assign
//! IDs, updates change content, deletes remove records) and records every
//! call so tests can assert on the exact sequence of provider traffic.

#![allow(dead_code)]

use ddns_core::config::{DdnsConfig, RecordConfig};
use ddns_core::error::{Error, Result};
use ddns_core::traits::{
    DnsProvider, DnsRecord, IpSource, RecordId, RecordLookup, RecordType, UpsertOutcome, ZoneId,
};
use ddns_core::{ReconcileEvent, Reconciler};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const ZONE_NAME: &str = "example.com";
pub const ZONE_ID: &str = "zone-1";
pub const RECORD_NAME: &str = "home.example.com";

/// A call observed by the in-memory provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ResolveZone(String),
    FindRecord {
        record_name: String,
        record_type: RecordType,
    },
    Delete(Option<RecordId>),
    Upsert {
        existing: Option<RecordId>,
        record_name: String,
        content: Ipv4Addr,
    },
}

impl ProviderCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ProviderCall::Delete(_) | ProviderCall::Upsert { .. })
    }
}

/// Provider operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ResolveZone,
    FindA,
    FindCname,
    Delete,
    Upsert,
}

#[derive(Default)]
struct ProviderState {
    zones: Vec<(String, ZoneId)>,
    records: Vec<DnsRecord>,
    calls: Vec<ProviderCall>,
    fail_points: HashSet<FailPoint>,
    next_id: usize,
}

/// A stateful in-memory DnsProvider that tracks calls
///
/// Clones share state, so a test can hand one clone to the reconciler and
/// keep another for assertions.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProvider {
    /// Provider that knows the test zone and holds no records
    pub fn with_zone() -> Self {
        let provider = Self::default();
        provider
            .state
            .lock()
            .unwrap()
            .zones
            .push((ZONE_NAME.to_string(), ZoneId::new(ZONE_ID)));
        provider
    }

    /// Provider with no zones at all
    pub fn without_zone() -> Self {
        Self::default()
    }

    /// Seed a record
    pub fn with_record(self, id: &str, record_type: RecordType, content: &str) -> Self {
        self.state.lock().unwrap().records.push(DnsRecord {
            id: RecordId::new(id),
            record_type,
            name: RECORD_NAME.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Make an operation fail
    pub fn failing_on(self, point: FailPoint) -> Self {
        self.state.lock().unwrap().fail_points.insert(point);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.calls().into_iter().filter(ProviderCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// All records of `record_type` with the managed name
    pub fn records_of(&self, record_type: RecordType) -> Vec<DnsRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.record_type == record_type && r.name == RECORD_NAME)
            .cloned()
            .collect()
    }

    /// Content of the single `A` record, if there is exactly one
    pub fn a_record_content(&self) -> Option<String> {
        match self.records_of(RecordType::A).as_slice() {
            [record] => Some(record.content.clone()),
            _ => None,
        }
    }

    fn fail(&self, point: FailPoint) -> Result<()> {
        if self.state.lock().unwrap().fail_points.contains(&point) {
            return Err(Error::provider("memory", format!("injected failure: {:?}", point)));
        }
        Ok(())
    }

    fn record(&self, call: ProviderCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait::async_trait]
impl DnsProvider for InMemoryProvider {
    async fn resolve_zone(&self, zone_name: &str) -> Result<Option<ZoneId>> {
        self.record(ProviderCall::ResolveZone(zone_name.to_string()));
        self.fail(FailPoint::ResolveZone)?;

        let state = self.state.lock().unwrap();
        Ok(state
            .zones
            .iter()
            .find(|(name, _)| name == zone_name)
            .map(|(_, id)| id.clone()))
    }

    async fn find_record(
        &self,
        _zone_id: &ZoneId,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<RecordLookup> {
        self.record(ProviderCall::FindRecord {
            record_name: record_name.to_string(),
            record_type,
        });
        self.fail(match record_type {
            RecordType::A => FailPoint::FindA,
            RecordType::Cname => FailPoint::FindCname,
        })?;

        let matches = self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.record_type == record_type && r.name == record_name)
            .cloned()
            .collect();
        Ok(RecordLookup::from_matches(matches))
    }

    async fn delete_record(&self, _zone_id: &ZoneId, record_id: Option<&RecordId>) -> Result<()> {
        self.record(ProviderCall::Delete(record_id.cloned()));
        let Some(record_id) = record_id else {
            return Ok(());
        };
        self.fail(FailPoint::Delete)?;

        self.state
            .lock()
            .unwrap()
            .records
            .retain(|r| &r.id != record_id);
        Ok(())
    }

    async fn upsert_record(
        &self,
        _zone_id: &ZoneId,
        existing: Option<&RecordId>,
        record_name: &str,
        content: Ipv4Addr,
    ) -> Result<UpsertOutcome> {
        self.record(ProviderCall::Upsert {
            existing: existing.cloned(),
            record_name: record_name.to_string(),
            content,
        });
        self.fail(FailPoint::Upsert)?;

        let mut state = self.state.lock().unwrap();
        match existing {
            Some(id) => {
                let record = state
                    .records
                    .iter_mut()
                    .find(|r| &r.id == id)
                    .ok_or_else(|| Error::not_found(format!("record {}", id)))?;
                record.content = content.to_string();
                Ok(UpsertOutcome::Updated { record_id: id.clone() })
            }
            None => {
                state.next_id += 1;
                let id = RecordId::new(format!("created-{}", state.next_id));
                state.records.push(DnsRecord {
                    id: id.clone(),
                    record_type: RecordType::A,
                    name: record_name.to_string(),
                    content: content.to_string(),
                });
                Ok(UpsertOutcome::Created { record_id: id })
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// IP source returning a fixed address and counting calls
#[derive(Clone)]
pub struct FixedIpSource {
    ip: Ipv4Addr,
    calls: Arc<AtomicUsize>,
}

impl FixedIpSource {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for FixedIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip)
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

/// IP source that always fails
pub struct FailingIpSource;

#[async_trait::async_trait]
impl IpSource for FailingIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        Err(Error::ip_source("lookup service unreachable"))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}

/// Configuration managing the test record
pub fn test_config() -> DdnsConfig {
    DdnsConfig::new(RecordConfig::new(ZONE_NAME, RECORD_NAME))
}

/// Build a reconciler over the given doubles
pub fn reconciler(
    ip_source: impl IpSource + 'static,
    provider: &InMemoryProvider,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::new(Box::new(ip_source), Box::new(provider.clone()), &test_config())
        .expect("reconciler construction succeeds")
}

/// Collect all events emitted so far
pub fn drain_events(rx: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("valid IPv4 literal")
}
