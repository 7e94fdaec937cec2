//! # Activity Log
//!
//! Append-only, hash-chained record of every mutation. Each event's hash is
//! SHA-256 over the previous event's hash and the event's own fields, so
//! altering or removing an event breaks every later link.
//!
//! The chain is written through to the `audit_events` table when a database
//! is configured. Memory holds only the newest events, up to the log's
//! retention; evicted events stay in the database and the head hash is kept
//! so new events still link to them.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::records::AuditEventRecord;
use crate::state::AppState;

/// Events kept in memory when no retention is configured.
pub const DEFAULT_RETAINED_EVENTS: usize = 10_000;

/// Previous-hash value of the first event.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A mutation to be logged.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub organization_id: Option<Uuid>,
    pub resource_type: &'static str,
    pub resource_id: Uuid,
    pub action: &'static str,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// Platform-wide entry with no organization or metadata.
    pub fn new(resource_type: &'static str, resource_id: Uuid, action: &'static str) -> Self {
        Self {
            organization_id: None,
            resource_type,
            resource_id,
            action,
            metadata: serde_json::Value::Null,
        }
    }

    /// Scope the entry to an organization's activity feed.
    pub fn in_org(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Attach free-form JSON metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChainIntegrity {
    /// Events checked, i.e. those still held in memory.
    pub total_events: usize,
    /// Sequence of the oldest event checked; 0 when the log is empty.
    pub first_sequence: i64,
    /// Events whose `previous_hash` or `event_hash` does not check out.
    pub broken_links: usize,
    pub chain_valid: bool,
}

#[derive(Debug)]
struct Chain {
    events: VecDeque<AuditEventRecord>,
    /// Sequence and hash of the newest event, kept across eviction.
    head: Option<(i64, String)>,
    retain: usize,
}

impl Chain {
    fn push(&mut self, event: AuditEventRecord) {
        self.head = Some((event.sequence, event.event_hash.clone()));
        self.events.push_back(event);
        while self.events.len() > self.retain {
            self.events.pop_front();
        }
    }
}

/// Hash chain holding the newest events in memory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    chain: Arc<Mutex<Chain>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_EVENTS)
    }
}

impl AuditLog {
    /// Empty log with the default retention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log keeping at most `retain` events in memory (at least one).
    pub fn with_retention(retain: usize) -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain {
                events: VecDeque::new(),
                head: None,
                retain: retain.max(1),
            })),
        }
    }

    /// Append an event, linking it to the current head of the chain.
    pub fn append(&self, caller: &CallerIdentity, entry: AuditEntry) -> AuditEventRecord {
        let mut chain = self.chain.lock();
        let (sequence, previous_hash) = match &chain.head {
            Some((sequence, hash)) => (sequence + 1, hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };

        // Postgres keeps microseconds; hash what will survive a round trip.
        let created_at = Utc::now().trunc_subsecs(6);

        let mut event = AuditEventRecord {
            id: Uuid::new_v4(),
            sequence,
            actor_id: caller.user_id,
            actor_role: caller.role.as_str().to_string(),
            organization_id: entry.organization_id,
            resource_type: entry.resource_type.to_string(),
            resource_id: entry.resource_id,
            action: entry.action.to_string(),
            metadata: entry.metadata,
            previous_hash,
            event_hash: String::new(),
            created_at,
        };
        event.event_hash = event_hash(&event);
        chain.push(event.clone());
        event
    }

    /// Replace the chain with events loaded from storage, ordered by sequence.
    /// Only the newest events up to the retention stay in memory.
    pub fn restore(&self, mut loaded: Vec<AuditEventRecord>) {
        loaded.sort_by_key(|e| e.sequence);
        let mut chain = self.chain.lock();
        chain.events.clear();
        chain.head = None;
        for event in loaded {
            chain.push(event);
        }
    }

    /// Retained events for one organization, newest first.
    pub fn for_organization(&self, organization_id: Uuid) -> Vec<AuditEventRecord> {
        self.chain
            .lock()
            .events
            .iter()
            .rev()
            .filter(|e| e.organization_id == Some(organization_id))
            .cloned()
            .collect()
    }

    /// Events held in memory.
    pub fn len(&self) -> usize {
        self.chain.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every retained hash and check every retained link.
    ///
    /// The oldest retained event anchors the check once earlier events have
    /// been evicted; from the genesis event, its link must be the genesis hash.
    pub fn verify(&self) -> ChainIntegrity {
        let chain = self.chain.lock();
        let events = &chain.events;
        let mut broken_links = 0;
        let first_sequence = events.front().map_or(0, |e| e.sequence);
        let mut expected_previous = match events.front() {
            Some(first) if first.sequence > 1 => first.previous_hash.as_str(),
            _ => GENESIS_HASH,
        };

        for event in events.iter() {
            if event.previous_hash != expected_previous || event.event_hash != event_hash(event) {
                broken_links += 1;
            }
            expected_previous = event.event_hash.as_str();
        }

        ChainIntegrity {
            total_events: events.len(),
            first_sequence,
            broken_links,
            chain_valid: broken_links == 0,
        }
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, f: impl FnOnce(&mut AuditEventRecord)) {
        if let Some(event) = self.chain.lock().events.get_mut(index) {
            f(event);
        }
    }
}

fn event_hash(event: &AuditEventRecord) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        event.previous_hash,
        event.sequence,
        event.actor_id.map(|id| id.to_string()).unwrap_or_default(),
        event.actor_role,
        event
            .organization_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        event.resource_type,
        event.resource_id,
        event.action,
        timestamp(event.created_at),
        event.metadata,
    );
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Append an event to the chain and write it through to the database.
pub async fn record(
    state: &AppState,
    caller: &CallerIdentity,
    entry: AuditEntry,
) -> Result<(), AppError> {
    let event = state.audit.append(caller, entry);
    tracing::debug!(
        resource_type = %event.resource_type,
        resource_id = %event.resource_id,
        action = %event.action,
        sequence = event.sequence,
        "audit event recorded"
    );
    if let Some(pool) = &state.db_pool {
        crate::db::audit::insert(pool, &event)
            .await
            .map_err(|e| crate::db::persist_error("audit event", event.id, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn admin() -> CallerIdentity {
        CallerIdentity {
            role: Role::SuperAdmin,
            user_id: None,
        }
    }

    #[test]
    fn chain_links_events() {
        let log = AuditLog::new();
        let org = Uuid::new_v4();
        let first = log.append(&admin(), AuditEntry::new("framework", Uuid::new_v4(), "created"));
        let second = log.append(
            &admin(),
            AuditEntry::new("control", Uuid::new_v4(), "updated").in_org(org),
        );
        assert_eq!(first.previous_hash, GENESIS_HASH);
        assert_eq!(second.previous_hash, first.event_hash);
        assert_eq!(second.sequence, 2);
        assert_eq!(first.event_hash.len(), 64);
        assert!(log.verify().chain_valid);
        assert_eq!(log.for_organization(org).len(), 1);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let log = AuditLog::new();
        for _ in 0..3 {
            log.append(&admin(), AuditEntry::new("task", Uuid::new_v4(), "created"));
        }
        log.tamper(1, |e| e.action = "deleted".into());
        let integrity = log.verify();
        assert!(!integrity.chain_valid);
        assert_eq!(integrity.total_events, 3);
        assert_eq!(integrity.broken_links, 1);
    }

    #[test]
    fn restored_chain_verifies() {
        let log = AuditLog::new();
        log.append(
            &admin(),
            AuditEntry::new("evidence", Uuid::new_v4(), "created")
                .with_metadata(serde_json::json!({"title": "SOC 2 report"})),
        );
        log.append(&admin(), AuditEntry::new("evidence", Uuid::new_v4(), "deleted"));
        let mut events: Vec<_> = log.chain.lock().events.iter().cloned().collect();
        events.reverse();

        let restored = AuditLog::new();
        restored.restore(events);
        assert!(restored.verify().chain_valid);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn retention_evicts_oldest_and_keeps_linking() {
        let log = AuditLog::with_retention(3);
        let org = Uuid::new_v4();
        let mut appended = Vec::new();
        for _ in 0..5 {
            appended.push(log.append(
                &admin(),
                AuditEntry::new("task", Uuid::new_v4(), "created").in_org(org),
            ));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.for_organization(org).len(), 3);
        assert_eq!(appended[4].sequence, 5);
        assert_eq!(appended[4].previous_hash, appended[3].event_hash);

        let integrity = log.verify();
        assert!(integrity.chain_valid);
        assert_eq!(integrity.total_events, 3);
        assert_eq!(integrity.first_sequence, 3);

        log.tamper(1, |e| e.action = "deleted".into());
        assert!(!log.verify().chain_valid);
    }

    #[test]
    fn restore_keeps_newest_within_retention() {
        let source = AuditLog::new();
        for _ in 0..4 {
            source.append(&admin(), AuditEntry::new("control", Uuid::new_v4(), "updated"));
        }
        let events: Vec<_> = source.chain.lock().events.iter().cloned().collect();
        let last_hash = events[3].event_hash.clone();

        let restored = AuditLog::with_retention(2);
        restored.restore(events);
        assert_eq!(restored.len(), 2);
        assert!(restored.verify().chain_valid);

        let next = restored.append(&admin(), AuditEntry::new("control", Uuid::new_v4(), "deleted"));
        assert_eq!(next.sequence, 5);
        assert_eq!(next.previous_hash, last_hash);
    }
}
