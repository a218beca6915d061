//! Append-only audit log. Every entry carries the SHA-256 of its content
//! chained to the previous entry, so edits and deletions are detectable.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

const GENESIS: &str = "genesis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub sequence: u64,
    pub tenant_id: Uuid,
    /// Platform user or staff member who performed the action.
    pub actor_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub event_hash: String,
    pub previous_hash: String,
}

impl AuditEvent {
    fn content(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.sequence,
            self.tenant_id,
            self.action,
            self.resource_type,
            self.resource_id,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.previous_hash,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub total_events: usize,
    pub valid_events: usize,
    pub tampered_sequences: Vec<u64>,
    pub chain_intact: bool,
}

struct ChainHead {
    sequence: u64,
    last_hash: String,
}

#[derive(Clone)]
pub struct AuditLogger {
    events: Arc<DashMap<u64, AuditEvent>>,
    head: Arc<Mutex<ChainHead>>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("events", &self.events.len())
            .finish()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(DashMap::new()),
            head: Arc::new(Mutex::new(ChainHead {
                sequence: 0,
                last_hash: GENESIS.to_string(),
            })),
        }
    }

    /// Appends an entry to the chain and returns it.
    pub fn log_action(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: impl ToString,
        details: serde_json::Value,
    ) -> AuditEvent {
        let mut head = self.head.lock();
        head.sequence += 1;
        let mut event = AuditEvent {
            id: Uuid::new_v4(),
            sequence: head.sequence,
            tenant_id,
            actor_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
            event_hash: String::new(),
            previous_hash: head.last_hash.clone(),
        };
        event.event_hash = sha256_hex(&event.content());
        head.last_hash = event.event_hash.clone();
        self.events.insert(event.sequence, event.clone());
        drop(head);

        info!(
            sequence = event.sequence,
            tenant_id = %tenant_id,
            action = %event.action,
            resource = %event.resource_type,
            "Audit event logged"
        );
        event
    }

    /// Newest-first entries for a tenant within an optional time window.
    pub fn query(
        &self,
        tenant_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        action: Option<&str>,
        limit: usize,
    ) -> Vec<AuditEvent> {
        let mut results: Vec<AuditEvent> = self
            .events
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && from.map_or(true, |f| e.timestamp >= f)
                    && to.map_or(true, |t| e.timestamp <= t)
                    && action.map_or(true, |a| e.action == a)
            })
            .map(|e| e.value().clone())
            .collect();
        results.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        results.truncate(limit);
        results
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Recomputes every hash and checks each link to its predecessor.
    pub fn verify_chain(&self) -> ChainVerification {
        let mut events: Vec<AuditEvent> = self.events.iter().map(|e| e.value().clone()).collect();
        events.sort_by_key(|e| e.sequence);

        let mut valid = 0;
        let mut tampered = Vec::new();
        let mut expected_prev = GENESIS.to_string();
        let mut expected_seq = 1;
        for event in &events {
            let intact = event.sequence == expected_seq
                && event.previous_hash == expected_prev
                && sha256_hex(&event.content()) == event.event_hash;
            if intact {
                valid += 1;
            } else {
                tampered.push(event.sequence);
            }
            expected_prev = event.event_hash.clone();
            expected_seq = event.sequence + 1;
        }

        let verification = ChainVerification {
            total_events: events.len(),
            valid_events: valid,
            chain_intact: tampered.is_empty(),
            tampered_sequences: tampered,
        };
        if !verification.chain_intact {
            warn!(tampered = ?verification.tampered_sequences, "Audit chain verification failed");
        }
        verification
    }

    #[cfg(test)]
    fn tamper(&self, sequence: u64, action: &str) {
        if let Some(mut event) = self.events.get_mut(&sequence) {
            event.action = action.to_string();
        }
    }

    #[cfg(test)]
    fn remove(&self, sequence: u64) {
        self.events.remove(&sequence);
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
