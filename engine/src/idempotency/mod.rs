//! Idempotency stores.
//!
//! Two tables: a request-key store deduplicating mutating API calls, and a
//! message-dedup store for at-least-once event consumers. Request keys are
//! `(service, key, method, path_hash)`. First arrival writes a lock row; a
//! completed call stores its bounded response for the retention window and
//! replays it to duplicates. Expiry is clock-driven and enforced lazily on
//! access.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::clock::{Clock, SharedClock};

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long a lock row protects an in-flight request.
    pub lock_timeout: Duration,
    /// How long completed responses replay.
    pub retention: Duration,
    /// Largest response body that will be stored.
    pub max_response_size: usize,
    /// Verbs that participate in deduplication.
    pub methods: Vec<String>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            max_response_size: 64 * 1024,
            methods: ["POST", "PUT", "PATCH", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdempotencyError {
    #[error("Response body of {size} bytes exceeds the stored maximum {limit}")]
    ResponseTooLarge { size: usize, limit: usize },

    #[error("Lock token does not match a held lock")]
    UnknownLock,
}

/// Identity of one mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub service: String,
    pub key: String,
    pub method: String,
    pub path: String,
}

impl RequestKey {
    fn storage_key(&self) -> (String, String, String, String) {
        (
            self.service.clone(),
            self.key.clone(),
            self.method.to_uppercase(),
            path_hash(&self.path),
        )
    }
}

/// SHA-256 hex digest of a request path.
pub fn path_hash(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Stored response replayed to duplicate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

/// Token proving the caller holds the in-flight lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    key: (String, String, String, String),
}

/// Outcome of the first-contact check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Non-mutating verb; dedup does not apply.
    Bypass,
    /// First arrival; execute the request and complete or fail the token.
    Proceed(LockToken),
    /// Another holder is executing this key right now.
    InFlight,
    /// A completed response exists inside the retention window.
    Replay(StoredResponse),
}

enum Entry {
    Locked { at: DateTime<Utc> },
    Completed { response: StoredResponse },
}

/// Request-key dedup store.
pub struct IdempotencyStore {
    clock: SharedClock,
    config: IdempotencyConfig,
    entries: RwLock<HashMap<(String, String, String, String), Entry>>,
}

impl IdempotencyStore {
    pub fn new(clock: SharedClock, config: IdempotencyConfig) -> Self {
        Self {
            clock,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn lock_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.lock_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Check a request in. See `BeginOutcome`.
    pub fn begin(&self, request: &RequestKey) -> BeginOutcome {
        if !self
            .config
            .methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return BeginOutcome::Bypass;
        }

        let now = self.clock.now();
        let key = request.storage_key();
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(Entry::Locked { at }) if now - *at < self.lock_timeout() => BeginOutcome::InFlight,
            Some(Entry::Completed { response }) if now - response.stored_at < self.retention() => {
                BeginOutcome::Replay(response.clone())
            }
            // Absent, lock expired, or response aged out: take the lock.
            _ => {
                entries.insert(key.clone(), Entry::Locked { at: now });
                BeginOutcome::Proceed(LockToken { key })
            }
        }
    }

    /// Store the response under the lock; duplicates replay it until the
    /// retention window closes.
    pub fn complete(
        &self,
        token: LockToken,
        status: u16,
        body: Vec<u8>,
    ) -> Result<(), IdempotencyError> {
        if body.len() > self.config.max_response_size {
            // Too large to replay; release the lock so a retry re-executes.
            self.entries.write().remove(&token.key);
            return Err(IdempotencyError::ResponseTooLarge {
                size: body.len(),
                limit: self.config.max_response_size,
            });
        }
        let mut entries = self.entries.write();
        match entries.get(&token.key) {
            Some(Entry::Locked { .. }) => {
                entries.insert(
                    token.key,
                    Entry::Completed {
                        response: StoredResponse {
                            status,
                            body,
                            stored_at: self.clock.now(),
                        },
                    },
                );
                Ok(())
            }
            _ => Err(IdempotencyError::UnknownLock),
        }
    }

    /// Release the lock after a failed execution so the caller may retry.
    pub fn fail(&self, token: LockToken) {
        let mut entries = self.entries.write();
        if let Some(Entry::Locked { .. }) = entries.get(&token.key) {
            entries.remove(&token.key);
        }
    }

    /// Drop aged-out rows. Safe to call at any time.
    pub fn prune(&self) {
        let now = self.clock.now();
        let lock_timeout = self.lock_timeout();
        let retention = self.retention();
        self.entries.write().retain(|_, entry| match entry {
            Entry::Locked { at } => now - *at < lock_timeout,
            Entry::Completed { response } => now - response.stored_at < retention,
        });
    }
}

/// Consumer-side event dedup keyed by message id.
pub struct MessageDedupStore {
    clock: SharedClock,
    retention: chrono::Duration,
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MessageDedupStore {
    pub fn new(clock: SharedClock, retention: Duration) -> Self {
        Self {
            clock,
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// True exactly once per message id within the retention window.
    pub fn first_delivery(&self, message_id: &str) -> bool {
        let now = self.clock.now();
        let mut seen = self.seen.write();
        seen.retain(|_, at| now - *at < self.retention);
        match seen.get(message_id) {
            Some(_) => false,
            None => {
                seen.insert(message_id.to_string(), now);
                true
            }
        }
    }
}
