//! Step journal backing durable replay.
//!
//! Each run writes one entry per completed suspension point, in order. On
//! replay the cursor walks the journal positionally: a recorded entry is
//! returned instead of re-executing the step, and a mismatch between the
//! recorded step and the step the code is about to run is surfaced as a
//! non-determinism failure rather than silently diverging.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Activity,
    ChildWorkflow,
    Signal,
    Timer,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Activity => "activity",
            StepKind::ChildWorkflow => "child_workflow",
            StepKind::Signal => "signal",
            StepKind::Timer => "timer",
        }
    }
}

/// Recorded result of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepOutcome {
    Completed(serde_json::Value),
    Failed {
        code: String,
        message: String,
        retryable: bool,
    },
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub index: u32,
    pub kind: StepKind,
    /// Step name: activity name, child workflow name, signal name or "timer".
    pub key: String,
    /// SHA-256 of the serialized step input, used to catch replay divergence.
    pub input_fingerprint: String,
    pub outcome: StepOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Fingerprint a step input for divergence detection.
pub(crate) fn fingerprint(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Persistence seam for journals.
pub trait JournalStore: Send + Sync {
    fn append(&self, run_id: &str, entry: JournalEntry);

    fn entry_at(&self, run_id: &str, index: u32) -> Option<JournalEntry>;

    fn load(&self, run_id: &str) -> Vec<JournalEntry>;
}

/// Journal store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryJournalStore {
    runs: RwLock<HashMap<String, Vec<JournalEntry>>>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JournalStore for InMemoryJournalStore {
    fn append(&self, run_id: &str, entry: JournalEntry) {
        self.runs
            .write()
            .entry(run_id.to_string())
            .or_default()
            .push(entry);
    }

    fn entry_at(&self, run_id: &str, index: u32) -> Option<JournalEntry> {
        self.runs
            .read()
            .get(run_id)
            .and_then(|entries| entries.iter().find(|e| e.index == index).cloned())
    }

    fn load(&self, run_id: &str) -> Vec<JournalEntry> {
        self.runs.read().get(run_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_replay_in_order() {
        let store = InMemoryJournalStore::new();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for index in 0..3u32 {
            store.append(
                "run-1",
                JournalEntry {
                    index,
                    kind: StepKind::Activity,
                    key: format!("step-{index}"),
                    input_fingerprint: fingerprint(&serde_json::json!({ "i": index })),
                    outcome: StepOutcome::Completed(serde_json::json!(index)),
                    recorded_at: now,
                },
            );
        }

        assert_eq!(store.load("run-1").len(), 3);
        assert_eq!(store.entry_at("run-1", 1).unwrap().key, "step-1");
        assert!(store.entry_at("run-1", 9).is_none());
        assert!(store.load("run-other").is_empty());
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let a = fingerprint(&serde_json::json!({ "order_id": "ORD-1" }));
        let b = fingerprint(&serde_json::json!({ "order_id": "ORD-1" }));
        let c = fingerprint(&serde_json::json!({ "order_id": "ORD-2" }));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
