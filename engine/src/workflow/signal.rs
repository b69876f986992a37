//! Typed signal delivery.
//!
//! Signals are named FIFO mailboxes addressed by workflow id (not run id, so
//! a retried run keeps its address). Payloads are delivered exactly as sent
//! and consumed in arrival order per name.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct Mailbox {
    queue: VecDeque<serde_json::Value>,
    notify: Arc<Notify>,
}

/// Routes signals to waiting workflows.
#[derive(Default)]
pub struct SignalRouter {
    mailboxes: Mutex<HashMap<(String, String), Mailbox>>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal payload; wakes a waiting receiver if any.
    pub fn send(&self, workflow_id: &str, name: &str, payload: serde_json::Value) {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes
            .entry((workflow_id.to_string(), name.to_string()))
            .or_default();
        mailbox.queue.push_back(payload);
        mailbox.notify.notify_one();
        debug!(workflow_id, signal = name, "signal delivered");
    }

    /// Pop the next payload for `(workflow_id, name)`, waiting up to
    /// `timeout`. Returns `None` on timeout.
    pub async fn receive(
        &self,
        workflow_id: &str,
        name: &str,
        timeout: Duration,
    ) -> Option<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = {
                let mut mailboxes = self.mailboxes.lock();
                let mailbox = mailboxes
                    .entry((workflow_id.to_string(), name.to_string()))
                    .or_default();
                if let Some(payload) = mailbox.queue.pop_front() {
                    return Some(payload);
                }
                Arc::clone(&mailbox.notify)
            };
            // A send between the lock release and this await stores a permit
            // in the Notify, so the wakeup cannot be lost.
            let wait = notify.notified();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            if tokio::time::timeout(remaining, wait).await.is_err() {
                return None;
            }
        }
    }

    /// Pending signal count, for tests.
    pub fn pending(&self, workflow_id: &str, name: &str) -> usize {
        self.mailboxes
            .lock()
            .get(&(workflow_id.to_string(), name.to_string()))
            .map(|m| m.queue.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signals_consumed_in_fifo_order() {
        let router = SignalRouter::new();
        router.send("wf-1", "waveAssigned", serde_json::json!(1));
        router.send("wf-1", "waveAssigned", serde_json::json!(2));

        let first = router
            .receive("wf-1", "waveAssigned", Duration::from_millis(10))
            .await;
        let second = router
            .receive("wf-1", "waveAssigned", Duration::from_millis(10))
            .await;
        assert_eq!(first, Some(serde_json::json!(1)));
        assert_eq!(second, Some(serde_json::json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out() {
        let router = SignalRouter::new();
        let got = router
            .receive("wf-1", "waveAssigned", Duration::from_secs(60))
            .await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn send_before_wait_is_not_lost() {
        let router = Arc::new(SignalRouter::new());
        router.send("wf-1", "go", serde_json::json!("now"));
        let got = router.receive("wf-1", "go", Duration::from_millis(10)).await;
        assert_eq!(got, Some(serde_json::json!("now")));
    }
}
