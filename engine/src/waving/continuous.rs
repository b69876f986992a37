//! Continuous ("waveless") release loop.
//!
//! A cooperative scheduler wakes every `release_interval` and splits the
//! candidate pool by urgency: orders at or above the immediate priority
//! threshold are released at once in a micro-wave; the rest accumulate until
//! the batch reaches `min_orders_for_release` or its oldest member has waited
//! `max_wait_time`. Each micro-wave is created with auto-release, scheduled
//! at now, released, and every member order's planning workflow receives the
//! `waveAssigned` signal. Start and stop are idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::clock::Clock;
use crate::models::wave::{FulfillmentMode, Wave, WaveConfiguration, WaveError, WaveOrder, WaveType};
use crate::waving::{CandidateFilter, WaveCandidate, WavePlanError, WavePlanner};

#[derive(Debug, Clone)]
pub struct ContinuousWavingConfig {
    pub release_interval: Duration,
    /// Priority ranks at or below this release immediately (1 = same_day).
    pub immediate_priority_threshold: u8,
    pub min_orders_for_release: usize,
    pub max_wait_time: Duration,
    pub max_orders_per_micro_wave: u32,
}

impl Default for ContinuousWavingConfig {
    fn default() -> Self {
        Self {
            release_interval: Duration::from_secs(30),
            immediate_priority_threshold: 1,
            min_orders_for_release: 10,
            max_wait_time: Duration::from_secs(300),
            max_orders_per_micro_wave: 25,
        }
    }
}

/// Stats from one scheduler pass, exposed for deterministic tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub immediate_released: usize,
    pub batch_released: usize,
    pub waves_created: Vec<String>,
}

/// Long-lived waveless scheduler.
pub struct ContinuousWavingLoop {
    planner: Arc<WavePlanner>,
    config: ContinuousWavingConfig,
    /// First time each batch-mode order was seen waiting.
    waiting_since: Mutex<HashMap<String, DateTime<Utc>>>,
    handle: tokio::sync::Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl ContinuousWavingLoop {
    pub fn new(planner: Arc<WavePlanner>, config: ContinuousWavingConfig) -> Self {
        Self {
            planner,
            config,
            waiting_since: Mutex::new(HashMap::new()),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    /// One scheduler pass: split candidates, release what is due.
    pub fn tick_once(&self) -> TickOutcome {
        let now = self.planner.clock().now();
        let candidates = self
            .planner
            .queries()
            .orders_ready_for_waving(&CandidateFilter::default(), 500);

        let (immediate, batch): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.priority.rank() <= self.config.immediate_priority_threshold);

        let mut outcome = TickOutcome::default();

        if !immediate.is_empty() {
            match self.release_micro_wave(&immediate) {
                Ok(wave) => {
                    outcome.immediate_released = wave.orders().len();
                    outcome.waves_created.push(wave.id().to_string());
                }
                Err(err) => warn!(error = %err, "immediate micro-wave release failed"),
            }
        }

        // Track batch waiting times; forget orders that left the pool.
        {
            let mut waiting = self.waiting_since.lock();
            let current: std::collections::HashSet<&str> =
                batch.iter().map(|c| c.order_id.as_str()).collect();
            waiting.retain(|id, _| current.contains(id.as_str()));
            for candidate in &batch {
                waiting.entry(candidate.order_id.clone()).or_insert(now);
            }
        }

        if !batch.is_empty() && self.batch_is_due(&batch, now) {
            match self.release_micro_wave(&batch) {
                Ok(wave) => {
                    outcome.batch_released = wave.orders().len();
                    let mut waiting = self.waiting_since.lock();
                    for order_id in wave.order_ids() {
                        waiting.remove(&order_id);
                    }
                    outcome.waves_created.push(wave.id().to_string());
                }
                Err(err) => warn!(error = %err, "batch micro-wave release failed"),
            }
        }

        outcome
    }

    fn batch_is_due(&self, batch: &[WaveCandidate], now: DateTime<Utc>) -> bool {
        if batch.len() >= self.config.min_orders_for_release {
            return true;
        }
        let max_wait = chrono::Duration::from_std(self.config.max_wait_time)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let waiting = self.waiting_since.lock();
        batch.iter().any(|c| {
            waiting
                .get(&c.order_id)
                .is_some_and(|since| now - *since >= max_wait)
        })
    }

    /// Build, schedule and release a single-use micro-wave.
    fn release_micro_wave(&self, candidates: &[WaveCandidate]) -> Result<Wave, WavePlanError> {
        let now = self.planner.clock().now();
        let mut wave = Wave::create(
            format!("MWAVE-{}", uuid::Uuid::new_v4().simple()),
            WaveType::Mixed,
            FulfillmentMode::Waveless,
            WaveConfiguration {
                max_orders: self.config.max_orders_per_micro_wave,
                auto_release: true,
                ..WaveConfiguration::default()
            },
            now,
        );

        for candidate in candidates {
            if !self.planner.queries().is_still_waveable(&candidate.order_id) {
                continue;
            }
            let member = WaveOrder {
                order_id: candidate.order_id.clone(),
                priority: candidate.priority,
                item_count: candidate.item_count,
                weight_grams: candidate.weight_grams,
                zone: candidate.zone.clone(),
                special_handling: candidate.special_handling.clone(),
                path_kind: candidate.path_kind,
            };
            if let Err(WaveError::CapacityExceeded { .. }) = wave.add_order(member, now) {
                break;
            }
        }

        if wave.orders().is_empty() {
            return Err(WavePlanError::NoOrdersAvailable);
        }

        wave.finalize_creation(now);
        wave.schedule(now, now)?;
        self.planner.repository().save(&mut wave)?;
        let wave = self.planner.release_wave(wave.id())?;
        debug!(wave_id = %wave.id(), orders = wave.orders().len(), "micro-wave released");
        Ok(wave)
    }

    /// Start the scheduler. A second start while running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.release_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.tick_once();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("continuous waving loop stopped");
        });
        *handle = Some((stop_tx, join));
    }

    /// Stop the scheduler. Stopping an idle loop is a no-op.
    pub async fn stop(&self) {
        let taken = self.handle.lock().await.take();
        if let Some((stop_tx, join)) = taken {
            let _ = stop_tx.send(true);
            let _ = join.await;
        }
    }
}
