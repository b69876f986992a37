//! Wave planner.
//!
//! Planning is a read-sort-pack pass:
//!
//! 1. Query candidates with `limit = 2 * max_orders`
//! 2. Reject orders incompatible with the wave type or its process paths
//! 3. Sort by priority rank, carrier cutoff, promised delivery, zone
//! 4. Greedy-pack under the capacity limits, skipping oversized orders
//! 5. Derive capabilities, labor sizing and wave priority from the members
//! 6. Persist and emit `wms.wave.created`
//!
//! Selection holds no write lock; every add re-checks the order and skips
//! any that another planner took concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::clock::{Clock, SharedClock};
use crate::models::wave::{Wave, WaveConfiguration, WaveError, WaveOrder, WaveStatus};
use crate::outbox::{OutboxRepository, StorageError};
use crate::waving::{
    CandidateFilter, OrderQueries, WaveAssignedSignal, WaveAssignmentNotifier, WaveCandidate,
    WavePlanningConfig,
};

#[derive(Debug, Error)]
pub enum WavePlanError {
    #[error("No orders available for waving")]
    NoOrdersAvailable,

    #[error("Wave {wave_id} not found")]
    WaveNotFound { wave_id: String },

    #[error(transparent)]
    Wave(#[from] WaveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Plans, optimizes and releases waves.
pub struct WavePlanner {
    queries: Arc<dyn OrderQueries>,
    waves: OutboxRepository<Wave>,
    notifier: Arc<dyn WaveAssignmentNotifier>,
    clock: SharedClock,
    next_wave_number: AtomicU64,
}

impl WavePlanner {
    pub fn new(
        queries: Arc<dyn OrderQueries>,
        waves: OutboxRepository<Wave>,
        notifier: Arc<dyn WaveAssignmentNotifier>,
        clock: SharedClock,
    ) -> Self {
        Self {
            queries,
            waves,
            notifier,
            clock,
            next_wave_number: AtomicU64::new(1),
        }
    }

    fn next_wave_id(&self) -> String {
        let n = self.next_wave_number.fetch_add(1, Ordering::SeqCst);
        format!("WAVE-{n:03}")
    }

    /// Whether a candidate may join a wave of the configured type.
    fn is_compatible(candidate: &WaveCandidate, config: &WavePlanningConfig) -> bool {
        if !config.required_process_paths.is_empty()
            && !config.required_process_paths.contains(&candidate.path_kind)
        {
            return false;
        }
        if config.excluded_process_paths.contains(&candidate.path_kind) {
            return false;
        }
        match config.wave_type.dedicated_handling() {
            // Dedicated waves take only orders that need their handling.
            Some(handling) => candidate.special_handling.contains(&handling),
            None => {
                if config.wave_type == crate::models::wave::WaveType::Standard {
                    candidate.special_handling.is_empty()
                } else {
                    true
                }
            }
        }
    }

    /// Plan one wave from the current candidate pool.
    pub fn plan_wave(&self, config: &WavePlanningConfig) -> Result<Wave, WavePlanError> {
        let now = self.clock.now();
        let filter = CandidateFilter::from_config(config);
        let limit = (config.max_orders as usize) * 2;
        let mut candidates = self.queries.orders_ready_for_waving(&filter, limit);

        if config.group_by_process_path {
            candidates.retain(|c| Self::is_compatible(c, config));
        }

        candidates.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| match (a.carrier_cutoff, b.carrier_cutoff) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.promised_delivery_at.cmp(&b.promised_delivery_at))
                .then_with(|| a.zone.cmp(&b.zone))
        });

        let mut wave = Wave::create(
            self.next_wave_id(),
            config.wave_type,
            config.fulfillment_mode,
            WaveConfiguration {
                max_orders: config.max_orders,
                max_items: config.max_items,
                max_weight_grams: config.max_weight_grams,
                priority_filter: config.priority_filter,
                carrier_filter: config.carrier_filter.clone(),
                zone: config.zone.clone(),
                cutoff_time: config.cutoff_time,
                ..WaveConfiguration::default()
            },
            now,
        );

        for candidate in candidates {
            if !self.queries.is_still_waveable(&candidate.order_id) {
                debug!(order_id = %candidate.order_id, "candidate taken concurrently, skipping");
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
            match wave.add_order(member, now) {
                Ok(()) => {}
                Err(WaveError::CapacityExceeded { dimension, .. }) => {
                    // This order does not fit; keep scanning for one that does.
                    debug!(order_id = %candidate.order_id, dimension, "order skipped for capacity");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if wave.orders().is_empty() {
            return Err(WavePlanError::NoOrdersAvailable);
        }

        wave.finalize_creation(now);
        self.waves.save(&mut wave)?;
        info!(
            wave_id = %wave.id(),
            orders = wave.orders().len(),
            items = wave.total_items(),
            priority = wave.priority(),
            "wave planned"
        );
        Ok(wave)
    }

    /// Re-sequence a planning/scheduled wave for picking efficiency.
    pub fn optimize_wave(&self, wave_id: &str) -> Result<Wave, WavePlanError> {
        let mut wave = self
            .waves
            .get(wave_id)?
            .ok_or_else(|| WavePlanError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        wave.optimize(self.clock.now())?;
        self.waves.save(&mut wave)?;
        Ok(wave)
    }

    pub fn schedule_wave(
        &self,
        wave_id: &str,
        start: chrono::DateTime<chrono::Utc>,
    ) -> Result<Wave, WavePlanError> {
        let mut wave = self
            .waves
            .get(wave_id)?
            .ok_or_else(|| WavePlanError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        wave.schedule(start, self.clock.now())?;
        self.waves.save(&mut wave)?;
        Ok(wave)
    }

    /// Release a scheduled wave and signal every member order's planning
    /// workflow with `waveAssigned`.
    pub fn release_wave(&self, wave_id: &str) -> Result<Wave, WavePlanError> {
        let now = self.clock.now();
        let mut wave = self
            .waves
            .get(wave_id)?
            .ok_or_else(|| WavePlanError::WaveNotFound {
                wave_id: wave_id.to_string(),
            })?;
        wave.release(now)?;
        self.waves.save(&mut wave)?;

        let scheduled_start = wave.scheduled_start().unwrap_or(now);
        for order_id in wave.order_ids() {
            self.notifier.notify_wave_assigned(
                &order_id,
                WaveAssignedSignal {
                    wave_id: wave.id().to_string(),
                    scheduled_start,
                },
            );
        }
        info!(wave_id = %wave.id(), orders = wave.orders().len(), "wave released");
        Ok(wave)
    }

    /// Fetch a wave for inspection.
    pub fn wave(&self, wave_id: &str) -> Result<Option<Wave>, WavePlanError> {
        Ok(self.waves.get(wave_id)?)
    }

    pub(crate) fn repository(&self) -> &OutboxRepository<Wave> {
        &self.waves
    }

    pub(crate) fn queries(&self) -> &Arc<dyn OrderQueries> {
        &self.queries
    }

    pub(crate) fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// True while a wave can still accept orders.
    pub fn is_open(wave: &Wave) -> bool {
        matches!(wave.status(), WaveStatus::Planning | WaveStatus::Scheduled)
    }
}
