//! Wave planning.
//!
//! The planner batches validated orders into releasable waves under
//! multi-dimensional capacity, priority, cutoff and process-path constraints.
//! The continuous loop (`waveless` mode) replaces scheduled waves with
//! micro-waves released on a cadence.

mod continuous;
mod planner;

pub use continuous::{ContinuousWavingConfig, ContinuousWavingLoop};
pub use planner::{WavePlanError, WavePlanner};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::Priority;
use crate::models::process_path::{PathKind, SpecialHandling};
use crate::models::wave::{FulfillmentMode, WaveType};

/// Planner input, one per planning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePlanningConfig {
    pub wave_type: WaveType,
    pub fulfillment_mode: FulfillmentMode,
    pub max_orders: u32,
    pub max_items: u64,
    pub max_weight_grams: u64,
    pub priority_filter: Option<Priority>,
    pub carrier_filter: Option<String>,
    pub zone: Option<String>,
    pub required_process_paths: Vec<PathKind>,
    pub excluded_process_paths: Vec<PathKind>,
    pub cutoff_time: Option<DateTime<Utc>>,
    pub group_by_process_path: bool,
}

impl Default for WavePlanningConfig {
    fn default() -> Self {
        Self {
            wave_type: WaveType::Standard,
            fulfillment_mode: FulfillmentMode::Wave,
            max_orders: 100,
            max_items: 2_000,
            max_weight_grams: 500_000,
            priority_filter: None,
            carrier_filter: None,
            zone: None,
            required_process_paths: Vec::new(),
            excluded_process_paths: Vec::new(),
            cutoff_time: None,
            group_by_process_path: true,
        }
    }
}

/// Read-side filter passed to the order service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    pub priority: Option<Priority>,
    pub carrier: Option<String>,
    pub zone: Option<String>,
    pub cutoff_time: Option<DateTime<Utc>>,
}

impl CandidateFilter {
    pub fn from_config(config: &WavePlanningConfig) -> Self {
        Self {
            priority: config.priority_filter,
            carrier: config.carrier_filter.clone(),
            zone: config.zone.clone(),
            cutoff_time: config.cutoff_time,
        }
    }
}

/// Denormalized view of an order ready for waving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveCandidate {
    pub order_id: String,
    pub priority: Priority,
    pub carrier_cutoff: Option<DateTime<Utc>>,
    pub promised_delivery_at: DateTime<Utc>,
    pub zone: String,
    pub item_count: u32,
    pub weight_grams: u64,
    pub special_handling: BTreeSet<SpecialHandling>,
    pub path_kind: PathKind,
}

/// Query surface the planner reads orders through.
///
/// Selection runs without a write lock; `is_still_waveable` is the per-order
/// re-check at add time, and any order concurrently taken is skipped.
pub trait OrderQueries: Send + Sync {
    fn orders_ready_for_waving(&self, filter: &CandidateFilter, limit: usize) -> Vec<WaveCandidate>;

    fn is_still_waveable(&self, order_id: &str) -> bool;
}

/// Payload of the `waveAssigned` workflow signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveAssignedSignal {
    pub wave_id: String,
    pub scheduled_start: DateTime<Utc>,
}

/// Seam through which a released wave notifies each member order's planning
/// workflow.
pub trait WaveAssignmentNotifier: Send + Sync {
    fn notify_wave_assigned(&self, order_id: &str, signal: WaveAssignedSignal);
}
