//! Read-model and signaling adapters between services.

use std::sync::Arc;

use crate::core::clock::{Clock, SharedClock};
use crate::fulfillment::planning_workflow_id;
use crate::models::order::Order;
use crate::models::process_path::PathKind;
use crate::outbox::OutboxRepository;
use crate::waving::{CandidateFilter, OrderQueries, WaveAssignedSignal, WaveAssignmentNotifier, WaveCandidate};
use crate::workflow::WorkflowRuntime;

/// Order read model backed by the document store.
pub struct StoreOrderQueries {
    orders: OutboxRepository<Order>,
}

impl StoreOrderQueries {
    pub fn new(orders: OutboxRepository<Order>) -> Self {
        Self { orders }
    }

    fn candidate_from(order: &Order) -> WaveCandidate {
        WaveCandidate {
            order_id: order.id().to_string(),
            priority: order.priority(),
            carrier_cutoff: order.carrier_cutoff(),
            promised_delivery_at: order.promised_delivery_at(),
            zone: order.primary_zone(),
            item_count: order.item_count(),
            weight_grams: order.total_weight_grams(),
            special_handling: order.special_handling(),
            path_kind: if order.consolidation_required() {
                PathKind::PickWallPack
            } else {
                PathKind::PickPack
            },
        }
    }

    fn matches(order: &Order, filter: &CandidateFilter) -> bool {
        if let Some(priority) = filter.priority {
            if order.priority() != priority {
                return false;
            }
        }
        if let Some(carrier) = &filter.carrier {
            if order.carrier() != Some(carrier.as_str()) {
                return false;
            }
        }
        if let Some(zone) = &filter.zone {
            if !order.zones().contains(zone) {
                return false;
            }
        }
        if let Some(cutoff) = filter.cutoff_time {
            let ship_by = order.carrier_cutoff().unwrap_or(order.promised_delivery_at());
            if ship_by > cutoff {
                return false;
            }
        }
        true
    }
}

impl OrderQueries for StoreOrderQueries {
    fn orders_ready_for_waving(&self, filter: &CandidateFilter, limit: usize) -> Vec<WaveCandidate> {
        let mut orders: Vec<Order> = match self.orders.list() {
            Ok(orders) => orders,
            Err(_) => return Vec::new(),
        };
        orders.retain(|o| o.is_waveable() && Self::matches(o, filter));
        // Oldest submissions first so the planner sees a stable pool.
        orders.sort_by(|a, b| a.id().cmp(b.id()));
        orders
            .iter()
            .take(limit)
            .map(Self::candidate_from)
            .collect()
    }

    fn is_still_waveable(&self, order_id: &str) -> bool {
        self.orders
            .get(order_id)
            .ok()
            .flatten()
            .map(|o| o.is_waveable())
            .unwrap_or(false)
    }
}

/// Applies wave assignment to the order aggregate, then signals the order's
/// planning workflow.
pub struct RuntimeWaveNotifier {
    runtime: Arc<WorkflowRuntime>,
    orders: OutboxRepository<Order>,
    clock: SharedClock,
}

impl RuntimeWaveNotifier {
    pub fn new(
        runtime: Arc<WorkflowRuntime>,
        orders: OutboxRepository<Order>,
        clock: SharedClock,
    ) -> Self {
        Self {
            runtime,
            orders,
            clock,
        }
    }
}

impl WaveAssignmentNotifier for RuntimeWaveNotifier {
    fn notify_wave_assigned(&self, order_id: &str, signal: WaveAssignedSignal) {
        match self.orders.get(order_id) {
            Ok(Some(mut order)) => {
                match order.assign_to_wave(&signal.wave_id, self.clock.now()) {
                    Ok(()) => {
                        if let Err(err) = self.orders.save(&mut order) {
                            tracing::warn!(order_id, error = %err, "wave assignment save failed");
                            return;
                        }
                    }
                    Err(err) => {
                        // Duplicate release notification; the signal still goes out.
                        tracing::warn!(order_id, error = %err, "wave assignment skipped");
                    }
                }
            }
            Ok(None) => tracing::warn!(order_id, "wave assignment for unknown order"),
            Err(err) => {
                tracing::warn!(order_id, error = %err, "wave assignment load failed");
                return;
            }
        }
        self.runtime
            .signal(&planning_workflow_id(order_id), "waveAssigned", &signal);
    }
}
