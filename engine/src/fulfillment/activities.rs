//! Activity contracts and default implementations.
//!
//! Every activity has a named input and output DTO; the registry seam
//! serializes them, so mocks and production handlers are interchangeable.
//! Default handlers mutate aggregates through the outbox repositories — the
//! activity layer is where all IO happens, keeping workflow code
//! deterministic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::clock::{Clock, SharedClock};
use crate::models::inventory::InventoryItem;
use crate::models::order::Order;
use crate::models::process_path::{PathKind, ProcessPath, StationCapability, StationType};
use crate::models::reservation::{InventoryReservation, ReservationStatus};
use crate::models::DomainEvent;
use crate::outbox::{OutboxRepository, TransactionalStore};
use crate::workflow::{ActivityError, WorkflowRuntime};

use super::activity_names as names;

// ----------------------------------------------------------------------
// DTOs
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateOrderInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateOrderResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetermineProcessPathInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetermineProcessPathResult {
    pub path_id: String,
    pub kind: PathKind,
    pub required_capabilities: Vec<StationCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistProcessPathInput {
    pub order_id: String,
    pub path_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistProcessPathResult {
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveUnitsInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveUnitsResult {
    pub reservation_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignToWaveInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignToWaveResult {
    pub queued: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReservationInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReservationResult {
    pub released_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteSlamInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteSlamResult {
    pub tracking_number: String,
    pub label_id: String,
    pub manifest_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrderInput {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrderResult {
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyCustomerCancellationInput {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyCustomerCancellationResult {
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCapableStationInput {
    pub order_id: String,
    pub station_type: StationType,
    pub required_capabilities: Vec<StationCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindCapableStationResult {
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPickingInput {
    pub order_id: String,
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickedItem {
    pub sku: String,
    pub quantity: u32,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPickingResult {
    pub picked_items: Vec<PickedItem>,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkConsolidatedInput {
    pub order_id: String,
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkConsolidatedResult {
    pub consolidated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPackedInput {
    pub order_id: String,
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPackedResult {
    pub package_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateRouteInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateRouteResult {
    pub route_id: String,
    pub stop_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateMultiRouteInput {
    pub order_id: String,
    pub package_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculateMultiRouteResult {
    pub route_ids: Vec<String>,
    pub stop_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchShipmentInput {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchShipmentResult {
    pub carrier: String,
    pub dispatched: bool,
}

// ----------------------------------------------------------------------
// Default implementations
// ----------------------------------------------------------------------

/// Shared dependencies for the default activity handlers.
pub struct ActivityEnvironment {
    pub store: Arc<TransactionalStore>,
    pub orders: OutboxRepository<Order>,
    pub inventory: OutboxRepository<InventoryItem>,
    pub reservations: OutboxRepository<InventoryReservation>,
    pub clock: SharedClock,
}

impl ActivityEnvironment {
    pub fn new(store: Arc<TransactionalStore>, clock: SharedClock) -> Self {
        Self {
            orders: OutboxRepository::new(Arc::clone(&store), "/wms/orders"),
            inventory: OutboxRepository::new(Arc::clone(&store), "/wms/inventory"),
            reservations: OutboxRepository::new(Arc::clone(&store), "/wms/inventory"),
            store,
            clock,
        }
    }

    fn load_order(&self, order_id: &str) -> Result<Order, ActivityError> {
        self.orders
            .get(order_id)
            .map_err(|e| ActivityError::retryable("storage_unavailable", e.to_string()))?
            .ok_or_else(|| {
                ActivityError::non_retryable("order_not_found", format!("order {order_id} not found"))
            })
    }

    fn save_order(&self, order: &mut Order) -> Result<(), ActivityError> {
        self.orders
            .save(order)
            .map_err(|e| ActivityError::retryable("storage_unavailable", e.to_string()))
    }

    fn active_reservations(&self, order_id: &str) -> Result<Vec<InventoryReservation>, ActivityError> {
        let all = self
            .reservations
            .list()
            .map_err(|e| ActivityError::retryable("storage_unavailable", e.to_string()))?;
        Ok(all
            .into_iter()
            .filter(|r| {
                r.order_id() == order_id
                    && matches!(
                        r.status(),
                        ReservationStatus::Active | ReservationStatus::Staged
                    )
            })
            .collect())
    }
}

/// Register the production activity handlers on a runtime.
pub fn register_default_activities(runtime: &WorkflowRuntime, env: Arc<ActivityEnvironment>) {
    let e = Arc::clone(&env);
    runtime.register_activity(names::VALIDATE_ORDER, move |input: ValidateOrderInput| {
        let env = Arc::clone(&e);
        async move {
            let mut order = env.load_order(&input.order_id)?;
            for item in order.items() {
                let available = env
                    .inventory
                    .get(&item.sku)
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?
                    .map(|stock| stock.total_available())
                    .unwrap_or(0);
                if available < u64::from(item.quantity) {
                    return Ok(ValidateOrderResult {
                        valid: false,
                        reason: Some(format!("insufficient inventory for {}", item.sku)),
                    });
                }
            }
            order
                .validate(env.clock.now())
                .map_err(|err| ActivityError::non_retryable("invalid_order", err.to_string()))?;
            env.save_order(&mut order)?;
            Ok(ValidateOrderResult {
                valid: true,
                reason: None,
            })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::DETERMINE_PROCESS_PATH,
        move |input: DetermineProcessPathInput| {
            let env = Arc::clone(&e);
            async move {
                let order = env.load_order(&input.order_id)?;
                let path = ProcessPath::resolve(&order, env.clock.now());
                Ok(DetermineProcessPathResult {
                    path_id: path.id.clone(),
                    kind: path.kind,
                    required_capabilities: path.required_capabilities.iter().copied().collect(),
                })
            }
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::PERSIST_PROCESS_PATH,
        move |input: PersistProcessPathInput| {
            let env = Arc::clone(&e);
            async move {
                let order = env.load_order(&input.order_id)?;
                let path = ProcessPath::resolve(&order, env.clock.now());
                let document = serde_json::to_value(&path)
                    .map_err(|err| ActivityError::non_retryable("bad_output", err.to_string()))?;
                env.store
                    .transaction(|txn| {
                        txn.upsert("process_path", &input.path_id, document);
                        Ok(())
                    })
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;
                Ok(PersistProcessPathResult { persisted: true })
            }
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(names::RESERVE_UNITS, move |input: ReserveUnitsInput| {
        let env = Arc::clone(&e);
        async move {
            let order = env.load_order(&input.order_id)?;
            let now = env.clock.now();
            let mut reservation_ids = Vec::new();
            for line in order.items() {
                let mut stock = env
                    .inventory
                    .get(&line.sku)
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?
                    .ok_or_else(|| {
                        ActivityError::non_retryable(
                            "unknown_sku",
                            format!("no inventory record for {}", line.sku),
                        )
                    })?;

                let location = stock
                    .locations()
                    .iter()
                    .find(|l| l.available() >= u64::from(line.quantity))
                    .map(|l| l.location.clone());
                let Some(location) = location else {
                    stock.record_stock_shortage(order.id(), u64::from(line.quantity), now);
                    let _ = env.inventory.save(&mut stock);
                    return Err(ActivityError::non_retryable(
                        "insufficient_inventory",
                        format!("insufficient inventory for {}", line.sku),
                    ));
                };

                let reservation_id = format!("RES-{}", Uuid::new_v4().simple());
                stock
                    .reserve(
                        &location,
                        u64::from(line.quantity),
                        &reservation_id,
                        order.id(),
                        now,
                    )
                    .map_err(|err| ActivityError::non_retryable("reserve_failed", err.to_string()))?;
                env.inventory
                    .save(&mut stock)
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;

                let mut reservation = InventoryReservation::new(
                    &reservation_id,
                    order.id(),
                    &line.sku,
                    &location,
                    u64::from(line.quantity),
                    now,
                );
                env.reservations
                    .save(&mut reservation)
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;
                reservation_ids.push(reservation_id);
            }
            Ok(ReserveUnitsResult { reservation_ids })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(names::ASSIGN_TO_WAVE, move |input: AssignToWaveInput| {
        let env = Arc::clone(&e);
        async move {
            let order = env.load_order(&input.order_id)?;
            if !order.is_waveable() && order.wave_id().is_none() {
                return Err(ActivityError::non_retryable(
                    "not_waveable",
                    format!("order {} is not ready for waving", input.order_id),
                ));
            }
            Ok(AssignToWaveResult { queued: true })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::RELEASE_INVENTORY_RESERVATION,
        move |input: ReleaseReservationInput| {
            let env = Arc::clone(&e);
            async move {
                let now = env.clock.now();
                let mut released = 0u32;
                for mut reservation in env.active_reservations(&input.order_id)? {
                    if let Some(mut stock) = env
                        .inventory
                        .get(reservation.sku())
                        .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?
                    {
                        if let Err(err) = stock.release_reservation(
                            reservation.location(),
                            reservation.quantity(),
                            now,
                        ) {
                            warn!(
                                order_id = %input.order_id,
                                reservation_id = %reservation.id(),
                                error = %err,
                                "stock release skipped"
                            );
                        } else {
                            env.inventory.save(&mut stock).map_err(|err| {
                                ActivityError::retryable("storage_unavailable", err.to_string())
                            })?;
                        }
                    }
                    reservation
                        .cancel(now)
                        .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
                    env.reservations.save(&mut reservation).map_err(|err| {
                        ActivityError::retryable("storage_unavailable", err.to_string())
                    })?;
                    released += 1;
                }
                info!(order_id = %input.order_id, released, "inventory reservations released");
                Ok(ReleaseReservationResult {
                    released_count: released,
                })
            }
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(names::EXECUTE_SLAM, move |input: ExecuteSlamInput| {
        let env = Arc::clone(&e);
        async move {
            let mut order = env.load_order(&input.order_id)?;
            let suffix = Uuid::new_v4().simple().to_string();
            let tracking_number = format!("TRACK-{}", &suffix[..6].to_uppercase());
            let label_id = format!("LBL-{}", &suffix[..8]);
            let manifest_id = format!("MAN-{}", &suffix[..8]);
            order
                .record_slam(&tracking_number, &manifest_id, env.clock.now())
                .map_err(|err| ActivityError::non_retryable("slam_failed", err.to_string()))?;
            env.save_order(&mut order)?;
            Ok(ExecuteSlamResult {
                tracking_number,
                label_id,
                manifest_id,
            })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(names::CANCEL_ORDER, move |input: CancelOrderInput| {
        let env = Arc::clone(&e);
        async move {
            let mut order = env.load_order(&input.order_id)?;
            order
                .cancel(&input.reason, env.clock.now())
                .map_err(|err| ActivityError::non_retryable("cannot_cancel", err.to_string()))?;
            env.save_order(&mut order)?;
            Ok(CancelOrderResult { cancelled: true })
        }
    });

    runtime.register_activity(
        names::NOTIFY_CUSTOMER_CANCELLATION,
        move |input: NotifyCustomerCancellationInput| async move {
            info!(order_id = %input.order_id, reason = %input.reason, "customer cancellation notice sent");
            Ok(NotifyCustomerCancellationResult { notified: true })
        },
    );

    runtime.register_activity(
        names::FIND_CAPABLE_STATION,
        move |input: FindCapableStationInput| async move {
            let prefix = match input.station_type {
                StationType::Pick => "PICK",
                StationType::Wall => "WALL",
                StationType::Pack => "PACK",
                StationType::Sort => "SORT",
                StationType::Ship => "SHIP",
            };
            Ok(FindCapableStationResult {
                station_id: format!("{prefix}-01"),
            })
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(names::START_PICKING, move |input: StartPickingInput| {
        let env = Arc::clone(&e);
        async move {
            let now = env.clock.now();
            let mut order = env.load_order(&input.order_id)?;
            order
                .start_picking(&input.station_id, now)
                .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;

            let mut picked_items = Vec::new();
            for mut reservation in env.active_reservations(&input.order_id)? {
                if let Some(mut stock) = env
                    .inventory
                    .get(reservation.sku())
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?
                {
                    stock
                        .commit_pick(
                            reservation.location(),
                            reservation.quantity(),
                            &input.order_id,
                            now,
                        )
                        .map_err(|err| ActivityError::non_retryable("pick_failed", err.to_string()))?;
                    env.inventory.save(&mut stock).map_err(|err| {
                        ActivityError::retryable("storage_unavailable", err.to_string())
                    })?;
                }
                picked_items.push(PickedItem {
                    sku: reservation.sku().to_string(),
                    quantity: reservation.quantity() as u32,
                    location: reservation.location().to_string(),
                });
                reservation
                    .stage(now)
                    .and_then(|_| reservation.fulfill(now))
                    .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
                env.reservations
                    .save(&mut reservation)
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;
            }

            order
                .complete_picking(&input.station_id, now)
                .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
            env.save_order(&mut order)?;
            Ok(StartPickingResult {
                picked_items,
                complete: true,
            })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::MARK_CONSOLIDATED,
        move |input: MarkConsolidatedInput| {
            let env = Arc::clone(&e);
            async move {
                let mut order = env.load_order(&input.order_id)?;
                order
                    .mark_consolidated(&input.station_id, env.clock.now())
                    .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
                env.save_order(&mut order)?;
                Ok(MarkConsolidatedResult { consolidated: true })
            }
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(names::MARK_PACKED, move |input: MarkPackedInput| {
        let env = Arc::clone(&e);
        async move {
            let now = env.clock.now();
            let mut order = env.load_order(&input.order_id)?;
            order
                .start_packing(&input.station_id, now)
                .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
            let package_id = format!("PKG-{}", Uuid::new_v4().simple());
            order
                .mark_packed(&package_id, now)
                .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
            env.save_order(&mut order)?;
            Ok(MarkPackedResult { package_id })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(names::CALCULATE_ROUTE, move |input: CalculateRouteInput| {
        let env = Arc::clone(&e);
        async move {
            let route_id = format!("ROUTE-{}", input.order_id);
            let stop_count = 3;
            env.store
                .transaction(|txn| {
                    txn.enqueue_event(
                        DomainEvent::RouteCalculated {
                            route_id: route_id.clone(),
                            order_id: input.order_id.clone(),
                            stop_count,
                            occurred_at: env.clock.now(),
                        },
                        "/wms/routing",
                    );
                    Ok(())
                })
                .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;
            Ok(CalculateRouteResult {
                route_id,
                stop_count,
            })
        }
    });

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::CALCULATE_MULTI_ROUTE,
        move |input: CalculateMultiRouteInput| {
            let env = Arc::clone(&e);
            async move {
                let mut route_ids = Vec::new();
                let now = env.clock.now();
                env.store
                    .transaction(|txn| {
                        for package in 0..input.package_count.max(1) {
                            let route_id = format!("ROUTE-{}-{package}", input.order_id);
                            txn.enqueue_event(
                                DomainEvent::RouteCalculated {
                                    route_id: route_id.clone(),
                                    order_id: input.order_id.clone(),
                                    stop_count: 3,
                                    occurred_at: now,
                                },
                                "/wms/routing",
                            );
                            route_ids.push(route_id);
                        }
                        Ok(())
                    })
                    .map_err(|err| ActivityError::retryable("storage_unavailable", err.to_string()))?;
                Ok(CalculateMultiRouteResult {
                    route_ids,
                    stop_count: 3,
                })
            }
        },
    );

    let e = Arc::clone(&env);
    runtime.register_activity(
        names::DISPATCH_SHIPMENT,
        move |input: DispatchShipmentInput| {
            let env = Arc::clone(&e);
            async move {
                let now = env.clock.now();
                let mut order = env.load_order(&input.order_id)?;
                let carrier = order.carrier().unwrap_or("UPS").to_string();
                order
                    .dispatch(&carrier, now)
                    .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
                order
                    .complete_fulfillment(now)
                    .map_err(|err| ActivityError::non_retryable("bad_state", err.to_string()))?;
                env.save_order(&mut order)?;
                Ok(DispatchShipmentResult {
                    carrier,
                    dispatched: true,
                })
            }
        },
    );
}
