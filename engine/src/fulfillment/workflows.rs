//! Saga choreography.
//!
//! `OrderFulfillmentWorkflow` drives an order from validation to dispatch
//! through child workflows. Once planning has completed (wave assigned, so an
//! inventory reservation exists), any later failure runs the
//! `ReleaseInventoryReservation` compensation before the original error
//! propagates; a compensation failure is logged and swallowed.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::order::Priority;
use crate::models::process_path::{PathKind, StationCapability, StationType};
use crate::waving::WaveAssignedSignal;
use crate::workflow::{WorkflowCtx, WorkflowError, WorkflowRuntime};

use super::activities::{
    AssignToWaveInput, AssignToWaveResult, CalculateMultiRouteInput, CalculateMultiRouteResult,
    CalculateRouteInput, CalculateRouteResult, CancelOrderInput, CancelOrderResult,
    DetermineProcessPathInput, DetermineProcessPathResult, DispatchShipmentInput,
    DispatchShipmentResult, ExecuteSlamInput, ExecuteSlamResult, FindCapableStationInput,
    FindCapableStationResult, MarkConsolidatedInput, MarkConsolidatedResult, MarkPackedInput,
    MarkPackedResult, NotifyCustomerCancellationInput, NotifyCustomerCancellationResult,
    PersistProcessPathInput, PersistProcessPathResult, ReleaseReservationInput,
    ReleaseReservationResult, ReserveUnitsInput, ReserveUnitsResult, StartPickingInput,
    StartPickingResult, ValidateOrderInput, ValidateOrderResult,
};
use super::{activity_names as names, planning_workflow_id};

// ----------------------------------------------------------------------
// Workflow inputs and results
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentItem {
    pub sku: String,
    pub quantity: u32,
    pub weight_grams: u64,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFulfillmentInput {
    pub order_id: String,
    pub priority: Priority,
    pub items: Vec<FulfillmentItem>,
    pub consolidation_required: bool,
    pub unit_tracking_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFulfillmentResult {
    pub order_id: String,
    pub status: String,
    pub wave_id: String,
    pub tracking_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    pub wave_id: String,
    pub scheduled_start: chrono::DateTime<chrono::Utc>,
    pub path_kind: PathKind,
    pub reservation_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WesInput {
    pub order_id: String,
    pub consolidation_required: bool,
    pub required_capabilities: Vec<StationCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WesStageResult {
    pub stage: String,
    pub station_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WesResult {
    pub path: String,
    pub stages: Vec<WesStageResult>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortationInput {
    pub order_id: String,
    pub package_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortationResult {
    pub route_id: String,
    pub sort_lane: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingInput {
    pub order_id: String,
    pub tracking_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingResult {
    pub carrier: String,
    pub dispatched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationInput {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationResult {
    pub order_id: String,
    pub cancelled: bool,
    pub reservation_released: bool,
    pub customer_notified: bool,
}

// ----------------------------------------------------------------------
// Workflows
// ----------------------------------------------------------------------

/// Register every saga workflow on the runtime under its public name.
pub fn register_workflows(runtime: &WorkflowRuntime) {
    runtime.register_workflow(super::ORDER_FULFILLMENT_WORKFLOW, order_fulfillment_workflow);
    runtime.register_workflow(super::PLANNING_WORKFLOW, planning_workflow);
    runtime.register_workflow(super::WES_EXECUTION_WORKFLOW, wes_execution_workflow);
    runtime.register_workflow(super::SORTATION_WORKFLOW, sortation_workflow);
    runtime.register_workflow(super::SHIPPING_WORKFLOW, shipping_workflow);
    runtime.register_workflow(super::ORDER_CANCELLATION_WORKFLOW, cancellation_workflow);
}

/// Top-level saga for one order.
pub async fn order_fulfillment_workflow(
    ctx: WorkflowCtx,
    input: OrderFulfillmentInput,
) -> Result<OrderFulfillmentResult, WorkflowError> {
    // Step 1: validation. No reservation exists yet, so a failure here exits
    // without compensation.
    let validation: ValidateOrderResult = ctx
        .activity(
            names::VALIDATE_ORDER,
            &ValidateOrderInput {
                order_id: input.order_id.clone(),
            },
        )
        .await?;
    if !validation.valid {
        let reason = validation
            .reason
            .unwrap_or_else(|| "order validation failed".to_string());
        return Err(WorkflowError::application("order_validation_failed", reason));
    }

    // Step 2: planning. Completion means the order is waved and units are
    // reserved; from here on every failure compensates.
    let planning: PlanningResult = ctx
        .child_workflow(
            super::PLANNING_WORKFLOW,
            &planning_workflow_id(&input.order_id),
            &input,
        )
        .await?;

    match execute_post_planning(&ctx, &input, &planning).await {
        Ok(result) => Ok(result),
        Err(err) => {
            run_release_compensation(&ctx, &input.order_id).await;
            Err(err)
        }
    }
}

/// Steps 3-6: execution, SLAM, sortation, shipping.
async fn execute_post_planning(
    ctx: &WorkflowCtx,
    input: &OrderFulfillmentInput,
    planning: &PlanningResult,
) -> Result<OrderFulfillmentResult, WorkflowError> {
    let wes: WesResult = ctx
        .child_workflow(
            super::WES_EXECUTION_WORKFLOW,
            &format!("wes-{}", input.order_id),
            &WesInput {
                order_id: input.order_id.clone(),
                consolidation_required: input.consolidation_required,
                required_capabilities: Vec::new(),
            },
        )
        .await?;

    let slam: ExecuteSlamResult = ctx
        .activity(
            names::EXECUTE_SLAM,
            &ExecuteSlamInput {
                order_id: input.order_id.clone(),
            },
        )
        .await?;

    let _sortation: SortationResult = ctx
        .child_workflow(
            super::SORTATION_WORKFLOW,
            &format!("sortation-{}", input.order_id),
            &SortationInput {
                order_id: input.order_id.clone(),
                package_count: 1,
            },
        )
        .await?;

    let _shipping: ShippingResult = ctx
        .child_workflow(
            super::SHIPPING_WORKFLOW,
            &format!("shipping-{}", input.order_id),
            &ShippingInput {
                order_id: input.order_id.clone(),
                tracking_number: slam.tracking_number.clone(),
            },
        )
        .await?;

    info!(
        order_id = %input.order_id,
        wave_id = %planning.wave_id,
        path = %wes.path,
        "order fulfillment completed"
    );
    Ok(OrderFulfillmentResult {
        order_id: input.order_id.clone(),
        status: "completed".to_string(),
        wave_id: planning.wave_id.clone(),
        tracking_number: slam.tracking_number,
    })
}

/// Compensation: release the reservation exactly once, swallowing its own
/// failure so the original error is the one returned.
async fn run_release_compensation(ctx: &WorkflowCtx, order_id: &str) {
    let released: Result<ReleaseReservationResult, WorkflowError> = ctx
        .activity(
            names::RELEASE_INVENTORY_RESERVATION,
            &ReleaseReservationInput {
                order_id: order_id.to_string(),
            },
        )
        .await;
    match released {
        Ok(result) => info!(
            order_id,
            released = result.released_count,
            "compensation released inventory reservation"
        ),
        Err(err) => warn!(order_id, error = %err, "compensation failed, continuing with original error"),
    }
}

/// Child: resolve the process path, reserve units, queue for waving and wait
/// for assignment.
pub async fn planning_workflow(
    ctx: WorkflowCtx,
    input: OrderFulfillmentInput,
) -> Result<PlanningResult, WorkflowError> {
    let path: DetermineProcessPathResult = ctx
        .activity(
            names::DETERMINE_PROCESS_PATH,
            &DetermineProcessPathInput {
                order_id: input.order_id.clone(),
            },
        )
        .await?;

    let mut reservation_ids = Vec::new();
    if input.unit_tracking_enabled {
        let _persisted: PersistProcessPathResult = ctx
            .activity(
                names::PERSIST_PROCESS_PATH,
                &PersistProcessPathInput {
                    order_id: input.order_id.clone(),
                    path_id: path.path_id.clone(),
                },
            )
            .await?;
        let reserved: ReserveUnitsResult = ctx
            .activity(
                names::RESERVE_UNITS,
                &ReserveUnitsInput {
                    order_id: input.order_id.clone(),
                },
            )
            .await?;
        reservation_ids = reserved.reservation_ids;
    }

    let _queued: AssignToWaveResult = ctx
        .activity(
            names::ASSIGN_TO_WAVE,
            &AssignToWaveInput {
                order_id: input.order_id.clone(),
            },
        )
        .await?;

    let timeout = input
        .priority
        .wave_assignment_timeout()
        .to_std()
        .unwrap_or_else(|_| std::time::Duration::from_secs(8 * 3600));
    let signal: WaveAssignedSignal = ctx
        .await_signal("waveAssigned", timeout)
        .await
        .map_err(|err| match err {
            WorkflowError::Timeout { .. } => WorkflowError::timeout(format!(
                "wave assignment timeout for order {}",
                input.order_id
            )),
            other => other,
        })?;

    Ok(PlanningResult {
        wave_id: signal.wave_id,
        scheduled_start: signal.scheduled_start,
        path_kind: path.kind,
        reservation_ids,
    })
}

/// Child: run the warehouse execution pipeline stage by stage against
/// capability-matched stations. Any stage failure fails the workflow with the
/// stage error preserved.
pub async fn wes_execution_workflow(
    ctx: WorkflowCtx,
    input: WesInput,
) -> Result<WesResult, WorkflowError> {
    let path = if input.consolidation_required {
        PathKind::PickWallPack
    } else {
        PathKind::PickPack
    };
    let mut stages = Vec::new();

    let pick_station: FindCapableStationResult = ctx
        .activity(
            names::FIND_CAPABLE_STATION,
            &FindCapableStationInput {
                order_id: input.order_id.clone(),
                station_type: StationType::Pick,
                required_capabilities: input.required_capabilities.clone(),
            },
        )
        .await?;
    let _picked: StartPickingResult = ctx
        .activity(
            names::START_PICKING,
            &StartPickingInput {
                order_id: input.order_id.clone(),
                station_id: pick_station.station_id.clone(),
            },
        )
        .await?;
    stages.push(WesStageResult {
        stage: "picking".to_string(),
        station_id: pick_station.station_id,
    });

    if path == PathKind::PickWallPack {
        let wall_station: FindCapableStationResult = ctx
            .activity(
                names::FIND_CAPABLE_STATION,
                &FindCapableStationInput {
                    order_id: input.order_id.clone(),
                    station_type: StationType::Wall,
                    required_capabilities: input.required_capabilities.clone(),
                },
            )
            .await?;
        let _consolidated: MarkConsolidatedResult = ctx
            .activity(
                names::MARK_CONSOLIDATED,
                &MarkConsolidatedInput {
                    order_id: input.order_id.clone(),
                    station_id: wall_station.station_id.clone(),
                },
            )
            .await?;
        stages.push(WesStageResult {
            stage: "walling".to_string(),
            station_id: wall_station.station_id,
        });
    }

    let pack_station: FindCapableStationResult = ctx
        .activity(
            names::FIND_CAPABLE_STATION,
            &FindCapableStationInput {
                order_id: input.order_id.clone(),
                station_type: StationType::Pack,
                required_capabilities: input.required_capabilities.clone(),
            },
        )
        .await?;
    let _packed: MarkPackedResult = ctx
        .activity(
            names::MARK_PACKED,
            &MarkPackedInput {
                order_id: input.order_id.clone(),
                station_id: pack_station.station_id.clone(),
            },
        )
        .await?;
    stages.push(WesStageResult {
        stage: "packing".to_string(),
        station_id: pack_station.station_id,
    });

    Ok(WesResult {
        path: path.as_str().to_string(),
        stages,
        status: "completed".to_string(),
    })
}

/// Child: route calculation and lane assignment.
pub async fn sortation_workflow(
    ctx: WorkflowCtx,
    input: SortationInput,
) -> Result<SortationResult, WorkflowError> {
    let (route_id, stop_count) = if input.package_count > 1 {
        let multi: CalculateMultiRouteResult = ctx
            .activity(
                names::CALCULATE_MULTI_ROUTE,
                &CalculateMultiRouteInput {
                    order_id: input.order_id.clone(),
                    package_count: input.package_count,
                },
            )
            .await?;
        let route_id = multi
            .route_ids
            .first()
            .cloned()
            .unwrap_or_else(|| format!("ROUTE-{}", input.order_id));
        (route_id, multi.stop_count)
    } else {
        let route: CalculateRouteResult = ctx
            .activity(
                names::CALCULATE_ROUTE,
                &CalculateRouteInput {
                    order_id: input.order_id.clone(),
                },
            )
            .await?;
        (route.route_id, route.stop_count)
    };

    Ok(SortationResult {
        route_id,
        sort_lane: format!("LANE-{:02}", stop_count % 12 + 1),
    })
}

/// Child: hand the labeled package to the carrier.
pub async fn shipping_workflow(
    ctx: WorkflowCtx,
    input: ShippingInput,
) -> Result<ShippingResult, WorkflowError> {
    let dispatched: DispatchShipmentResult = ctx
        .activity(
            names::DISPATCH_SHIPMENT,
            &DispatchShipmentInput {
                order_id: input.order_id.clone(),
            },
        )
        .await?;
    Ok(ShippingResult {
        carrier: dispatched.carrier,
        dispatched: dispatched.dispatched,
    })
}

/// Forward cancellation workflow. Step 1 is fatal on failure; steps 2 and 3
/// are best-effort.
pub async fn cancellation_workflow(
    ctx: WorkflowCtx,
    input: CancellationInput,
) -> Result<CancellationResult, WorkflowError> {
    let cancelled: Result<CancelOrderResult, WorkflowError> = ctx
        .activity(
            names::CANCEL_ORDER,
            &CancelOrderInput {
                order_id: input.order_id.clone(),
                reason: input.reason.clone(),
            },
        )
        .await;
    if let Err(err) = cancelled {
        return Err(WorkflowError::application(
            "cancel_order_failed",
            format!("failed to cancel order: {}", err.message()),
        ));
    }

    let released: Result<ReleaseReservationResult, WorkflowError> = ctx
        .activity(
            names::RELEASE_INVENTORY_RESERVATION,
            &ReleaseReservationInput {
                order_id: input.order_id.clone(),
            },
        )
        .await;
    let reservation_released = match released {
        Ok(_) => true,
        Err(err) => {
            warn!(order_id = %input.order_id, error = %err, "reservation release failed during cancellation");
            false
        }
    };

    let notified: Result<NotifyCustomerCancellationResult, WorkflowError> = ctx
        .activity(
            names::NOTIFY_CUSTOMER_CANCELLATION,
            &NotifyCustomerCancellationInput {
                order_id: input.order_id.clone(),
                reason: input.reason.clone(),
            },
        )
        .await;
    let customer_notified = match notified {
        Ok(result) => result.notified,
        Err(err) => {
            warn!(order_id = %input.order_id, error = %err, "customer notification failed during cancellation");
            false
        }
    };

    Ok(CancellationResult {
        order_id: input.order_id,
        cancelled: true,
        reservation_released,
        customer_notified,
    })
}
