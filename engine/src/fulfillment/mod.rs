//! Order fulfillment sagas.
//!
//! The saga choreography lives in `workflows`; the typed activity contracts
//! and their default implementations live in `activities`. Everything is
//! invoked through named registration on the workflow runtime, so tests swap
//! in mock activities at the same seam production wiring uses.

pub mod activities;
pub mod workflows;

pub use activities::{register_default_activities, ActivityEnvironment};
pub use workflows::{
    register_workflows, CancellationInput, CancellationResult, FulfillmentItem,
    OrderFulfillmentInput, OrderFulfillmentResult, PlanningResult, ShippingInput, ShippingResult,
    SortationInput, SortationResult, WesInput, WesResult, WesStageResult,
};

/// Workflow registration names.
pub const ORDER_FULFILLMENT_WORKFLOW: &str = "OrderFulfillmentWorkflow";
pub const PLANNING_WORKFLOW: &str = "PlanningWorkflow";
pub const WES_EXECUTION_WORKFLOW: &str = "WESExecutionWorkflow";
pub const SORTATION_WORKFLOW: &str = "SortationWorkflow";
pub const SHIPPING_WORKFLOW: &str = "ShippingWorkflow";
pub const ORDER_CANCELLATION_WORKFLOW: &str = "OrderCancellationWorkflow";

/// Activity registration names.
pub mod activity_names {
    pub const VALIDATE_ORDER: &str = "ValidateOrder";
    pub const DETERMINE_PROCESS_PATH: &str = "DetermineProcessPath";
    pub const PERSIST_PROCESS_PATH: &str = "PersistProcessPath";
    pub const RESERVE_UNITS: &str = "ReserveUnits";
    pub const ASSIGN_TO_WAVE: &str = "AssignToWave";
    pub const RELEASE_INVENTORY_RESERVATION: &str = "ReleaseInventoryReservation";
    pub const EXECUTE_SLAM: &str = "ExecuteSLAM";
    pub const CANCEL_ORDER: &str = "CancelOrder";
    pub const NOTIFY_CUSTOMER_CANCELLATION: &str = "NotifyCustomerCancellation";
    pub const MARK_CONSOLIDATED: &str = "MarkConsolidated";
    pub const MARK_PACKED: &str = "MarkPacked";
    pub const FIND_CAPABLE_STATION: &str = "FindCapableStation";
    pub const CALCULATE_ROUTE: &str = "CalculateRoute";
    pub const CALCULATE_MULTI_ROUTE: &str = "CalculateMultiRoute";
    pub const START_PICKING: &str = "StartPicking";
    pub const DISPATCH_SHIPMENT: &str = "DispatchShipment";
}

/// Stable workflow id of an order's planning workflow; the wave release path
/// targets `waveAssigned` signals at this id.
pub fn planning_workflow_id(order_id: &str) -> String {
    format!("planning-{order_id}")
}
