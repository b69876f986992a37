//! Fulfillment orchestrator: workflow launcher and retry / DLQ controller.
//!
//! The orchestrator starts one fulfillment workflow run per order and maps
//! every terminal failure through the error taxonomy. Transient failures are
//! retried with a bounded budget (the order is reset and a fresh run starts);
//! once the budget is spent the order is snapshotted onto the dead-letter
//! queue. Non-transient failures surface immediately.

mod queries;

pub use queries::{RuntimeWaveNotifier, StoreOrderQueries};

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::clock::{Clock, SharedClock};
use crate::error::{EngineError, ErrorKind};
use crate::fulfillment::{
    CancellationInput, CancellationResult, OrderFulfillmentInput, OrderFulfillmentResult,
    ORDER_CANCELLATION_WORKFLOW, ORDER_FULFILLMENT_WORKFLOW,
};
use crate::models::order::Order;
use crate::models::retry::{
    DeadLetterEntry, DlqResolutionKind, RetryAttempt, RetryMetadata, DEFAULT_MAX_RETRIES,
};
use crate::outbox::{OutboxRepository, StorageError, TransactionalStore};
use crate::workflow::{WorkflowError, WorkflowRuntime};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Terminal outcome of driving one order.
#[derive(Debug)]
pub enum FulfillmentOutcome {
    Completed(OrderFulfillmentResult),
    Failed(EngineError),
    DeadLettered { entry_id: String },
}

const RETRY_METADATA_COLLECTION: &str = "retry_metadata";

/// Drives orders through the fulfillment workflow with bounded retry.
pub struct FulfillmentOrchestrator {
    runtime: Arc<WorkflowRuntime>,
    store: Arc<TransactionalStore>,
    orders: OutboxRepository<Order>,
    dead_letters: OutboxRepository<DeadLetterEntry>,
    clock: SharedClock,
    config: OrchestratorConfig,
}

impl FulfillmentOrchestrator {
    pub fn new(
        runtime: Arc<WorkflowRuntime>,
        store: Arc<TransactionalStore>,
        clock: SharedClock,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orders: OutboxRepository::new(Arc::clone(&store), "/wms/orders"),
            dead_letters: OutboxRepository::new(Arc::clone(&store), "/wms/orders"),
            runtime,
            store,
            clock,
            config,
        }
    }

    /// Run the fulfillment workflow for an order, retrying transient failures
    /// until success or the retry budget is spent.
    pub async fn fulfill_order(&self, input: OrderFulfillmentInput) -> FulfillmentOutcome {
        loop {
            let handle = match self
                .runtime
                .spawn(ORDER_FULFILLMENT_WORKFLOW, &input.order_id, &input)
            {
                Ok(handle) => handle,
                Err(err) => return FulfillmentOutcome::Failed(map_workflow_error(&err)),
            };
            let run_id = handle.run_id().to_string();

            match handle.result::<OrderFulfillmentResult>().await {
                Ok(result) => {
                    info!(order_id = %input.order_id, "order fulfillment succeeded");
                    return FulfillmentOutcome::Completed(result);
                }
                Err(err) if err.is_retryable() => {
                    match self.handle_transient_failure(&input.order_id, &err, &run_id) {
                        RetryDecision::RunAgain => continue,
                        RetryDecision::DeadLettered { entry_id } => {
                            return FulfillmentOutcome::DeadLettered { entry_id };
                        }
                        RetryDecision::Abort(engine_err) => {
                            return FulfillmentOutcome::Failed(engine_err);
                        }
                    }
                }
                Err(err) => {
                    warn!(order_id = %input.order_id, error = %err, "order fulfillment failed terminally");
                    return FulfillmentOutcome::Failed(map_workflow_error(&err));
                }
            }
        }
    }

    fn handle_transient_failure(
        &self,
        order_id: &str,
        err: &WorkflowError,
        run_id: &str,
    ) -> RetryDecision {
        let now = self.clock.now();
        let mut metadata = match self.load_retry_metadata(order_id) {
            Ok(metadata) => metadata,
            Err(storage) => {
                return RetryDecision::Abort(EngineError::transient(
                    "storage_unavailable",
                    storage.to_string(),
                ))
            }
        };

        let status = self
            .orders
            .get(order_id)
            .ok()
            .flatten()
            .map(|o| format!("{:?}", o.status()))
            .unwrap_or_else(|| "unknown".to_string());
        let count = metadata.increment(RetryAttempt {
            attempted_at: now,
            order_status: status,
            reason: err.message(),
            workflow_id: order_id.to_string(),
            run_id: run_id.to_string(),
        });
        if let Err(storage) = self.save_retry_metadata(&metadata) {
            return RetryDecision::Abort(EngineError::transient(
                "storage_unavailable",
                storage.to_string(),
            ));
        }

        if count < self.config.max_retries {
            info!(order_id, retry = count, error = %err, "scheduling workflow retry");
            if let Err(engine_err) = self.reset_order_for_retry(order_id, count, &err.message()) {
                return RetryDecision::Abort(engine_err);
            }
            RetryDecision::RunAgain
        } else {
            warn!(order_id, retries = count, "retry budget exhausted, moving to DLQ");
            match self.move_to_dead_letter(order_id, &metadata, &err.message()) {
                Ok(entry_id) => RetryDecision::DeadLettered { entry_id },
                Err(engine_err) => RetryDecision::Abort(engine_err),
            }
        }
    }

    /// Clear the wave assignment and park the order for the next run.
    fn reset_order_for_retry(
        &self,
        order_id: &str,
        retry_count: u32,
        reason: &str,
    ) -> Result<(), EngineError> {
        let mut order = self
            .orders
            .get(order_id)
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::not_found("order_not_found", format!("order {order_id}")))?;
        order
            .reset_for_retry(retry_count, reason, self.clock.now())
            .map_err(|err| EngineError::conflict("reset_failed", err.to_string()))?;
        self.orders.save(&mut order).map_err(storage_error)?;
        Ok(())
    }

    /// Snapshot the order into a dead-letter entry and mark it DeadLetter.
    fn move_to_dead_letter(
        &self,
        order_id: &str,
        metadata: &RetryMetadata,
        reason: &str,
    ) -> Result<String, EngineError> {
        let mut order = self
            .orders
            .get(order_id)
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::not_found("order_not_found", format!("order {order_id}")))?;

        let entry_id = format!("DLQ-{}", Uuid::new_v4().simple());
        let mut entry = DeadLetterEntry::new(
            &entry_id,
            reason,
            metadata,
            order.clone(),
            self.clock.now(),
        );
        self.dead_letters.save(&mut entry).map_err(storage_error)?;

        order
            .move_to_dead_letter(&entry_id, metadata.retry_count(), reason, self.clock.now())
            .map_err(|err| EngineError::conflict("dlq_transition_failed", err.to_string()))?;
        self.orders.save(&mut order).map_err(storage_error)?;
        error!(order_id, entry_id = %entry_id, reason, "order moved to dead-letter queue");
        Ok(entry_id)
    }

    /// Resolve a dead-letter entry exactly once.
    ///
    /// `manual_retry` starts a fresh workflow with a reset retry budget; the
    /// entry keeps the exhausted history as the audit record. `cancelled`
    /// runs the cancellation workflow. `escalated` records the resolution
    /// only.
    pub async fn resolve_dead_letter(
        &self,
        entry_id: &str,
        kind: DlqResolutionKind,
        notes: &str,
        resolver: &str,
    ) -> Result<Option<FulfillmentOutcome>, EngineError> {
        let mut entry = self
            .dead_letters
            .get(entry_id)
            .map_err(storage_error)?
            .ok_or_else(|| {
                EngineError::not_found("dlq_entry_not_found", format!("entry {entry_id}"))
            })?;
        entry
            .resolve(kind, notes, resolver, self.clock.now())
            .map_err(|err| EngineError::conflict("dlq_already_resolved", err.to_string()))?;
        let order_id = entry.order_id().to_string();
        let snapshot = entry.order_snapshot().clone();
        self.dead_letters.save(&mut entry).map_err(storage_error)?;

        match kind {
            DlqResolutionKind::ManualRetry => {
                let fresh = RetryMetadata::new(&order_id, self.config.max_retries, self.clock.now());
                self.save_retry_metadata(&fresh).map_err(storage_error)?;
                self.reset_order_for_retry(&order_id, 0, "manual retry from DLQ")?;

                let input = OrderFulfillmentInput {
                    order_id: order_id.clone(),
                    priority: snapshot.priority(),
                    items: snapshot
                        .items()
                        .iter()
                        .map(|i| crate::fulfillment::FulfillmentItem {
                            sku: i.sku.clone(),
                            quantity: i.quantity,
                            weight_grams: u64::from(i.quantity) * u64::from(i.unit_weight_grams),
                            zone: i.zone.clone(),
                        })
                        .collect(),
                    consolidation_required: snapshot.consolidation_required(),
                    unit_tracking_enabled: true,
                };
                Ok(Some(self.fulfill_order(input).await))
            }
            DlqResolutionKind::Cancelled => {
                let result: Result<CancellationResult, WorkflowError> = self
                    .runtime
                    .run(
                        ORDER_CANCELLATION_WORKFLOW,
                        &format!("cancel-{order_id}"),
                        &CancellationInput {
                            order_id: order_id.clone(),
                            reason: notes.to_string(),
                        },
                    )
                    .await;
                result.map_err(|err| map_workflow_error(&err))?;
                Ok(None)
            }
            DlqResolutionKind::Escalated => {
                info!(entry_id, order_id = %order_id, "dead-letter entry escalated");
                Ok(None)
            }
        }
    }

    pub fn retry_metadata(&self, order_id: &str) -> Result<Option<RetryMetadata>, EngineError> {
        self.store
            .get_document(RETRY_METADATA_COLLECTION, order_id)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| EngineError::fatal("corrupt_metadata", err.to_string()))
    }

    pub fn dead_letter(&self, entry_id: &str) -> Result<Option<DeadLetterEntry>, EngineError> {
        self.dead_letters.get(entry_id).map_err(storage_error)
    }

    fn load_retry_metadata(&self, order_id: &str) -> Result<RetryMetadata, StorageError> {
        match self.store.get_document(RETRY_METADATA_COLLECTION, order_id) {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Ok(RetryMetadata::new(
                order_id,
                self.config.max_retries,
                self.clock.now(),
            )),
        }
    }

    fn save_retry_metadata(&self, metadata: &RetryMetadata) -> Result<(), StorageError> {
        let document = serde_json::to_value(metadata)?;
        let order_id = metadata.order_id().to_string();
        self.store.transaction(move |txn| {
            txn.upsert(RETRY_METADATA_COLLECTION, &order_id, document);
            Ok(())
        })
    }
}

enum RetryDecision {
    RunAgain,
    DeadLettered { entry_id: String },
    Abort(EngineError),
}

fn storage_error(err: StorageError) -> EngineError {
    EngineError::transient("storage_unavailable", err.to_string())
}

/// Fold a terminal workflow error into the engine taxonomy.
pub fn map_workflow_error(err: &WorkflowError) -> EngineError {
    match err {
        WorkflowError::Timeout { message } => {
            EngineError::transient("workflow_timeout", message.clone())
        }
        WorkflowError::ActivityFailed {
            retryable: true,
            message,
            code,
            ..
        } => EngineError::transient(code.clone(), message.clone()),
        WorkflowError::ActivityFailed {
            retryable: false,
            message,
            code,
            ..
        } => EngineError::new(ErrorKind::Compensable, code.clone(), message.clone()),
        WorkflowError::ApplicationFailure { code, message, .. } => {
            EngineError::validation(code.clone(), message.clone())
        }
        WorkflowError::Cancelled => EngineError::conflict("workflow_cancelled", "workflow cancelled"),
        WorkflowError::NotRegistered { name } => {
            EngineError::fatal("not_registered", format!("{name} is not registered"))
        }
        WorkflowError::Serialization { message } => {
            EngineError::fatal("serialization", message.clone())
        }
        WorkflowError::NonDeterministic { .. } => {
            EngineError::fatal("non_deterministic", err.message())
        }
    }
}
