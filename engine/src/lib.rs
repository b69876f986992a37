//! Warehouse fulfillment engine.
//!
//! Distributed fulfillment core: durable order workflows with saga
//! compensation, a transactional outbox feeding a CloudEvents bus, wave
//! planning with a continuous-release mode, and a double-entry inventory
//! ledger over cost layers.
//!
//! # Architecture
//!
//! - **core**: clock abstraction
//! - **money**: integer minor-unit money and FIFO/LIFO cost layers
//! - **models**: domain aggregates and the domain event catalog
//! - **outbox**: transactional store and the background publisher
//! - **bus**: CloudEvents envelope and event bus adapter
//! - **waving**: wave planner and the continuous waving loop
//! - **workflow**: journaled durable workflow runtime
//! - **fulfillment**: saga workflows and activity contracts
//! - **orchestrator**: workflow launcher and retry / DLQ controller
//! - **idempotency**: request-key and message dedup stores
//!
//! # Critical Invariants
//!
//! 1. All money values are integer minor units; negatives cannot exist
//! 2. No event is published without its aggregate change having committed
//! 3. Workflow code is deterministic; all IO lives in activities

pub mod bus;
pub mod core;
pub mod error;
pub mod fulfillment;
pub mod idempotency;
pub mod models;
pub mod money;
pub mod orchestrator;
pub mod outbox;
pub mod waving;
pub mod workflow;

// Re-exports for convenience
pub use bus::{CloudEvent, EventBus, InMemoryEventBus};
pub use core::clock::{Clock, SharedClock, SimulatedClock, SystemClock};
pub use error::{EngineError, ErrorKind};
pub use models::{
    inventory::InventoryItem,
    ledger::InventoryLedger,
    order::{Order, OrderError, OrderStatus, Priority},
    wave::{Wave, WaveStatus},
    Aggregate, DomainEvent, EventMeta,
};
pub use money::{CostLayer, CostLayers, Currency, Money, MoneyError, ValuationMethod};
pub use orchestrator::{FulfillmentOrchestrator, FulfillmentOutcome, OrchestratorConfig};
pub use outbox::{OutboxPublisher, OutboxRepository, TransactionalStore};
pub use waving::{ContinuousWavingLoop, WavePlanner, WavePlanningConfig};
pub use workflow::{ActivityError, RetryPolicy, WorkflowError, WorkflowRuntime};
