//! Workflow runtime: registries, context and execution.
//!
//! Workflows and activities are registered by name so tests can substitute
//! mocks at the same seam production wiring uses. Workflow code receives a
//! `WorkflowCtx` and suspends only through it: activity calls, child
//! workflows, signals and timers. Each suspension point consumes one journal
//! index; on replay the recorded outcome is returned instead of re-executing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::clock::{Clock, SharedClock};
use crate::workflow::journal::{fingerprint, JournalEntry, JournalStore, StepKind, StepOutcome};
use crate::workflow::retry::execute_with_retry;
use crate::workflow::{ActivityError, RetryPolicy, SignalRouter, WorkflowError};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ActivityFn =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<Result<serde_json::Value, ActivityError>> + Send + Sync>;
type WorkflowFn = Arc<
    dyn Fn(WorkflowCtx, serde_json::Value) -> BoxFuture<Result<serde_json::Value, WorkflowError>>
        + Send
        + Sync,
>;

/// Durable workflow engine.
pub struct WorkflowRuntime {
    activities: RwLock<HashMap<String, ActivityFn>>,
    workflows: RwLock<HashMap<String, WorkflowFn>>,
    signals: SignalRouter,
    journal: Arc<dyn JournalStore>,
    clock: SharedClock,
    default_retry: RetryPolicy,
}

impl WorkflowRuntime {
    pub fn new(journal: Arc<dyn JournalStore>, clock: SharedClock) -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
            workflows: RwLock::new(HashMap::new()),
            signals: SignalRouter::new(),
            journal,
            clock,
            default_retry: RetryPolicy::default(),
        }
    }

    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Register an activity under a name. Typed DTOs round-trip through the
    /// registry seam; a payload that does not deserialize is a non-retryable
    /// failure.
    pub fn register_activity<I, O, F, Fut>(&self, name: &str, f: F)
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapped: ActivityFn = Arc::new(move |value: serde_json::Value| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let input: I = serde_json::from_value(value)
                    .map_err(|e| ActivityError::non_retryable("bad_input", e.to_string()))?;
                let output = f(input).await?;
                serde_json::to_value(output)
                    .map_err(|e| ActivityError::non_retryable("bad_output", e.to_string()))
            })
        });
        self.activities.write().insert(name.to_string(), wrapped);
    }

    /// Register a workflow function under a name.
    pub fn register_workflow<I, O, F, Fut>(&self, name: &str, f: F)
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(WorkflowCtx, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, WorkflowError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapped: WorkflowFn = Arc::new(move |ctx: WorkflowCtx, value: serde_json::Value| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let input: I = serde_json::from_value(value)?;
                let output = f(ctx, input).await?;
                Ok(serde_json::to_value(output)?)
            })
        });
        self.workflows.write().insert(name.to_string(), wrapped);
    }

    /// Deliver a typed signal to a workflow id.
    pub fn signal<T: Serialize>(&self, workflow_id: &str, name: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.signals.send(workflow_id, name, value),
            Err(err) => {
                tracing::error!(workflow_id, signal = name, error = %err, "signal payload dropped");
            }
        }
    }

    pub fn signals(&self) -> &SignalRouter {
        &self.signals
    }

    pub fn journal(&self) -> &Arc<dyn JournalStore> {
        &self.journal
    }

    /// Execute a workflow to completion on a fresh run id.
    pub async fn run<I, O>(
        self: &Arc<Self>,
        workflow: &str,
        workflow_id: &str,
        input: &I,
    ) -> Result<O, WorkflowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let run_id = Uuid::new_v4().to_string();
        self.run_with_run_id(workflow, workflow_id, &run_id, input)
            .await
    }

    /// Execute (or resume, if the journal has entries) a specific run id.
    pub async fn run_with_run_id<I, O>(
        self: &Arc<Self>,
        workflow: &str,
        workflow_id: &str,
        run_id: &str,
        input: &I,
    ) -> Result<O, WorkflowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let value = serde_json::to_value(input)?;
        let out = self
            .execute(workflow, workflow_id, run_id, value, cancel_rx)
            .await?;
        Ok(serde_json::from_value(out)?)
    }

    /// Start a workflow on its own task; the handle cancels cooperatively.
    pub fn spawn<I: Serialize>(
        self: &Arc<Self>,
        workflow: &str,
        workflow_id: &str,
        input: &I,
    ) -> Result<WorkflowHandle, WorkflowError> {
        let value = serde_json::to_value(input)?;
        let run_id = Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runtime = Arc::clone(self);
        let workflow = workflow.to_string();
        let wf_id = workflow_id.to_string();
        let rid = run_id.clone();
        let join = tokio::spawn(async move {
            runtime.execute(&workflow, &wf_id, &rid, value, cancel_rx).await
        });
        Ok(WorkflowHandle {
            workflow_id: workflow_id.to_string(),
            run_id,
            cancel_tx,
            join,
        })
    }

    pub(crate) async fn execute(
        self: &Arc<Self>,
        workflow: &str,
        workflow_id: &str,
        run_id: &str,
        input: serde_json::Value,
        cancel: watch::Receiver<bool>,
    ) -> Result<serde_json::Value, WorkflowError> {
        let wf = self
            .workflows
            .read()
            .get(workflow)
            .cloned()
            .ok_or_else(|| WorkflowError::NotRegistered {
                name: workflow.to_string(),
            })?;
        info!(workflow, workflow_id, run_id, "workflow run starting");
        let ctx = WorkflowCtx {
            runtime: Arc::clone(self),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            cursor: Arc::new(AtomicU32::new(0)),
            cancel,
        };
        let result = wf(ctx, input).await;
        match &result {
            Ok(_) => info!(workflow, workflow_id, run_id, "workflow run completed"),
            Err(err) => info!(workflow, workflow_id, run_id, error = %err, "workflow run failed"),
        }
        result
    }
}

/// Handle to a spawned workflow run.
pub struct WorkflowHandle {
    workflow_id: String,
    run_id: String,
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<Result<serde_json::Value, WorkflowError>>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cooperative teardown; observed at the next suspension point.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub async fn result<O: DeserializeOwned>(self) -> Result<O, WorkflowError> {
        match self.join.await {
            Ok(Ok(value)) => Ok(serde_json::from_value(value)?),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(WorkflowError::ApplicationFailure {
                code: "workflow_panicked".to_string(),
                message: join_err.to_string(),
                retryable: false,
            }),
        }
    }
}

/// Completes only when cancellation is requested.
async fn wait_cancelled(mut rx: watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender gone: this run can no longer be cancelled.
    std::future::pending::<()>().await;
}

/// Execution context handed to workflow code. All suspension happens here.
#[derive(Clone)]
pub struct WorkflowCtx {
    runtime: Arc<WorkflowRuntime>,
    workflow_id: String,
    run_id: String,
    cursor: Arc<AtomicU32>,
    cancel: watch::Receiver<bool>,
}

impl WorkflowCtx {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn next_index(&self) -> u32 {
        self.cursor.fetch_add(1, Ordering::SeqCst)
    }

    /// Journal lookup for this step; a recorded entry whose identity differs
    /// from the step the code is about to run means the workflow code is not
    /// deterministic.
    fn replay_check(
        &self,
        index: u32,
        kind: StepKind,
        key: &str,
    ) -> Result<Option<StepOutcome>, WorkflowError> {
        match self.runtime.journal.entry_at(&self.run_id, index) {
            None => Ok(None),
            Some(entry) => {
                if entry.kind != kind || entry.key != key {
                    return Err(WorkflowError::NonDeterministic {
                        index,
                        recorded: format!("{}:{}", entry.kind.as_str(), entry.key),
                        actual: format!("{}:{}", kind.as_str(), key),
                    });
                }
                debug!(run_id = %self.run_id, index, key, "step replayed from journal");
                Ok(Some(entry.outcome))
            }
        }
    }

    fn record(
        &self,
        index: u32,
        kind: StepKind,
        key: &str,
        input_fingerprint: String,
        outcome: StepOutcome,
    ) {
        self.runtime.journal.append(
            &self.run_id,
            JournalEntry {
                index,
                kind,
                key: key.to_string(),
                input_fingerprint,
                outcome,
                recorded_at: self.runtime.clock.now(),
            },
        );
    }

    fn failed_outcome_to_error(kind: StepKind, key: &str, code: &str, message: &str, retryable: bool) -> WorkflowError {
        match kind {
            StepKind::Activity => WorkflowError::ActivityFailed {
                activity: key.to_string(),
                code: code.to_string(),
                message: message.to_string(),
                retryable,
            },
            StepKind::Signal => WorkflowError::Timeout {
                message: message.to_string(),
            },
            _ => WorkflowError::ApplicationFailure {
                code: code.to_string(),
                message: message.to_string(),
                retryable,
            },
        }
    }

    fn error_to_failed_outcome(err: &WorkflowError) -> StepOutcome {
        let code = match err {
            WorkflowError::ActivityFailed { code, .. }
            | WorkflowError::ApplicationFailure { code, .. } => code.clone(),
            WorkflowError::Timeout { .. } => "timeout".to_string(),
            WorkflowError::Cancelled => "cancelled".to_string(),
            WorkflowError::NotRegistered { .. } => "not_registered".to_string(),
            WorkflowError::Serialization { .. } => "serialization".to_string(),
            WorkflowError::NonDeterministic { .. } => "non_deterministic".to_string(),
        };
        StepOutcome::Failed {
            code,
            message: err.message(),
            retryable: err.is_retryable(),
        }
    }

    /// Invoke an activity with the runtime's default retry policy.
    pub async fn activity<I, O>(&self, name: &str, input: &I) -> Result<O, WorkflowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.activity_with_policy(name, input, self.runtime.default_retry)
            .await
    }

    /// Invoke an activity under an explicit retry policy.
    pub async fn activity_with_policy<I, O>(
        &self,
        name: &str,
        input: &I,
        policy: RetryPolicy,
    ) -> Result<O, WorkflowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let index = self.next_index();
        let input_value = serde_json::to_value(input)?;
        if let Some(outcome) = self.replay_check(index, StepKind::Activity, name)? {
            return match outcome {
                StepOutcome::Completed(value) => Ok(serde_json::from_value(value)?),
                StepOutcome::Failed {
                    code,
                    message,
                    retryable,
                } => Err(Self::failed_outcome_to_error(
                    StepKind::Activity,
                    name,
                    &code,
                    &message,
                    retryable,
                )),
            };
        }
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let handler = self
            .runtime
            .activities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotRegistered {
                name: name.to_string(),
            })?;

        let fp = fingerprint(&input_value);
        let attempt_input = input_value.clone();
        let result = tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel.clone()) => {
                return Err(WorkflowError::Cancelled);
            }
            result = execute_with_retry(&policy, name, || handler(attempt_input.clone())) => result,
        };

        match result {
            Ok(value) => {
                self.record(
                    index,
                    StepKind::Activity,
                    name,
                    fp,
                    StepOutcome::Completed(value.clone()),
                );
                Ok(serde_json::from_value(value)?)
            }
            Err(err) => {
                self.record(
                    index,
                    StepKind::Activity,
                    name,
                    fp,
                    StepOutcome::Failed {
                        code: err.code().to_string(),
                        message: err.message().to_string(),
                        retryable: err.is_retryable(),
                    },
                );
                Err(WorkflowError::from_activity(name, err))
            }
        }
    }

    /// Launch a child workflow and await its result. The child shares the
    /// parent's cancellation and runs under a deterministic child run id.
    pub async fn child_workflow<I, O>(
        &self,
        name: &str,
        child_workflow_id: &str,
        input: &I,
    ) -> Result<O, WorkflowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let index = self.next_index();
        let input_value = serde_json::to_value(input)?;
        if let Some(outcome) = self.replay_check(index, StepKind::ChildWorkflow, name)? {
            return match outcome {
                StepOutcome::Completed(value) => Ok(serde_json::from_value(value)?),
                StepOutcome::Failed {
                    code,
                    message,
                    retryable,
                } => Err(Self::failed_outcome_to_error(
                    StepKind::ChildWorkflow,
                    name,
                    &code,
                    &message,
                    retryable,
                )),
            };
        }
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let fp = fingerprint(&input_value);
        let child_run_id = format!("{}#{}", self.run_id, index);
        let result = self
            .runtime
            .execute(
                name,
                child_workflow_id,
                &child_run_id,
                input_value,
                self.cancel.clone(),
            )
            .await;

        match result {
            Ok(value) => {
                self.record(
                    index,
                    StepKind::ChildWorkflow,
                    name,
                    fp,
                    StepOutcome::Completed(value.clone()),
                );
                Ok(serde_json::from_value(value)?)
            }
            Err(err) => {
                self.record(
                    index,
                    StepKind::ChildWorkflow,
                    name,
                    fp,
                    Self::error_to_failed_outcome(&err),
                );
                Err(err)
            }
        }
    }

    /// Wait for a named signal, up to `timeout`.
    pub async fn await_signal<T: DeserializeOwned>(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<T, WorkflowError> {
        let index = self.next_index();
        if let Some(outcome) = self.replay_check(index, StepKind::Signal, name)? {
            return match outcome {
                StepOutcome::Completed(value) => Ok(serde_json::from_value(value)?),
                StepOutcome::Failed { message, .. } => Err(WorkflowError::Timeout { message }),
            };
        }
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let fp = fingerprint(&serde_json::json!({
            "signal": name,
            "timeout_ms": timeout.as_millis() as u64,
        }));
        let received = tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel.clone()) => {
                return Err(WorkflowError::Cancelled);
            }
            payload = self.runtime.signals.receive(&self.workflow_id, name, timeout) => payload,
        };

        match received {
            Some(value) => {
                self.record(
                    index,
                    StepKind::Signal,
                    name,
                    fp,
                    StepOutcome::Completed(value.clone()),
                );
                Ok(serde_json::from_value(value)?)
            }
            None => {
                let message = format!("timed out waiting for signal {name}");
                self.record(
                    index,
                    StepKind::Signal,
                    name,
                    fp,
                    StepOutcome::Failed {
                        code: "signal_timeout".to_string(),
                        message: message.clone(),
                        retryable: true,
                    },
                );
                Err(WorkflowError::Timeout { message })
            }
        }
    }

    /// Durable timer.
    pub async fn sleep(&self, duration: Duration) -> Result<(), WorkflowError> {
        let index = self.next_index();
        if self.replay_check(index, StepKind::Timer, "timer")?.is_some() {
            return Ok(());
        }
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        let fp = fingerprint(&serde_json::json!({ "sleep_ms": duration.as_millis() as u64 }));
        tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel.clone()) => {
                return Err(WorkflowError::Cancelled);
            }
            _ = tokio::time::sleep(duration) => {}
        }
        self.record(
            index,
            StepKind::Timer,
            "timer",
            fp,
            StepOutcome::Completed(serde_json::Value::Null),
        );
        Ok(())
    }
}
