// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Query Executor - dual-path execution engine
//!
//! Runs a validated request against the engine's native query interface and
//! falls back to the object model exactly once when the native path reports
//! the request as unsupported or blocked, or times out.
//!
//! ```text
//!   native attempt ──ok──────────────────────────────▶ outcome
//!        │
//!        ├─ unsupported / blocked / timeout ─▶ translate ─▶ object-model attempt
//!        │                                        │              │
//!        │                                  no translation   ok / failed
//!        │                                        ▼              ▼
//!        │                        FallbackExhausted | Timeout   outcome | FallbackExhausted
//!        │
//!        └─ fault ─▶ InternalError (fallback only when opted in per kind)
//! ```
//!
//! Each attempt runs on its own task raced against the operation kind's
//! deadline. On expiry the attempt's cancellation token fires and the task is
//! detached; its eventual result is discarded.

use crate::config::ExecutionConfig;
use crate::plan::{ExecutionPlan, ModePlanner};
use crate::timeouts::ToolTimeoutRegistry;
use crate::tracer::PerformanceTracer;
use crate::translate::{DmvTranslator, Translation};
use async_trait::async_trait;
use olapgate_core::{
    EngineConnection, EngineError, EngineRows, EngineTracing, ExecutionPath, ExecutionTrace,
    GatewayError, NativeStatement, ObjectModelPath, OperationKind, QueryRequest, RunStats,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Rows and timing produced by a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub rows: EngineRows,
    pub trace: ExecutionTrace,
    /// Which interface served the rows
    pub path: ExecutionPath,
}

/// Anything that can run a validated request. The gateway only sees this
/// seam, so tests can substitute the whole execution layer.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, request: &QueryRequest) -> Result<ExecutionOutcome, GatewayError>;
}

/// Why a single path attempt failed.
#[derive(Debug, Clone, Error)]
enum AttemptFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("attempt exceeded {0:?}")]
    TimedOut(Duration),

    #[error("attempt task failed: {0}")]
    Crashed(String),
}

struct AttemptOutput {
    rows: EngineRows,
    trace: ExecutionTrace,
}

/// Executor configuration derived from `execution.*`
#[derive(Debug, Clone, Default)]
pub struct ExecutorPolicy {
    /// Kinds for which a generic engine fault also routes to the fallback path
    pub fallback_on_fault: HashSet<OperationKind>,
}

impl ExecutorPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            fallback_on_fault: config.fallback_on_fault.iter().copied().collect(),
        }
    }
}

/// Dual-path query executor
pub struct QueryExecutor {
    connection: Arc<dyn EngineConnection>,
    timeouts: Arc<ToolTimeoutRegistry>,
    tracer: Arc<PerformanceTracer>,
    planner: Arc<ModePlanner>,
    translator: Arc<DmvTranslator>,
    policy: ExecutorPolicy,
}

impl QueryExecutor {
    pub fn new(
        connection: Arc<dyn EngineConnection>,
        timeouts: Arc<ToolTimeoutRegistry>,
        tracer: Arc<PerformanceTracer>,
        planner: Arc<ModePlanner>,
        translator: Arc<DmvTranslator>,
        policy: ExecutorPolicy,
    ) -> Self {
        Self {
            connection,
            timeouts,
            tracer,
            planner,
            translator,
            policy,
        }
    }

    /// Execute `request`, falling back at most once.
    pub async fn execute(&self, request: &QueryRequest) -> Result<ExecutionOutcome, GatewayError> {
        let kind = request.operation_kind();
        let plan = self.planner.plan(request);
        debug!(operation = %kind, ?plan, "Planned execution");

        let primary = match self.attempt_native(request, plan).await {
            Ok(output) => return Ok(output.into_outcome(ExecutionPath::Native)),
            Err(failure) => failure,
        };

        if !self.should_fall_back(kind, &primary) {
            return Err(terminal_error(kind, ExecutionPath::Native, primary));
        }

        let translation = self.translator.translate(request.text());
        let object_model = self.connection.object_model();

        let (translation, object_model) = match (translation, object_model) {
            (Some(translation), Some(object_model)) => (translation, object_model),
            (_, None) => {
                return Err(no_fallback(kind, primary, "engine exposes no object model"));
            }
            (None, Some(_)) => {
                return Err(no_fallback(
                    kind,
                    primary,
                    "no object-model translation for this request",
                ));
            }
        };

        info!(
            operation = %kind,
            primary_failure = %primary,
            collection = ?translation.collection,
            "Native path refused request, falling back to object model"
        );

        match self
            .attempt_object_model(kind, object_model, translation, plan)
            .await
        {
            Ok(output) => Ok(output.into_outcome(ExecutionPath::ObjectModel)),
            Err(fallback) => Err(GatewayError::FallbackExhausted {
                primary: primary.to_string(),
                fallback: fallback.to_string(),
            }),
        }
    }

    fn should_fall_back(&self, kind: OperationKind, failure: &AttemptFailure) -> bool {
        match failure {
            AttemptFailure::Engine(e) if e.is_fallback_signal() => true,
            AttemptFailure::TimedOut(_) => true,
            AttemptFailure::Engine(EngineError::Fault(_)) => {
                self.policy.fallback_on_fault.contains(&kind)
            }
            AttemptFailure::Engine(_) | AttemptFailure::Crashed(_) => false,
        }
    }

    async fn attempt_native(
        &self,
        request: &QueryRequest,
        plan: ExecutionPlan,
    ) -> Result<AttemptOutput, AttemptFailure> {
        let native = self.connection.native();
        let tracing = native.tracing();
        let statement = NativeStatement {
            text: request.text().to_string(),
            row_limit: plan.row_limit(),
        };

        let cancel = CancellationToken::new();
        let call_cancel = cancel.clone();
        let call = move || {
            let native = native.clone();
            let statement = statement.clone();
            let cancel = call_cancel.clone();
            async move { native.execute(statement, cancel).await }
        };

        let work = run_plan(plan, self.tracer.clone(), tracing, call);
        self.bounded(request.operation_kind(), ExecutionPath::Native, cancel, work)
            .await
    }

    async fn attempt_object_model(
        &self,
        kind: OperationKind,
        object_model: Arc<dyn ObjectModelPath>,
        translation: Translation,
        plan: ExecutionPlan,
    ) -> Result<AttemptOutput, AttemptFailure> {
        let tracing = object_model.tracing();
        let translation = Arc::new(translation);
        let om_request = translation.request(plan.row_limit());

        let cancel = CancellationToken::new();
        let call_cancel = cancel.clone();
        let call = move || {
            let object_model = object_model.clone();
            let translation = translation.clone();
            let om_request = om_request.clone();
            let cancel = call_cancel.clone();
            async move {
                let rows = object_model.fetch(om_request, cancel).await?;
                Ok(translation.apply(rows))
            }
        };

        let work = run_plan(plan, self.tracer.clone(), tracing, call);
        self.bounded(kind, ExecutionPath::ObjectModel, cancel, work).await
    }

    /// Race one attempt against the kind's deadline.
    async fn bounded<W>(
        &self,
        kind: OperationKind,
        path: ExecutionPath,
        cancel: CancellationToken,
        work: W,
    ) -> Result<AttemptOutput, AttemptFailure>
    where
        W: Future<Output = Result<AttemptOutput, EngineError>> + Send + 'static,
    {
        let limit = self.timeouts.get(kind);
        let mut handle = tokio::spawn(work);

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result.map_err(AttemptFailure::from),
            Ok(Err(join_error)) => {
                warn!(operation = %kind, %path, error = %join_error, "Attempt task failed");
                Err(AttemptFailure::Crashed(join_error.to_string()))
            }
            Err(_) => {
                // Dropping the handle detaches the task; its result is discarded
                cancel.cancel();
                warn!(
                    operation = %kind,
                    %path,
                    timeout_ms = limit.as_millis() as u64,
                    "Attempt exceeded deadline, abandoning"
                );
                Err(AttemptFailure::TimedOut(limit))
            }
        }
    }
}

#[async_trait]
impl QueryRunner for QueryExecutor {
    async fn run(&self, request: &QueryRequest) -> Result<ExecutionOutcome, GatewayError> {
        self.execute(request).await
    }
}

impl AttemptOutput {
    fn into_outcome(self, path: ExecutionPath) -> ExecutionOutcome {
        ExecutionOutcome {
            rows: self.rows,
            trace: self.trace,
            path,
        }
    }
}

/// The native path asked for a fallback that cannot happen. A timed-out
/// primary keeps its timeout; anything else is exhausted.
fn no_fallback(kind: OperationKind, primary: AttemptFailure, reason: &str) -> GatewayError {
    match primary {
        AttemptFailure::TimedOut(_) => terminal_error(kind, ExecutionPath::Native, primary),
        _ => GatewayError::FallbackExhausted {
            primary: primary.to_string(),
            fallback: reason.to_string(),
        },
    }
}

fn terminal_error(kind: OperationKind, path: ExecutionPath, failure: AttemptFailure) -> GatewayError {
    match failure {
        AttemptFailure::Engine(e) => GatewayError::Engine(e),
        AttemptFailure::TimedOut(timeout) => GatewayError::Timeout {
            operation: kind,
            path,
            timeout,
        },
        AttemptFailure::Crashed(detail) => GatewayError::Internal(detail),
    }
}

/// Run every repetition the plan asks for, keeping the fastest run's rows
/// and trace and attaching the run distribution in analyze mode.
async fn run_plan<F, Fut>(
    plan: ExecutionPlan,
    tracer: Arc<PerformanceTracer>,
    tracing: Option<Arc<dyn EngineTracing>>,
    call: F,
) -> Result<AttemptOutput, EngineError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<EngineRows, EngineError>> + Send,
{
    let mut fastest: Option<(EngineRows, ExecutionTrace)> = None;
    let mut samples = Vec::with_capacity(plan.run_count() as usize);

    for _ in 0..plan.run_count() {
        let pending = call();
        let (result, trace) = tracer.measure(tracing.clone(), pending).await;
        let rows = result?;
        samples.push(trace.total_millis);

        let faster = fastest
            .as_ref()
            .map_or(true, |(_, best)| trace.total_millis < best.total_millis);
        if faster {
            fastest = Some((rows, trace));
        }
    }

    let (rows, mut trace) =
        fastest.ok_or_else(|| EngineError::Fault("plan executed no runs".to_string()))?;
    if plan.reports_runs() {
        trace.runs = RunStats::from_samples(&samples);
    }

    Ok(AttemptOutput {
        rows: plan.apply_row_limit(rows),
        trace,
    })
}
