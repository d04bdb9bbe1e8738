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

//! Policy gateway facade
//!
//! ```text
//! validate ─▶ admit ─▶ liveness ─▶ cache lookup ─▶ [engine lock] execute ─▶ cache store
//!    │          │         │             │                    │
//!    └──────────┴─────────┴──── hit ────┴────── failure ─────┴─▶ ErrorHandler
//! ```
//!
//! Each stage's failure short-circuits the rest. Validation, admission and
//! cache lookup run concurrently across callers; only the execute stage is
//! serialized, since the engine connection is a single shared resource.

use crate::cache::{cache_key, QueryCache};
use crate::config::ConfigError;
use crate::context::GatewayContext;
use crate::diagnostics::{Diagnostics, GatewayDiagnostics};
use crate::error_handler::ErrorHandler;
use crate::executor::{ExecutorPolicy, QueryExecutor, QueryRunner};
use crate::plan::{classifier_for, ExpensivePatternClassifier, ModePlanner};
use crate::rate_limit::{Admission, RateLimiter};
use crate::registry::{ComponentRegistry, RegistryError};
use crate::timeouts::ToolTimeoutRegistry;
use crate::tracer::PerformanceTracer;
use crate::translate::DmvTranslator;
use crate::validation::InputValidator;
use olapgate_core::{
    ExecutionResult, GatewayError, OperationKind, QueryRequest, Row,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("Invalid gateway configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn construction(component: &str, error: ConfigError) -> RegistryError {
    RegistryError::Construction {
        component: component.to_string(),
        reason: error.to_string(),
    }
}

/// Builds a [`PolicyGateway`] through the component registry.
pub struct PolicyGatewayBuilder {
    context: GatewayContext,
    runner: Option<Arc<dyn QueryRunner>>,
    classifier: Option<Arc<dyn ExpensivePatternClassifier>>,
}

impl PolicyGatewayBuilder {
    /// Replace the executor, e.g. with a mock in tests.
    pub fn with_runner(mut self, runner: Arc<dyn QueryRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Replace the `auto` mode classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn ExpensivePatternClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// The registry this builder resolves, with overrides applied.
    pub fn registry(&self) -> Result<ComponentRegistry, RegistryError> {
        let mut registry = ComponentRegistry::new();
        let context = self.context.clone();

        registry.register("context", &[], move |_| Ok(context.clone()))?;

        registry.register("validator", &["context"], |c| {
            let context: GatewayContext = c.get("context")?;
            InputValidator::new(&context.config.validation)
                .map(Arc::new)
                .map_err(|e| construction("validator", e))
        })?;

        registry.register("rate_limiter", &["context"], |c| {
            let context: GatewayContext = c.get("context")?;
            Ok(Arc::new(RateLimiter::new(
                &context.config.rate_limits,
                context.clock.clone(),
            )))
        })?;

        registry.register("cache", &["context"], |c| {
            let context: GatewayContext = c.get("context")?;
            Ok(Arc::new(QueryCache::<ExecutionResult>::new(
                context.config.cache.max_entries,
                context.config.cache.ttl(),
                context.clock.clone(),
            )))
        })?;

        registry.register("timeouts", &["context"], |c| {
            let context: GatewayContext = c.get("context")?;
            Ok(Arc::new(ToolTimeoutRegistry::new(&context.config.timeouts)))
        })?;

        registry.register("tracer", &[], |_| Ok(Arc::new(PerformanceTracer::new())))?;

        registry.register("classifier", &["context"], |c| {
            let context: GatewayContext = c.get("context")?;
            classifier_for(&context.config.execution).map_err(|e| construction("classifier", e))
        })?;
        if let Some(classifier) = &self.classifier {
            let classifier = classifier.clone();
            registry.replace("classifier", &[], move |_| Ok(classifier.clone()));
        }

        registry.register("planner", &["context", "classifier"], |c| {
            let context: GatewayContext = c.get("context")?;
            let classifier: Arc<dyn ExpensivePatternClassifier> = c.get("classifier")?;
            Ok(Arc::new(ModePlanner::new(&context.config.execution, classifier)))
        })?;

        registry.register("translator", &[], |_| Ok(Arc::new(DmvTranslator::new())))?;

        registry.register(
            "executor",
            &["context", "timeouts", "tracer", "planner", "translator"],
            |c| {
                let context: GatewayContext = c.get("context")?;
                let executor = QueryExecutor::new(
                    context.connection.clone(),
                    c.get("timeouts")?,
                    c.get("tracer")?,
                    c.get("planner")?,
                    c.get("translator")?,
                    ExecutorPolicy::from_config(&context.config.execution),
                );
                Ok(Arc::new(executor) as Arc<dyn QueryRunner>)
            },
        )?;
        if let Some(runner) = &self.runner {
            let runner = runner.clone();
            registry.replace("executor", &[], move |_| Ok(runner.clone()));
        }

        registry.register("error_handler", &[], |_| Ok(ErrorHandler::new()))?;
        registry.register("diagnostics", &[], |_| Ok(Arc::new(Diagnostics::new())))?;

        Ok(registry)
    }

    pub fn build(self) -> Result<PolicyGateway, GatewayBuildError> {
        self.context.config.validate()?;
        let components = self.registry()?.resolve()?;

        info!(
            cache_entries = self.context.config.cache.max_entries,
            cache_ttl_secs = self.context.config.cache.ttl_secs,
            strategy = ?self.context.config.rate_limits.strategy,
            custom_runner = self.runner.is_some(),
            "Policy gateway constructed"
        );

        Ok(PolicyGateway {
            context: components.get("context")?,
            validator: components.get("validator")?,
            rate_limiter: components.get("rate_limiter")?,
            cache: components.get("cache")?,
            runner: components.get("executor")?,
            error_handler: components.get("error_handler")?,
            diagnostics: components.get("diagnostics")?,
            engine_lock: Mutex::new(()),
        })
    }
}

/// Successful pipeline output
struct Served {
    result: ExecutionResult,
    cache_hit: bool,
}

/// The governed entry point for every engine request.
pub struct PolicyGateway {
    context: GatewayContext,
    validator: Arc<InputValidator>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<QueryCache<ExecutionResult>>,
    runner: Arc<dyn QueryRunner>,
    error_handler: ErrorHandler,
    diagnostics: Arc<Diagnostics>,
    /// Serializes the execute stage against the single engine connection
    engine_lock: Mutex<()>,
}

impl PolicyGateway {
    pub fn builder(context: GatewayContext) -> PolicyGatewayBuilder {
        PolicyGatewayBuilder {
            context,
            runner: None,
            classifier: None,
        }
    }

    /// Gateway with the default component set.
    pub fn new(context: GatewayContext) -> Result<Self, GatewayBuildError> {
        Self::builder(context).build()
    }

    /// Run `request` through the full pipeline. Never fails: every failure
    /// comes back as a structured error result.
    pub async fn execute(&self, request: &QueryRequest) -> ExecutionResult {
        let kind = request.operation_kind();
        let started = Instant::now();

        let (result, cache_hit) = match self.pipeline(request).await {
            Ok(served) => (served.result, served.cache_hit),
            Err(failure) => (
                ExecutionResult::failure(self.error_handler.normalize(&failure, kind)),
                false,
            ),
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.diagnostics.record(kind, elapsed_ms, result.success, cache_hit);
        debug!(
            operation = %kind,
            success = result.success,
            cached = cache_hit,
            elapsed_ms,
            "Request completed"
        );
        result
    }

    async fn pipeline(&self, request: &QueryRequest) -> Result<Served, GatewayError> {
        let kind = request.operation_kind();

        let validation = self.validator.validate(request);
        if !validation.ok {
            return Err(GatewayError::ValidationFailed {
                reason: validation
                    .reason
                    .unwrap_or_else(|| "request rejected".to_string()),
            });
        }
        let request = match validation.sanitized_text {
            Some(text) if text != request.text() => request.with_text(text),
            _ => request.clone(),
        };

        self.admit(kind)?;
        self.ensure_alive()?;

        let key = (!request.bypass_cache()).then(|| {
            cache_key(kind, request.text(), request.max_rows(), request.mode())
        });
        if let Some(key) = &key {
            if let Some(hit) = self.cache.lookup(key) {
                return Ok(Served {
                    result: hit.as_cached(),
                    cache_hit: true,
                });
            }
        }

        let outcome = {
            let _engine = self.engine_lock.lock().await;
            self.runner.run(&request).await?
        };
        debug!(operation = %kind, path = %outcome.path, rows = outcome.rows.len(), "Executed");

        let result = ExecutionResult::success(outcome.rows, Some(outcome.trace));
        if let Some(key) = key {
            self.cache.store(key, result.clone(), self.cache.default_ttl());
        }

        Ok(Served {
            result,
            cache_hit: false,
        })
    }

    fn admit(&self, kind: OperationKind) -> Result<(), GatewayError> {
        match self.rate_limiter.check(kind) {
            Admission::Admitted { .. } => Ok(()),
            Admission::Rejected { retry_after } => Err(GatewayError::RateLimited {
                operation: kind,
                retry_after,
            }),
        }
    }

    fn ensure_alive(&self) -> Result<(), GatewayError> {
        if self.context.connection.is_alive() {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    /// Liveness probe, governed as a `connection_attempt`.
    pub async fn check_connection(&self) -> ExecutionResult {
        let kind = OperationKind::ConnectionAttempt;
        let started = Instant::now();

        let result = match self.admit(kind).and_then(|_| self.ensure_alive()) {
            Ok(()) => {
                let mut row = Row::new();
                row.insert("alive".to_string(), json!(true));
                row.insert(
                    "object_model".to_string(),
                    json!(self.context.connection.object_model().is_some()),
                );
                ExecutionResult::success(vec![row], None)
            }
            Err(failure) => {
                ExecutionResult::failure(self.error_handler.normalize(&failure, kind))
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.diagnostics.record(kind, elapsed_ms, result.success, false);
        result
    }

    /// Validate a caller-supplied parameter without executing anything.
    /// Returns the sanitized text, or the normalized rejection.
    pub fn check_input(&self, request: &QueryRequest) -> Result<String, ExecutionResult> {
        let validation = self.validator.validate(request);
        match (validation.ok, validation.sanitized_text) {
            (true, Some(text)) => Ok(text),
            (true, None) => Ok(request.text().to_string()),
            (false, _) => Err(self.failure(
                &GatewayError::ValidationFailed {
                    reason: validation
                        .reason
                        .unwrap_or_else(|| "request rejected".to_string()),
                },
                request.operation_kind(),
            )),
        }
    }

    /// Normalize a failure raised outside the pipeline, e.g. while writing
    /// an export.
    pub fn failure(&self, failure: &GatewayError, kind: OperationKind) -> ExecutionResult {
        ExecutionResult::failure(self.error_handler.normalize(failure, kind))
    }

    /// Read-only snapshot of counters, cache and rate-limit state.
    pub fn diagnostics(&self) -> GatewayDiagnostics {
        GatewayDiagnostics {
            operations: self.diagnostics.snapshot(),
            cache: self.cache.stats(),
            rate_limits: self.rate_limiter.snapshot(),
        }
    }

    /// Drop cached results for one kind, or all of them.
    pub fn invalidate_cache(&self, kind: Option<OperationKind>) -> usize {
        match kind {
            Some(kind) => self.cache.invalidate_prefix(&format!("{}:", kind.as_str())),
            None => {
                let dropped = self.cache.len();
                self.cache.clear();
                dropped
            }
        }
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    pub fn context(&self) -> &GatewayContext {
        &self.context
    }
}
