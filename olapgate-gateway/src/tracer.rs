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

//! Performance tracing around engine calls
//!
//! ```text
//! wall time  ─────────────────────────────────────────────
//! engine     ├── storage engine ──┤├─ formula engine ─┤
//! client                                              ├──┤
//! ```
//!
//! `engine_millis` is the engine's own query-total event when present,
//! otherwise the SE + FE sum, clamped to wall time. The remainder is client
//! time (transport, serialization). Trace session failures only degrade the
//! trace to wall-clock; the query result is passed through untouched.
//!
//! Starting and stopping a session are each bounded by the tracer's control
//! timeout, so a hung trace session cannot eat into the attempt deadline.

use olapgate_core::{
    EngineError, EngineTraceEvent, EngineTracing, ExecutionTrace, TraceEvent, TraceEventClass,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::warn;

/// Upper bound for one trace session start or stop call
pub const TRACE_CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PerformanceTracer {
    control_timeout: Duration,
}

impl Default for PerformanceTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracer {
    pub fn new() -> Self {
        Self {
            control_timeout: TRACE_CONTROL_TIMEOUT,
        }
    }

    pub fn with_control_timeout(control_timeout: Duration) -> Self {
        Self { control_timeout }
    }

    /// Run `execution`, tracing it with `tracing` when available.
    pub async fn measure<T, F>(
        &self,
        tracing: Option<Arc<dyn EngineTracing>>,
        execution: F,
    ) -> (Result<T, EngineError>, ExecutionTrace)
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let session = match &tracing {
            Some(capability) => match timeout(self.control_timeout, capability.start()).await {
                Ok(Ok(session)) => Some((capability.clone(), session)),
                Ok(Err(e)) => {
                    warn!(error = %e, "Failed to start engine trace, falling back to wall clock");
                    None
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.control_timeout.as_millis() as u64,
                        "Engine trace start timed out, falling back to wall clock"
                    );
                    None
                }
            },
            None => None,
        };

        let started = Instant::now();
        let result = execution.await;
        let wall_millis = started.elapsed().as_secs_f64() * 1000.0;

        let events = match session {
            Some((capability, session)) => {
                match timeout(self.control_timeout, capability.stop(session)).await {
                    Ok(Ok(events)) => Some(events),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Failed to stop engine trace, falling back to wall clock");
                        None
                    }
                    Err(_) => {
                        warn!(
                            timeout_ms = self.control_timeout.as_millis() as u64,
                            "Engine trace stop timed out, falling back to wall clock"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let trace = match events {
            Some(events) if !events.is_empty() => decompose(wall_millis, &events),
            _ => ExecutionTrace::wall_clock(wall_millis),
        };
        (result, trace)
    }
}

/// Split wall time into engine and client shares from captured events.
pub fn decompose(wall_millis: f64, events: &[EngineTraceEvent]) -> ExecutionTrace {
    let sum = |class: TraceEventClass| -> f64 {
        events
            .iter()
            .filter(|e| e.class == class)
            .map(|e| e.duration_millis.max(0.0))
            .sum()
    };

    let storage = sum(TraceEventClass::StorageEngine);
    let formula = sum(TraceEventClass::FormulaEngine);
    let has_total = events.iter().any(|e| e.class == TraceEventClass::QueryTotal);
    let reported = if has_total {
        sum(TraceEventClass::QueryTotal)
    } else {
        storage + formula
    };

    let engine = reported.min(wall_millis);
    let storage = storage.min(engine);

    ExecutionTrace {
        total_millis: wall_millis,
        engine_millis: Some(engine),
        client_millis: wall_millis - engine,
        storage_engine_millis: Some(storage),
        formula_engine_millis: Some(engine - storage),
        events: events
            .iter()
            .map(|e| TraceEvent {
                name: e.name.clone(),
                duration_millis: e.duration_millis,
            })
            .collect(),
        partial: false,
        runs: None,
    }
}
