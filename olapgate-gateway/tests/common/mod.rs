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

// Scriptable engine doubles shared by the integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use olapgate_core::{
    EngineConnection, EngineError, EngineRows, EngineTraceEvent, EngineTracing, ManualClock,
    NativeQueryPath, NativeStatement, ObjectModelPath, ObjectModelRequest, Row, TraceEventClass,
    TraceSessionId,
};
use olapgate_gateway::{GatewayConfig, GatewayContext, PolicyGateway};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn sales_rows(n: usize) -> EngineRows {
    (0..n)
        .map(|i| row(json!({"Region": format!("R{}", i), "Sales": i * 10})))
        .collect()
}

/// Waits for `delay` unless cancelled first.
async fn simulate(delay: Option<Duration>, cancel: &CancellationToken, cancelled: &AtomicUsize) -> bool {
    let Some(delay) = delay else {
        return true;
    };
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => {
            cancelled.fetch_add(1, Ordering::SeqCst);
            false
        }
    }
}

pub struct MockNative {
    pub response: Mutex<Result<EngineRows, EngineError>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub statements: Mutex<Vec<NativeStatement>>,
    pub tracing: Mutex<Option<Arc<dyn EngineTracing>>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockNative {
    pub fn returning(rows: EngineRows) -> Self {
        Self {
            response: Mutex::new(Ok(rows)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
            tracing: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: EngineError) -> Self {
        let native = Self::returning(Vec::new());
        *native.response.lock() = Err(error);
        native
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeQueryPath for MockNative {
    async fn execute(
        &self,
        statement: NativeStatement,
        cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(statement);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.lock();
        let finished = simulate(delay, &cancel, &self.cancelled).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !finished {
            return Err(EngineError::Cancelled);
        }
        self.response.lock().clone()
    }

    fn tracing(&self) -> Option<Arc<dyn EngineTracing>> {
        self.tracing.lock().clone()
    }
}

pub struct MockObjectModel {
    pub response: Mutex<Result<EngineRows, EngineError>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub requests: Mutex<Vec<ObjectModelRequest>>,
}

impl MockObjectModel {
    pub fn returning(rows: EngineRows) -> Self {
        Self {
            response: Mutex::new(Ok(rows)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectModelPath for MockObjectModel {
    async fn fetch(
        &self,
        request: ObjectModelRequest,
        cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        let delay = *self.delay.lock();
        if !simulate(delay, &cancel, &self.cancelled).await {
            return Err(EngineError::Cancelled);
        }
        self.response.lock().clone()
    }
}

/// Tracing capability that reports a fixed event list.
pub struct FixedTracing {
    pub events: Vec<EngineTraceEvent>,
}

impl FixedTracing {
    pub fn se_fe(storage_millis: f64, total_millis: f64) -> Self {
        Self {
            events: vec![
                EngineTraceEvent {
                    name: "VertiPaqSEQueryEnd".to_string(),
                    class: TraceEventClass::StorageEngine,
                    duration_millis: storage_millis,
                },
                EngineTraceEvent {
                    name: "QueryEnd".to_string(),
                    class: TraceEventClass::QueryTotal,
                    duration_millis: total_millis,
                },
            ],
        }
    }
}

#[async_trait]
impl EngineTracing for FixedTracing {
    async fn start(&self) -> Result<TraceSessionId, EngineError> {
        Ok(TraceSessionId(7))
    }

    async fn stop(&self, _session: TraceSessionId) -> Result<Vec<EngineTraceEvent>, EngineError> {
        Ok(self.events.clone())
    }
}

pub struct MockEngine {
    pub alive: AtomicBool,
    pub native: Arc<MockNative>,
    pub object_model: Option<Arc<MockObjectModel>>,
}

impl MockEngine {
    pub fn new(native: MockNative, object_model: Option<MockObjectModel>) -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            native: Arc::new(native),
            object_model: object_model.map(Arc::new),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(
            MockNative::returning(sales_rows(3)),
            Some(MockObjectModel::returning(Vec::new())),
        )
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn object_model_calls(&self) -> usize {
        self.object_model.as_ref().map_or(0, |om| om.calls())
    }
}

impl EngineConnection for MockEngine {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn native(&self) -> Arc<dyn NativeQueryPath> {
        self.native.clone()
    }

    fn object_model(&self) -> Option<Arc<dyn ObjectModelPath>> {
        self.object_model
            .clone()
            .map(|om| om as Arc<dyn ObjectModelPath>)
    }
}

/// Gateway over `engine` on a manual clock.
pub fn gateway_with(
    config: GatewayConfig,
    engine: Arc<MockEngine>,
) -> (PolicyGateway, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let context = GatewayContext::new(config, engine).with_clock(clock.clone());
    let gateway = PolicyGateway::new(context).expect("default gateway builds");
    (gateway, clock)
}

pub fn gateway(engine: Arc<MockEngine>) -> (PolicyGateway, Arc<ManualClock>) {
    gateway_with(GatewayConfig::default(), engine)
}
