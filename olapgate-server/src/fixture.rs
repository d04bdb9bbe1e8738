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

//! Fixture-backed engine
//!
//! Serves a tabular model described by a JSON file through the engine
//! capability traits, so the server runs without a desktop engine process.
//! Introspection requests are answered from the model collections; analytical
//! queries are answered from a table of canned results keyed by normalized
//! query text.

use async_trait::async_trait;
use olapgate_core::{
    EngineConnection, EngineError, EngineRows, EngineTraceEvent, EngineTracing, ModelCollection,
    NativeQueryPath, NativeStatement, ObjectModelPath, ObjectModelRequest, Row, TraceEventClass,
    TraceSessionId,
};
use olapgate_gateway::DmvTranslator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SAMPLE_FIXTURE: &str = include_str!("../fixtures/sample.json");

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Simulated engine timings applied to every canned query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureTimings {
    #[serde(default)]
    pub storage_engine_millis: f64,
    #[serde(default)]
    pub formula_engine_millis: f64,
}

impl FixtureTimings {
    fn total_millis(&self) -> f64 {
        self.storage_engine_millis + self.formula_engine_millis
    }
}

/// On-disk model description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureData {
    #[serde(default)]
    pub tables: Vec<Row>,
    #[serde(default)]
    pub columns: Vec<Row>,
    #[serde(default)]
    pub measures: Vec<Row>,
    #[serde(default)]
    pub relationships: Vec<Row>,
    #[serde(default)]
    pub partitions: Vec<Row>,
    #[serde(default)]
    pub hierarchies: Vec<Row>,
    #[serde(default)]
    pub roles: Vec<Row>,

    /// Canned analytical results keyed by query text
    #[serde(default)]
    pub queries: HashMap<String, Vec<Row>>,

    #[serde(default)]
    pub timings: FixtureTimings,

    /// Answer DMV queries on the native path with a policy block
    #[serde(default)]
    pub block_dmv: bool,

    /// Expose the object-model path
    #[serde(default = "default_object_model")]
    pub object_model: bool,
}

fn default_object_model() -> bool {
    true
}

impl FixtureData {
    fn collection(&self, collection: ModelCollection) -> &[Row] {
        match collection {
            ModelCollection::Tables => &self.tables,
            ModelCollection::Columns => &self.columns,
            ModelCollection::Measures => &self.measures,
            ModelCollection::Relationships => &self.relationships,
            ModelCollection::Partitions => &self.partitions,
            ModelCollection::Hierarchies => &self.hierarchies,
            ModelCollection::Roles => &self.roles,
        }
    }
}

/// Case and whitespace insensitive lookup key for canned queries.
fn normalize_query(text: &str) -> String {
    text.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn limit(mut rows: EngineRows, row_limit: Option<usize>) -> EngineRows {
    if let Some(max) = row_limit {
        rows.truncate(max);
    }
    rows
}

/// Sleep for `millis` unless cancelled first.
async fn simulate(millis: f64, cancel: &CancellationToken) -> Result<(), EngineError> {
    if millis <= 0.0 {
        return Ok(());
    }
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(millis / 1000.0)) => Ok(()),
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
    }
}

struct FixtureState {
    data: FixtureData,
    queries: HashMap<String, Vec<Row>>,
}

impl FixtureState {
    fn new(data: FixtureData) -> Self {
        let queries = data
            .queries
            .iter()
            .map(|(text, rows)| (normalize_query(text), rows.clone()))
            .collect();
        Self { data, queries }
    }
}

struct FixtureNative {
    state: Arc<FixtureState>,
    tracing: Arc<FixtureTracing>,
}

#[async_trait]
impl NativeQueryPath for FixtureNative {
    async fn execute(
        &self,
        statement: NativeStatement,
        cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError> {
        let data = &self.state.data;

        if DmvTranslator::is_dmv(&statement.text) {
            if data.block_dmv {
                return Err(EngineError::Blocked(
                    "DMV queries are disabled on this engine".to_string(),
                ));
            }
            let translation = DmvTranslator::new().translate(&statement.text).ok_or_else(|| {
                EngineError::Unsupported("Rowset is not available on this engine".to_string())
            })?;
            let rows = translation.apply(data.collection(translation.collection).to_vec());
            return Ok(limit(rows, statement.row_limit));
        }

        let rows = self
            .state
            .queries
            .get(&normalize_query(&statement.text))
            .cloned()
            .ok_or_else(|| EngineError::Fault(format!("Query failed: {}", statement.text)))?;

        simulate(data.timings.total_millis(), &cancel).await?;
        debug!(rows = rows.len(), "Fixture query served");
        Ok(limit(rows, statement.row_limit))
    }

    fn tracing(&self) -> Option<Arc<dyn EngineTracing>> {
        Some(self.tracing.clone())
    }
}

struct FixtureObjectModel {
    state: Arc<FixtureState>,
}

#[async_trait]
impl ObjectModelPath for FixtureObjectModel {
    async fn fetch(
        &self,
        request: ObjectModelRequest,
        _cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError> {
        let rows = self.state.data.collection(request.collection).to_vec();
        Ok(limit(rows, request.row_limit))
    }
}

/// Reports the fixture's configured timings as one SE, one FE and one
/// query-total event per session.
struct FixtureTracing {
    timings: FixtureTimings,
    next_session: AtomicU64,
}

#[async_trait]
impl EngineTracing for FixtureTracing {
    async fn start(&self) -> Result<TraceSessionId, EngineError> {
        Ok(TraceSessionId(self.next_session.fetch_add(1, Ordering::Relaxed)))
    }

    async fn stop(&self, _session: TraceSessionId) -> Result<Vec<EngineTraceEvent>, EngineError> {
        Ok(vec![
            EngineTraceEvent {
                name: "VertiPaqSEQueryEnd".to_string(),
                class: TraceEventClass::StorageEngine,
                duration_millis: self.timings.storage_engine_millis,
            },
            EngineTraceEvent {
                name: "FormulaEngineEnd".to_string(),
                class: TraceEventClass::FormulaEngine,
                duration_millis: self.timings.formula_engine_millis,
            },
            EngineTraceEvent {
                name: "QueryEnd".to_string(),
                class: TraceEventClass::QueryTotal,
                duration_millis: self.timings.total_millis(),
            },
        ])
    }
}

/// Engine connection over a [`FixtureData`] model.
pub struct FixtureEngine {
    alive: AtomicBool,
    native: Arc<FixtureNative>,
    object_model: Option<Arc<FixtureObjectModel>>,
}

impl FixtureEngine {
    pub fn new(data: FixtureData) -> Self {
        let timings = data.timings;
        let expose_object_model = data.object_model;
        let state = Arc::new(FixtureState::new(data));

        Self {
            alive: AtomicBool::new(true),
            native: Arc::new(FixtureNative {
                state: state.clone(),
                tracing: Arc::new(FixtureTracing {
                    timings,
                    next_session: AtomicU64::new(1),
                }),
            }),
            object_model: expose_object_model.then(|| Arc::new(FixtureObjectModel { state })),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }

    /// The bundled sample model.
    pub fn sample() -> Result<Self, FixtureError> {
        Ok(Self::new(serde_json::from_str(SAMPLE_FIXTURE)?))
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

impl EngineConnection for FixtureEngine {
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
