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

//! Engine capability traits
//!
//! The gateway never opens or closes the engine connection. It consumes an
//! already-established [`EngineConnection`] and talks to it through two
//! interfaces:
//!
//! ```text
//!              ┌──────────────────────┐
//!              │   EngineConnection   │  is_alive()
//!              └──────────┬───────────┘
//!           ┌─────────────┴──────────────┐
//!           ▼                            ▼
//!  ┌─────────────────┐         ┌───────────────────┐
//!  │ NativeQueryPath │ (fast)  │  ObjectModelPath  │ (fallback)
//!  └────────┬────────┘         └─────────┬─────────┘
//!           └──── optional EngineTracing ┘
//! ```

use crate::error::EngineError;
use crate::result::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Rows returned by either interface.
pub type EngineRows = Vec<Row>;

/// Which interface served (or failed) an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    Native,
    ObjectModel,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Native => f.write_str("native"),
            ExecutionPath::ObjectModel => f.write_str("object_model"),
        }
    }
}

/// Statement submitted to the native query interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeStatement {
    pub text: String,
    /// Row cap the engine may apply server-side
    pub row_limit: Option<usize>,
}

/// Model object collections reachable through the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCollection {
    Tables,
    Columns,
    Measures,
    Relationships,
    Partitions,
    Hierarchies,
    Roles,
}

/// Request for the object-model interface.
///
/// Implementations return the whole collection; the executor applies
/// filters, projection and truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectModelRequest {
    pub collection: ModelCollection,
    pub row_limit: Option<usize>,
}

/// Handle of a running engine-side trace session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceSessionId(pub u64);

/// Engine subsystem an event is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventClass {
    /// Scans and aggregations over stored data
    StorageEngine,
    /// Expression evaluation
    FormulaEngine,
    /// End-to-end engine duration of the query
    QueryTotal,
    Other,
}

/// Raw event captured by an engine trace session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTraceEvent {
    pub name: String,
    pub class: TraceEventClass,
    pub duration_millis: f64,
}

/// Engine-side trace capability.
#[async_trait]
pub trait EngineTracing: Send + Sync {
    async fn start(&self) -> Result<TraceSessionId, EngineError>;
    async fn stop(&self, session: TraceSessionId) -> Result<Vec<EngineTraceEvent>, EngineError>;
}

/// Fast metadata/query interface.
#[async_trait]
pub trait NativeQueryPath: Send + Sync {
    async fn execute(
        &self,
        statement: NativeStatement,
        cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError>;

    fn tracing(&self) -> Option<Arc<dyn EngineTracing>> {
        None
    }
}

/// Richer, slower object-model interface.
#[async_trait]
pub trait ObjectModelPath: Send + Sync {
    async fn fetch(
        &self,
        request: ObjectModelRequest,
        cancel: CancellationToken,
    ) -> Result<EngineRows, EngineError>;

    fn tracing(&self) -> Option<Arc<dyn EngineTracing>> {
        None
    }
}

/// A pre-established engine connection.
pub trait EngineConnection: Send + Sync {
    /// Liveness as reported by the external connection manager.
    fn is_alive(&self) -> bool;

    fn native(&self) -> Arc<dyn NativeQueryPath>;

    /// `None` when the engine exposes no object model.
    fn object_model(&self) -> Option<Arc<dyn ObjectModelPath>>;
}
