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

//! Olapgate Core
//!
//! Shared data model for the query gateway: requests, results, traces, the
//! structured error shape returned to callers, and the capability traits an
//! engine connection must provide.

pub mod clock;
pub mod engine;
pub mod error;
pub mod request;
pub mod result;
pub mod trace;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EngineConnection, EngineRows, EngineTraceEvent, EngineTracing, ExecutionPath,
    ModelCollection, NativeQueryPath, NativeStatement, ObjectModelPath, ObjectModelRequest,
    TraceEventClass, TraceSessionId,
};
pub use error::{EngineError, ErrorKind, GatewayError, StructuredError};
pub use request::{OperationKind, QueryMode, QueryRequest, QueryRequestBuilder, TextKind};
pub use result::{ExecutionResult, Row, ValidationResult};
pub use trace::{ExecutionTrace, RunStats, TraceEvent, TRACE_TOLERANCE_MILLIS};
