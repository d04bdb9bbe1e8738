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

//! Execution trace model
//!
//! Engine time and client time come from different clocks, so the sum of
//! `engine_millis` and `client_millis` is only guaranteed to be within
//! [`TRACE_TOLERANCE_MILLIS`] of `total_millis`.

use serde::{Deserialize, Serialize};

/// Maximum allowed drift between `engine + client` and `total`.
pub const TRACE_TOLERANCE_MILLIS: f64 = 0.5;

/// A single named, timed trace event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub duration_millis: f64,
}

/// Distribution of repeated analyze runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub count: u32,
    pub fastest_millis: f64,
    pub median_millis: f64,
    pub slowest_millis: f64,
    pub samples_millis: Vec<f64>,
}

impl RunStats {
    /// Summarise a list of run durations. Returns `None` when empty.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        Some(Self {
            count: samples.len() as u32,
            fastest_millis: sorted[0],
            median_millis: median,
            slowest_millis: sorted[sorted.len() - 1],
            samples_millis: samples.to_vec(),
        })
    }
}

/// Timing breakdown of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Client-observed wall time
    pub total_millis: f64,
    /// Engine-internal time; `None` when the engine could not be traced
    pub engine_millis: Option<f64>,
    /// Transport, serialization and client overhead
    pub client_millis: f64,
    /// Storage-engine share of `engine_millis`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_engine_millis: Option<f64>,
    /// Formula-engine share of `engine_millis`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula_engine_millis: Option<f64>,
    pub events: Vec<TraceEvent>,
    /// True when only wall-clock time is available
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs: Option<RunStats>,
}

impl ExecutionTrace {
    /// A wall-clock-only trace.
    pub fn wall_clock(total_millis: f64) -> Self {
        Self {
            total_millis,
            engine_millis: None,
            client_millis: total_millis,
            storage_engine_millis: None,
            formula_engine_millis: None,
            events: Vec::new(),
            partial: true,
            runs: None,
        }
    }

    /// Whether engine + client time agrees with the total within tolerance.
    ///
    /// Partial traces trivially agree.
    pub fn is_consistent(&self) -> bool {
        match self.engine_millis {
            Some(engine) => {
                (engine + self.client_millis - self.total_millis).abs() <= TRACE_TOLERANCE_MILLIS
            }
            None => true,
        }
    }
}
