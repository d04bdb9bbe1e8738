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

//! Per-operation call statistics
//!
//! Latency percentiles are computed by nearest rank over a bounded window of
//! the most recent samples.

use crate::cache::CacheStats;
use crate::rate_limit::BucketSnapshot;
use dashmap::DashMap;
use olapgate_core::OperationKind;
use serde::Serialize;
use std::collections::VecDeque;

/// Latency samples kept per operation kind
pub const LATENCY_WINDOW: usize = 1024;

#[derive(Debug, Default)]
struct OperationStats {
    calls: u64,
    errors: u64,
    cache_hits: u64,
    latencies: VecDeque<f64>,
}

/// Snapshot of one operation kind's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub operation_kind: OperationKind,
    pub calls: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub p50_millis: Option<f64>,
    pub p95_millis: Option<f64>,
    pub p99_millis: Option<f64>,
}

/// Everything the diagnostics surface reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayDiagnostics {
    pub operations: Vec<OperationSnapshot>,
    pub cache: CacheStats,
    pub rate_limits: Vec<BucketSnapshot>,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    operations: DashMap<OperationKind, OperationStats>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call.
    pub fn record(&self, kind: OperationKind, elapsed_millis: f64, success: bool, cache_hit: bool) {
        let mut stats = self.operations.entry(kind).or_default();
        stats.calls += 1;
        if !success {
            stats.errors += 1;
        }
        if cache_hit {
            stats.cache_hits += 1;
        }
        if stats.latencies.len() == LATENCY_WINDOW {
            stats.latencies.pop_front();
        }
        stats.latencies.push_back(elapsed_millis);
    }

    /// Every kind seen so far, ordered by kind.
    pub fn snapshot(&self) -> Vec<OperationSnapshot> {
        let mut out: Vec<OperationSnapshot> = self
            .operations
            .iter()
            .map(|entry| {
                let stats = entry.value();
                let mut sorted: Vec<f64> = stats.latencies.iter().copied().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));
                OperationSnapshot {
                    operation_kind: *entry.key(),
                    calls: stats.calls,
                    errors: stats.errors,
                    cache_hits: stats.cache_hits,
                    p50_millis: percentile(&sorted, 50.0),
                    p95_millis: percentile(&sorted, 95.0),
                    p99_millis: percentile(&sorted, 99.0),
                }
            })
            .collect();
        out.sort_by_key(|s| s.operation_kind);
        out
    }
}

/// Nearest-rank percentile of an ascending slice.
pub fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}
