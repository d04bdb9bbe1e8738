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

//! Per-operation admission control
//!
//! One bucket per [`OperationKind`], each with its own ceiling. Buckets live
//! in a sharded map so admission for one kind never waits on another.
//! Rejected calls are not counted, so a caller that keeps retrying is not
//! pushed further back.

use crate::config::{OperationLimits, RateLimitConfig, WindowStrategy};
use dashmap::DashMap;
use olapgate_core::{Clock, OperationKind};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request is admitted
    Admitted {
        /// Admissions left in the current window
        remaining: u32,
    },
    /// Request is rejected
    Rejected {
        /// Time until a slot frees up
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Window state of one operation kind.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub operation_kind: OperationKind,
    pub window_start: Instant,
    pub window_length: Duration,
    pub count: u32,
    pub limit: u32,
    /// Admission instants, only kept by the sliding strategy
    admissions: VecDeque<Instant>,
}

impl RateLimitBucket {
    fn new(operation_kind: OperationKind, limit: u32, window_length: Duration, now: Instant) -> Self {
        Self {
            operation_kind,
            window_start: now,
            window_length,
            count: 0,
            limit,
            admissions: VecDeque::new(),
        }
    }

    fn admit_fixed(&mut self, now: Instant) -> Admission {
        if now.duration_since(self.window_start) >= self.window_length {
            self.window_start = now;
            self.count = 0;
        }
        if self.count < self.limit {
            self.count += 1;
            Admission::Admitted {
                remaining: self.limit - self.count,
            }
        } else {
            Admission::Rejected {
                retry_after: self.fixed_remaining(now),
            }
        }
    }

    fn admit_sliding(&mut self, now: Instant) -> Admission {
        self.prune(now);
        if (self.admissions.len() as u32) < self.limit {
            self.admissions.push_back(now);
            self.count = self.admissions.len() as u32;
            self.window_start = self.admissions.front().copied().unwrap_or(now);
            Admission::Admitted {
                remaining: self.limit - self.count,
            }
        } else {
            Admission::Rejected {
                retry_after: self.sliding_remaining(now),
            }
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.admissions.front() {
            if now.duration_since(*oldest) >= self.window_length {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
        self.count = self.admissions.len() as u32;
        if let Some(oldest) = self.admissions.front() {
            self.window_start = *oldest;
        }
    }

    fn fixed_remaining(&self, now: Instant) -> Duration {
        (self.window_start + self.window_length).saturating_duration_since(now)
    }

    fn sliding_remaining(&self, now: Instant) -> Duration {
        match self.admissions.front() {
            Some(oldest) => (*oldest + self.window_length).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

/// Read-only view of a bucket for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSnapshot {
    pub operation_kind: OperationKind,
    pub count: u32,
    pub limit: u32,
    pub window_remaining_secs: f64,
}

/// Rate limiter keyed by operation kind
pub struct RateLimiter {
    buckets: DashMap<OperationKind, RateLimitBucket>,
    limits: OperationLimits,
    window: Duration,
    strategy: WindowStrategy,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            limits: config.per_minute.clone(),
            window: config.window(),
            strategy: config.strategy,
            clock,
        }
    }

    /// Admit or reject one call of `kind`.
    pub fn admit(&self, kind: OperationKind) -> bool {
        self.check(kind).is_admitted()
    }

    /// Like [`admit`](Self::admit) but reports remaining slots or retry delay.
    pub fn check(&self, kind: OperationKind) -> Admission {
        let now = self.clock.now();
        // The entry guard holds the shard lock for the whole update
        let mut bucket = self
            .buckets
            .entry(kind)
            .or_insert_with(|| RateLimitBucket::new(kind, self.limits.get(kind), self.window, now));

        let admission = match self.strategy {
            WindowStrategy::Fixed => bucket.admit_fixed(now),
            WindowStrategy::Sliding => bucket.admit_sliding(now),
        };

        if let Admission::Rejected { retry_after } = admission {
            tracing::debug!(
                operation = %kind,
                limit = bucket.limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "Admission rejected"
            );
        }
        admission
    }

    /// Snapshot of every bucket created so far, ordered by kind.
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let now = self.clock.now();
        let mut snapshots: Vec<BucketSnapshot> = self
            .buckets
            .iter()
            .map(|entry| {
                let bucket = entry.value();
                let (count, remaining) = match self.strategy {
                    WindowStrategy::Fixed => {
                        if now.duration_since(bucket.window_start) >= bucket.window_length {
                            (0, Duration::ZERO)
                        } else {
                            (bucket.count, bucket.fixed_remaining(now))
                        }
                    }
                    WindowStrategy::Sliding => {
                        let live = bucket
                            .admissions
                            .iter()
                            .filter(|at| now.duration_since(**at) < bucket.window_length)
                            .count() as u32;
                        let oldest = bucket
                            .admissions
                            .iter()
                            .find(|at| now.duration_since(**at) < bucket.window_length);
                        let remaining = oldest
                            .map(|at| (*at + bucket.window_length).saturating_duration_since(now))
                            .unwrap_or(Duration::ZERO);
                        (live, remaining)
                    }
                };
                BucketSnapshot {
                    operation_kind: bucket.operation_kind,
                    count,
                    limit: bucket.limit,
                    window_remaining_secs: remaining.as_secs_f64(),
                }
            })
            .collect();
        snapshots.sort_by_key(|s| s.operation_kind);
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olapgate_core::ManualClock;

    fn limiter(strategy: WindowStrategy, limit: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let mut config = RateLimitConfig {
            strategy,
            ..RateLimitConfig::default()
        };
        config.per_minute.query_execution = limit;
        (RateLimiter::new(&config, clock.clone()), clock)
    }

    #[test]
    fn test_limit_plus_one_rejected() {
        for strategy in [WindowStrategy::Sliding, WindowStrategy::Fixed] {
            let (limiter, _clock) = limiter(strategy, 30);
            for i in 0..30 {
                assert!(limiter.admit(OperationKind::QueryExecution), "call {}", i);
            }
            assert!(!limiter.admit(OperationKind::QueryExecution));
        }
    }

    #[test]
    fn test_kinds_are_independent() {
        let (limiter, _clock) = limiter(WindowStrategy::Sliding, 1);
        assert!(limiter.admit(OperationKind::QueryExecution));
        assert!(!limiter.admit(OperationKind::QueryExecution));
        assert!(limiter.admit(OperationKind::MetadataFetch));
    }

    #[test]
    fn test_rejections_do_not_compound() {
        let (limiter, clock) = limiter(WindowStrategy::Fixed, 2);
        assert!(limiter.admit(OperationKind::QueryExecution));
        assert!(limiter.admit(OperationKind::QueryExecution));
        for _ in 0..50 {
            assert!(!limiter.admit(OperationKind::QueryExecution));
        }
        let snapshot = limiter.snapshot();
        assert_eq!(snapshot[0].count, 2);

        clock.advance(Duration::from_secs(60));
        assert!(limiter.admit(OperationKind::QueryExecution));
    }

    #[test]
    fn test_fixed_window_rollover() {
        let (limiter, clock) = limiter(WindowStrategy::Fixed, 1);
        assert!(limiter.admit(OperationKind::QueryExecution));
        clock.advance(Duration::from_secs(59));
        match limiter.check(OperationKind::QueryExecution) {
            Admission::Rejected { retry_after } => assert_eq!(retry_after, Duration::from_secs(1)),
            other => panic!("expected rejection, got {:?}", other),
        }
        clock.advance(Duration::from_secs(1));
        assert!(limiter.admit(OperationKind::QueryExecution));
    }

    #[test]
    fn test_sliding_window_has_no_boundary_burst() {
        let (limiter, clock) = limiter(WindowStrategy::Sliding, 2);
        clock.advance(Duration::from_secs(50));
        assert!(limiter.admit(OperationKind::QueryExecution));
        assert!(limiter.admit(OperationKind::QueryExecution));

        // A fixed window would reset here; the sliding log still sees both
        clock.advance(Duration::from_secs(15));
        assert!(!limiter.admit(OperationKind::QueryExecution));

        clock.advance(Duration::from_secs(45));
        assert!(limiter.admit(OperationKind::QueryExecution));
    }

    #[test]
    fn test_snapshot_reports_window() {
        let (limiter, clock) = limiter(WindowStrategy::Sliding, 5);
        limiter.admit(OperationKind::QueryExecution);
        clock.advance(Duration::from_secs(20));
        limiter.admit(OperationKind::QueryExecution);

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].count, 2);
        assert_eq!(snapshot[0].limit, 5);
        assert!((snapshot[0].window_remaining_secs - 40.0).abs() < 1e-6);
    }
}
