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

//! Per-operation timeouts
//!
//! One deadline per [`OperationKind`], read from `[gateway.timeouts]`. The
//! executor bounds each path attempt with the deadline of the request's kind.

use crate::config::TimeoutConfig;
use olapgate_core::OperationKind;
use std::collections::BTreeMap;
use std::time::Duration;

/// Maximum wait per operation kind. Every kind has exactly one entry.
#[derive(Debug, Clone)]
pub struct ToolTimeoutRegistry {
    timeouts: BTreeMap<OperationKind, Duration>,
}

impl ToolTimeoutRegistry {
    pub fn new(config: &TimeoutConfig) -> Self {
        let timeouts = OperationKind::ALL
            .iter()
            .map(|kind| (*kind, config.get(*kind)))
            .collect();
        Self { timeouts }
    }

    pub fn get(&self, kind: OperationKind) -> Duration {
        self.timeouts
            .get(&kind)
            .copied()
            .unwrap_or_else(|| TimeoutConfig::default().get(kind))
    }

    pub fn entries(&self) -> impl Iterator<Item = (OperationKind, Duration)> + '_ {
        self.timeouts.iter().map(|(kind, timeout)| (*kind, *timeout))
    }
}
