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

use crate::config::GatewayConfig;
use olapgate_core::{Clock, EngineConnection, SystemClock};
use std::sync::Arc;

/// Everything a gateway is built from. Gateways built from separate
/// contexts share no state.
#[derive(Clone)]
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub clock: Arc<dyn Clock>,
    pub connection: Arc<dyn EngineConnection>,
}

impl GatewayContext {
    /// Context on the system clock.
    pub fn new(config: GatewayConfig, connection: Arc<dyn EngineConnection>) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            connection,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
