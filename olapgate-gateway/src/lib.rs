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

//! Olapgate policy layer
//!
//! Validation, rate limiting, caching, dual-path execution and performance
//! tracing in front of a single analytical engine connection. The entry point
//! is [`PolicyGateway`].

pub mod cache;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error_handler;
pub mod executor;
pub mod gateway;
pub mod plan;
pub mod rate_limit;
pub mod registry;
pub mod timeouts;
pub mod tracer;
pub mod translate;
pub mod validation;

pub use cache::{cache_key, CacheStats, QueryCache};
pub use config::{ConfigError, GatewayConfig, WindowStrategy};
pub use context::GatewayContext;
pub use diagnostics::{Diagnostics, GatewayDiagnostics, OperationSnapshot};
pub use error_handler::{redact, ErrorHandler};
pub use executor::{ExecutionOutcome, ExecutorPolicy, QueryExecutor, QueryRunner};
pub use gateway::{GatewayBuildError, PolicyGateway, PolicyGatewayBuilder};
pub use plan::{ConservativeClassifier, ExecutionPlan, ExpensivePatternClassifier, ModePlanner, RegexClassifier};
pub use rate_limit::{Admission, BucketSnapshot, RateLimiter};
pub use registry::{ComponentRegistry, Components, RegistryError};
pub use timeouts::ToolTimeoutRegistry;
pub use tracer::PerformanceTracer;
pub use translate::DmvTranslator;
pub use validation::InputValidator;
