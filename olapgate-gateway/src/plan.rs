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

//! Execution planning
//!
//! Resolves a request's [`QueryMode`] into a closed [`ExecutionPlan`]. Each
//! plan variant owns its row-limit and run-count policy; `auto` consults a
//! pluggable [`ExpensivePatternClassifier`].

use crate::config::{ConfigError, ExecutionConfig};
use olapgate_core::{EngineRows, QueryMode, QueryRequest};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// Decides whether query text matches a known expensive pattern.
pub trait ExpensivePatternClassifier: Send + Sync {
    fn is_expensive(&self, text: &str) -> bool;
}

/// Never classifies anything as expensive, so `auto` always previews.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConservativeClassifier;

impl ExpensivePatternClassifier for ConservativeClassifier {
    fn is_expensive(&self, _text: &str) -> bool {
        false
    }
}

/// Case-insensitive regex classifier built from `execution.expensive_patterns`.
#[derive(Debug, Clone)]
pub struct RegexClassifier {
    patterns: Vec<Regex>,
}

impl RegexClassifier {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl ExpensivePatternClassifier for RegexClassifier {
    fn is_expensive(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Classifier for a config: regex when patterns are configured, conservative otherwise.
pub fn classifier_for(
    config: &ExecutionConfig,
) -> Result<Arc<dyn ExpensivePatternClassifier>, ConfigError> {
    if config.expensive_patterns.is_empty() {
        Ok(Arc::new(ConservativeClassifier))
    } else {
        Ok(Arc::new(RegexClassifier::new(&config.expensive_patterns)?))
    }
}

/// What an execution attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// Single run truncated to `max_rows`
    Preview { max_rows: usize },
    /// `runs` timed repetitions, optionally row-capped
    Analyze { runs: u32, max_rows: Option<usize> },
}

impl ExecutionPlan {
    pub fn run_count(&self) -> u32 {
        match self {
            ExecutionPlan::Preview { .. } => 1,
            ExecutionPlan::Analyze { runs, .. } => *runs,
        }
    }

    pub fn row_limit(&self) -> Option<usize> {
        match self {
            ExecutionPlan::Preview { max_rows } => Some(*max_rows),
            ExecutionPlan::Analyze { max_rows, .. } => *max_rows,
        }
    }

    /// Whether per-run statistics are reported.
    pub fn reports_runs(&self) -> bool {
        matches!(self, ExecutionPlan::Analyze { .. })
    }

    pub fn apply_row_limit(&self, mut rows: EngineRows) -> EngineRows {
        if let Some(limit) = self.row_limit() {
            rows.truncate(limit);
        }
        rows
    }
}

/// Turns requests into plans.
pub struct ModePlanner {
    default_analyze_runs: u32,
    max_analyze_runs: u32,
    default_preview_rows: usize,
    classifier: Arc<dyn ExpensivePatternClassifier>,
}

impl ModePlanner {
    pub fn new(config: &ExecutionConfig, classifier: Arc<dyn ExpensivePatternClassifier>) -> Self {
        Self {
            default_analyze_runs: config.default_analyze_runs,
            max_analyze_runs: config.max_analyze_runs,
            default_preview_rows: config.default_preview_rows,
            classifier,
        }
    }

    pub fn plan(&self, request: &QueryRequest) -> ExecutionPlan {
        match request.mode() {
            QueryMode::Preview => self.preview(request),
            QueryMode::Analyze => ExecutionPlan::Analyze {
                runs: request
                    .runs()
                    .unwrap_or(self.default_analyze_runs)
                    .clamp(1, self.max_analyze_runs),
                max_rows: request.max_rows(),
            },
            QueryMode::Auto => {
                if self.classifier.is_expensive(request.text()) {
                    ExecutionPlan::Analyze {
                        runs: 1,
                        max_rows: request.max_rows(),
                    }
                } else {
                    self.preview(request)
                }
            }
        }
    }

    fn preview(&self, request: &QueryRequest) -> ExecutionPlan {
        ExecutionPlan::Preview {
            max_rows: request.max_rows().unwrap_or(self.default_preview_rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olapgate_core::{OperationKind, QueryRequestBuilder, Row};

    fn planner(patterns: &[&str]) -> ModePlanner {
        let config = ExecutionConfig {
            expensive_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..ExecutionConfig::default()
        };
        let classifier = classifier_for(&config).unwrap();
        ModePlanner::new(&config, classifier)
    }

    fn request(mode: QueryMode, text: &str) -> QueryRequestBuilder {
        QueryRequest::builder(OperationKind::QueryExecution, text).mode(mode)
    }

    #[test]
    fn test_preview_defaults_rows() {
        let plan = planner(&[]).plan(&request(QueryMode::Preview, "EVALUATE Sales").build());
        assert_eq!(plan, ExecutionPlan::Preview { max_rows: 100 });
        assert_eq!(plan.run_count(), 1);
        assert!(!plan.reports_runs());
    }

    #[test]
    fn test_analyze_runs_default_and_cap() {
        let planner = planner(&[]);
        let default = planner.plan(&request(QueryMode::Analyze, "EVALUATE Sales").build());
        assert_eq!(default.run_count(), 3);
        assert_eq!(default.row_limit(), None);

        let capped = planner.plan(&request(QueryMode::Analyze, "EVALUATE Sales").runs(500).build());
        assert_eq!(capped.run_count(), 20);

        let floor = planner.plan(&request(QueryMode::Analyze, "EVALUATE Sales").runs(0).build());
        assert_eq!(floor.run_count(), 1);
    }

    #[test]
    fn test_auto_is_conservative_by_default() {
        let plan = planner(&[]).plan(&request(QueryMode::Auto, "EVALUATE CROSSJOIN(A, B)").build());
        assert_eq!(plan, ExecutionPlan::Preview { max_rows: 100 });
    }

    #[test]
    fn test_auto_with_expensive_pattern_analyzes_once() {
        let planner = planner(&[r"\bCROSSJOIN\s*\("]);
        let plan = planner.plan(&request(QueryMode::Auto, "evaluate crossjoin(A, B)").max_rows(5).build());
        assert_eq!(plan, ExecutionPlan::Analyze { runs: 1, max_rows: Some(5) });

        let cheap = planner.plan(&request(QueryMode::Auto, "EVALUATE Sales").build());
        assert!(matches!(cheap, ExecutionPlan::Preview { .. }));
    }

    #[test]
    fn test_apply_row_limit() {
        let rows: EngineRows = (0..10).map(|_| Row::new()).collect();
        assert_eq!(ExecutionPlan::Preview { max_rows: 3 }.apply_row_limit(rows.clone()).len(), 3);
        assert_eq!(
            ExecutionPlan::Analyze { runs: 2, max_rows: None }.apply_row_limit(rows).len(),
            10
        );
    }
}
