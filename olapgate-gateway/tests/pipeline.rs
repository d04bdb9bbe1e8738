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

// Gateway pipeline: stage order, short-circuiting, caching and diagnostics

mod common;

use async_trait::async_trait;
use common::{gateway, gateway_with, sales_rows, FixedTracing, MockEngine, MockNative, MockObjectModel};
use olapgate_core::{
    EngineError, ErrorKind, ExecutionPath, ExecutionTrace, GatewayError, OperationKind,
    QueryMode, QueryRequest, TextKind,
};
use olapgate_gateway::{
    ExecutionOutcome, GatewayConfig, GatewayContext, PolicyGateway, QueryRunner,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn preview(text: &str) -> QueryRequest {
    QueryRequest::builder(OperationKind::QueryExecution, text)
        .mode(QueryMode::Preview)
        .build()
}

#[tokio::test]
async fn scenario_a_path_traversal_is_rejected() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let request = QueryRequest::builder(OperationKind::MetadataFetch, "../../etc/passwd")
        .text_kind(TextKind::Path)
        .build();
    let result = gateway.execute(&request).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationFailed);
    assert!(error.message.contains("traversal"));
    assert_eq!(engine.native.calls(), 0);
    // Validation runs before admission, so no slot was consumed
    assert!(gateway.diagnostics().rate_limits.is_empty());
}

#[tokio::test]
async fn scenario_b_thirty_first_call_is_rate_limited() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine);

    for i in 0..30 {
        let result = gateway.execute(&preview("EVALUATE Sales")).await;
        assert!(result.success, "call {} should be admitted", i + 1);
    }

    let result = gateway.execute(&preview("EVALUATE Sales")).await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::RateLimited);
    assert!(error.suggestions[0].starts_with("Retry after"));

    // Other kinds keep their own ceilings
    let metadata = QueryRequest::new(OperationKind::MetadataFetch, "EVALUATE INFO.TABLES()");
    assert!(gateway.execute(&metadata).await.success);
}

#[tokio::test]
async fn scenario_c_second_identical_preview_is_cached() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let first = gateway.execute(&preview("EVALUATE Sales")).await;
    assert!(first.success);
    assert!(!first.cached);
    assert!(first.trace.is_some());

    // Whitespace differences normalize to the same key
    let second = gateway.execute(&preview("EVALUATE   Sales")).await;
    assert!(second.success);
    assert!(second.cached);
    assert!(second.trace.is_none());
    assert_eq!(second.rows, first.rows);
    assert_eq!(engine.native.calls(), 1);

    let stats = gateway.diagnostics().cache;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn scenario_d_blocked_dmv_falls_back_once() {
    let engine = MockEngine::new(
        MockNative::failing(EngineError::Blocked("DMV access disabled".into())),
        Some(MockObjectModel::returning(vec![
            common::row(serde_json::json!({"Name": "Sales", "ID": 1})),
            common::row(serde_json::json!({"Name": "Dates", "ID": 2})),
        ])),
    );
    let (gateway, _) = gateway(engine.clone());

    let request = QueryRequest::new(
        OperationKind::MetadataFetch,
        "SELECT [Name] FROM $SYSTEM.TMSCHEMA_TABLES",
    );
    let result = gateway.execute(&request).await;

    assert!(result.success);
    assert_eq!(result.row_count, Some(2));
    assert_eq!(
        result.rows.as_ref().unwrap()[0],
        common::row(serde_json::json!({"Name": "Sales"}))
    );
    let trace = result.trace.unwrap();
    assert!(trace.engine_millis.is_none());
    assert!(trace.partial);
    assert_eq!(engine.native.calls(), 1);
    assert_eq!(engine.object_model_calls(), 1);
}

#[tokio::test]
async fn scenario_e_dead_connection_counts_slot_but_skips_cache_and_engine() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());
    engine.set_alive(false);

    let result = gateway.execute(&preview("EVALUATE Sales")).await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ErrorKind::NotConnected);
    assert_eq!(engine.native.calls(), 0);

    let diagnostics = gateway.diagnostics();
    assert_eq!(diagnostics.cache.hits + diagnostics.cache.misses, 0);
    assert_eq!(diagnostics.rate_limits.len(), 1);
    assert_eq!(diagnostics.rate_limits[0].operation_kind, OperationKind::QueryExecution);
    assert_eq!(diagnostics.rate_limits[0].count, 1);
}

#[tokio::test]
async fn failures_are_never_cached() {
    let engine = MockEngine::new(MockNative::failing(EngineError::Fault("boom".into())), None);
    let (gateway, _) = gateway(engine.clone());

    let failed = gateway.execute(&preview("EVALUATE Sales")).await;
    assert!(!failed.success);
    assert_eq!(failed.error.unwrap().kind, ErrorKind::InternalError);
    assert_eq!(gateway.diagnostics().cache.entries, 0);

    *engine.native.response.lock() = Ok(sales_rows(2));
    let recovered = gateway.execute(&preview("EVALUATE Sales")).await;
    assert!(recovered.success);
    assert!(!recovered.cached);
    assert_eq!(engine.native.calls(), 2);
}

#[tokio::test]
async fn bypass_skips_lookup_and_store() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let request = QueryRequest::builder(OperationKind::QueryExecution, "EVALUATE Sales")
        .bypass_cache(true)
        .build();
    assert!(!gateway.execute(&request).await.cached);
    assert!(!gateway.execute(&request).await.cached);

    assert_eq!(engine.native.calls(), 2);
    let stats = gateway.diagnostics().cache;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.hits + stats.misses, 0);
}

#[tokio::test]
async fn expired_entries_are_not_served() {
    let engine = MockEngine::healthy();
    let (gateway, clock) = gateway(engine.clone());

    gateway.execute(&preview("EVALUATE Sales")).await;
    clock.advance(Duration::from_secs(299));
    assert!(gateway.execute(&preview("EVALUATE Sales")).await.cached);

    clock.advance(Duration::from_secs(1));
    assert!(!gateway.execute(&preview("EVALUATE Sales")).await.cached);
    assert_eq!(engine.native.calls(), 2);
}

#[tokio::test]
async fn obfuscated_denylisted_text_is_rejected() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let request = QueryRequest::new(
        OperationKind::QueryExecution,
        "EVALUATE Sales; EXEC master..xp_/* hidden */cmdshell 'dir'",
    );
    let result = gateway.execute(&request).await;
    assert_eq!(result.error.unwrap().kind, ErrorKind::ValidationFailed);
    assert_eq!(engine.native.calls(), 0);
}

#[tokio::test]
async fn sanitized_text_reaches_the_engine() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let result = gateway
        .execute(&preview("\u{feff}EVALUATE Sales  \n"))
        .await;
    assert!(result.success);
    let statements = engine.native.statements.lock();
    assert_eq!(statements[0].text, "EVALUATE Sales");
    assert_eq!(statements[0].row_limit, Some(100));
}

#[tokio::test]
async fn preview_truncates_to_max_rows() {
    let engine = MockEngine::new(MockNative::returning(sales_rows(10)), None);
    let (gateway, _) = gateway(engine);

    let request = QueryRequest::builder(OperationKind::QueryExecution, "EVALUATE Sales")
        .mode(QueryMode::Preview)
        .max_rows(4)
        .build();
    let result = gateway.execute(&request).await;
    assert_eq!(result.row_count, Some(4));
}

#[tokio::test]
async fn analyze_runs_repeatedly_and_reports_distribution() {
    let engine = MockEngine::new(MockNative::returning(sales_rows(10)), None);
    let (gateway, _) = gateway(engine.clone());

    let request = QueryRequest::builder(OperationKind::QueryExecution, "EVALUATE Sales")
        .mode(QueryMode::Analyze)
        .runs(4)
        .build();
    let result = gateway.execute(&request).await;

    assert!(result.success);
    assert_eq!(result.row_count, Some(10));
    assert_eq!(engine.native.calls(), 4);
    let runs = result.trace.unwrap().runs.unwrap();
    assert_eq!(runs.count, 4);
    assert_eq!(runs.samples_millis.len(), 4);
    assert!(runs.fastest_millis <= runs.median_millis);
    assert!(runs.median_millis <= runs.slowest_millis);
}

#[tokio::test(start_paused = true)]
async fn engine_trace_is_decomposed_within_tolerance() {
    let native = MockNative::returning(sales_rows(1));
    *native.delay.lock() = Some(Duration::from_millis(12));
    *native.tracing.lock() = Some(Arc::new(FixedTracing::se_fe(3.0, 8.0)));
    let engine = MockEngine::new(native, None);
    let (gateway, _) = gateway(engine);

    let result = gateway.execute(&preview("EVALUATE Sales")).await;
    let trace: ExecutionTrace = result.trace.unwrap();

    assert!(!trace.partial);
    assert_eq!(trace.engine_millis, Some(8.0));
    assert_eq!(trace.storage_engine_millis, Some(3.0));
    assert_eq!(trace.formula_engine_millis, Some(5.0));
    assert!(trace.total_millis >= 12.0);
    assert!(trace.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn executions_are_serialized_on_the_engine() {
    let native = MockNative::returning(sales_rows(1));
    *native.delay.lock() = Some(Duration::from_millis(50));
    let engine = MockEngine::new(native, None);
    let (gateway, _) = gateway(engine.clone());
    let gateway = Arc::new(gateway);

    let mut handles = Vec::new();
    for i in 0..5 {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            let request = QueryRequest::builder(OperationKind::QueryExecution, format!("EVALUATE T{}", i))
                .bypass_cache(true)
                .build();
            gateway.execute(&request).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(engine.native.calls(), 5);
    assert_eq!(engine.native.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn check_connection_is_governed() {
    let engine = MockEngine::healthy();
    let config = GatewayConfig {
        rate_limits: olapgate_gateway::config::RateLimitConfig {
            per_minute: olapgate_gateway::config::OperationLimits {
                connection_attempt: 2,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };
    let (gateway, _) = gateway_with(config, engine.clone());

    let alive = gateway.check_connection().await;
    assert!(alive.success);
    assert_eq!(alive.rows.unwrap()[0]["alive"], serde_json::json!(true));

    engine.set_alive(false);
    let dead = gateway.check_connection().await;
    assert_eq!(dead.error.unwrap().kind, ErrorKind::NotConnected);

    let limited = gateway.check_connection().await;
    assert_eq!(limited.error.unwrap().kind, ErrorKind::RateLimited);
}

#[tokio::test]
async fn diagnostics_track_calls_errors_and_hits() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine);

    gateway.execute(&preview("EVALUATE Sales")).await;
    gateway.execute(&preview("EVALUATE Sales")).await;
    gateway
        .execute(&QueryRequest::new(OperationKind::QueryExecution, "DROP TABLE Sales"))
        .await;

    let diagnostics = gateway.diagnostics();
    let query = &diagnostics.operations[0];
    assert_eq!(query.operation_kind, OperationKind::QueryExecution);
    assert_eq!(query.calls, 3);
    assert_eq!(query.errors, 1);
    assert_eq!(query.cache_hits, 1);
    assert!(query.p50_millis.is_some());
}

#[tokio::test]
async fn invalidate_cache_by_kind() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    gateway.execute(&preview("EVALUATE Sales")).await;
    gateway
        .execute(&QueryRequest::new(OperationKind::MetadataFetch, "EVALUATE INFO.TABLES()"))
        .await;
    assert_eq!(gateway.diagnostics().cache.entries, 2);

    assert_eq!(gateway.invalidate_cache(Some(OperationKind::QueryExecution)), 1);
    assert_eq!(gateway.diagnostics().cache.entries, 1);
    assert!(!gateway.execute(&preview("EVALUATE Sales")).await.cached);

    assert_eq!(gateway.invalidate_cache(None), 2);
    assert_eq!(gateway.diagnostics().cache.entries, 0);
}

struct StaticRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl QueryRunner for StaticRunner {
    async fn run(&self, _request: &QueryRequest) -> Result<ExecutionOutcome, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionOutcome {
            rows: sales_rows(1),
            trace: ExecutionTrace::wall_clock(1.0),
            path: ExecutionPath::Native,
        })
    }
}

#[tokio::test]
async fn runner_can_be_substituted() {
    let engine = MockEngine::healthy();
    let runner = Arc::new(StaticRunner {
        calls: AtomicUsize::new(0),
    });
    let gateway = PolicyGateway::builder(GatewayContext::new(GatewayConfig::default(), engine.clone()))
        .with_runner(runner.clone())
        .build()
        .unwrap();

    let result = gateway.execute(&preview("EVALUATE Sales")).await;
    assert!(result.success);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.native.calls(), 0);
}

#[tokio::test]
async fn independent_gateways_share_no_state() {
    let engine = MockEngine::healthy();
    let (first, _) = gateway(engine.clone());
    let (second, _) = gateway(engine.clone());

    first.execute(&preview("EVALUATE Sales")).await;
    let result = second.execute(&preview("EVALUATE Sales")).await;
    assert!(!result.cached);
    assert_eq!(engine.native.calls(), 2);
}

#[tokio::test]
async fn check_input_validates_without_executing() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let ok = QueryRequest::builder(OperationKind::MetadataFetch, "  Sales ")
        .text_kind(TextKind::Identifier)
        .build();
    assert_eq!(gateway.check_input(&ok).unwrap(), "Sales");

    let bad = QueryRequest::builder(OperationKind::MetadataFetch, "Sales]; DROP")
        .text_kind(TextKind::Identifier)
        .build();
    let rejected = gateway.check_input(&bad).unwrap_err();
    assert_eq!(rejected.error.unwrap().kind, ErrorKind::ValidationFailed);
    assert_eq!(engine.native.calls(), 0);
}

#[tokio::test]
async fn out_of_pipeline_failures_are_redacted() {
    let (gateway, _) = gateway(MockEngine::healthy());
    let result = gateway.failure(
        &GatewayError::Internal("write to /srv/exports/q1.jsonl failed".to_string()),
        OperationKind::Export,
    );
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::InternalError);
    assert!(!error.message.contains("/srv/exports"));
    assert!(error.correlation_id.is_some());
}

#[tokio::test]
async fn queries_differing_only_inside_a_literal_are_not_shared() {
    let engine = MockEngine::healthy();
    let (gateway, _) = gateway(engine.clone());

    let first = gateway
        .execute(&preview("EVALUATE FILTER(Sales, Sales[Code] = \"A  B\")"))
        .await;
    assert!(first.success);
    assert_eq!(first.row_count, Some(3));

    *engine.native.response.lock() = Ok(sales_rows(1));
    let second = gateway
        .execute(&preview("EVALUATE FILTER(Sales, Sales[Code] = \"A B\")"))
        .await;

    assert!(second.success);
    assert!(!second.cached);
    assert_eq!(second.row_count, Some(1));
    assert_eq!(engine.native.calls(), 2);
}

/// Tracing whose stop call never returns
struct StuckStopTracing;

#[async_trait]
impl olapgate_core::EngineTracing for StuckStopTracing {
    async fn start(&self) -> Result<olapgate_core::TraceSessionId, EngineError> {
        Ok(olapgate_core::TraceSessionId(3))
    }

    async fn stop(
        &self,
        _session: olapgate_core::TraceSessionId,
    ) -> Result<Vec<olapgate_core::EngineTraceEvent>, EngineError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_trace_session_does_not_fail_an_answered_query() {
    let native = MockNative::returning(sales_rows(3));
    *native.tracing.lock() = Some(Arc::new(StuckStopTracing));
    let engine = MockEngine::new(native, Some(MockObjectModel::returning(Vec::new())));
    let (gateway, _) = gateway(engine.clone());

    let started = tokio::time::Instant::now();
    let result = gateway.execute(&preview("EVALUATE Sales")).await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(result.row_count, Some(3));
    let trace = result.trace.unwrap();
    assert!(trace.partial);
    assert!(trace.engine_millis.is_none());
    assert_eq!(engine.native.calls(), 1);
    assert_eq!(engine.object_model_calls(), 0);
    assert!(started.elapsed() < Duration::from_secs(60));
}
