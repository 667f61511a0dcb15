//! BigQuery client against a local mock of the REST API.
//!
//! Covers job polling, result paging, bearer auth and error envelopes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use campaign_spend::{AccessToken, BigQueryClient, CredentialError, QueryError, Value, Warehouse};
use serde_json::json;

#[derive(Clone, Default)]
struct MockState {
    polls: Arc<AtomicUsize>,
    deny: bool,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer test-token")
        .unwrap_or(false)
}

async fn start_query(
    State(state): State<MockState>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.deny || !authorized(&headers) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "Access Denied: Project analise-dados-tse", "status": "PERMISSION_DENIED"}})),
        );
    }
    assert_eq!(project, "analise-dados-tse");
    assert_eq!(body["useLegacySql"], false);

    (
        StatusCode::OK,
        Json(json!({
            "kind": "bigquery#queryResponse",
            "jobReference": {"projectId": project, "jobId": "job_abc", "location": "US"},
            "jobComplete": false
        })),
    )
}

async fn query_results(
    State(state): State<MockState>,
    Path((_project, job_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    assert!(authorized(&headers));
    assert_eq!(job_id, "job_abc");
    assert_eq!(params.get("location").map(String::as_str), Some("US"));

    let schema = json!({"fields": [
        {"name": "sigla_partido", "type": "STRING"},
        {"name": "valor_despesa", "type": "FLOAT"}
    ]});

    match params.get("pageToken").map(String::as_str) {
        None if state.polls.fetch_add(1, Ordering::SeqCst) == 0 => (
            StatusCode::OK,
            Json(json!({"jobReference": {"jobId": "job_abc", "location": "US"}, "jobComplete": false})),
        ),
        None => (
            StatusCode::OK,
            Json(json!({
                "jobReference": {"jobId": "job_abc", "location": "US"},
                "jobComplete": true,
                "schema": schema,
                "rows": [{"f": [{"v": "PT"}, {"v": "100.5"}]}],
                "pageToken": "page-2",
                "totalRows": "2"
            })),
        ),
        Some("page-2") => (
            StatusCode::OK,
            Json(json!({
                "jobReference": {"jobId": "job_abc", "location": "US"},
                "jobComplete": true,
                "schema": schema,
                "rows": [{"f": [{"v": "MDB"}, {"v": null}]}],
                "totalRows": "2"
            })),
        ),
        Some(_) => (StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "bad page token"}}))),
    }
}

async fn spawn_mock(state: MockState) -> String {
    let app = Router::new()
        .route("/bigquery/v2/projects/:project/queries", post(start_query))
        .route("/bigquery/v2/projects/:project/queries/:job_id", get(query_results))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str) -> BigQueryClient {
    BigQueryClient::with_access_token("analise-dados-tse", AccessToken::new("test-token"))
        .with_api_base(base)
        .with_poll_interval(Duration::from_millis(5))
}

#[tokio::test]
async fn test_query_polls_and_pages() {
    let state = MockState::default();
    let base = spawn_mock(state.clone()).await;

    let table = client(&base).query("SELECT 1").await.unwrap();

    assert_eq!(table.columns(), &["sigla_partido".to_string(), "valor_despesa".to_string()]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "valor_despesa"), Some(&Value::Float(100.5)));
    assert_eq!(table.get(1, "sigla_partido"), Some(&Value::Text("MDB".to_string())));
    assert_eq!(table.get(1, "valor_despesa"), Some(&Value::Null));
    assert_eq!(state.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permission_denied_is_api_error() {
    let base = spawn_mock(MockState {
        deny: true,
        ..MockState::default()
    })
    .await;

    let err = client(&base).query("SELECT 1").await.unwrap_err();
    match err {
        QueryError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Access Denied: Project analise-dados-tse");
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_request() {
    let state = MockState::default();
    let base = spawn_mock(state.clone()).await;

    let warehouse = BigQueryClient::new("analise-dados-tse", "/nonexistent/gcp_credentials.json")
        .with_api_base(base);
    let err = warehouse.query("SELECT 1").await.unwrap_err();

    assert!(matches!(err, QueryError::Credential(CredentialError::NotFound(_))));
    assert_eq!(state.polls.load(Ordering::SeqCst), 0);
}
