// Campaign Spend - HTTP API
// JSON endpoints over the cached datasets + the static dashboard

use crate::aggregation::{group_mean_top_n, group_sum_all, group_sum_top_n};
use crate::datasets::{Datasets, Readiness};
use crate::error::TableError;
use crate::records::columns;
use crate::table::Table;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub const UNAVAILABLE: &str = "Dados não disponíveis";
pub const CROSSED_UNAVAILABLE: &str = "Dados cruzados não disponíveis";

pub const TOP_CITIES: usize = 15;
pub const TOP_PARTIES: usize = 10;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub datasets: Arc<Datasets>,
    pub static_root: PathBuf,
}

impl AppState {
    pub fn new(datasets: Arc<Datasets>, static_root: impl Into<PathBuf>) -> Self {
        Self {
            datasets,
            static_root: static_root.into(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// The dataset behind the endpoint never loaded.
    Unavailable(&'static str),
    Aggregation(TableError),
}

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        ApiError::Aggregation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::Unavailable(message) => message.to_string(),
            ApiError::Aggregation(err) => {
                tracing::error!(error = %err, "aggregation failed");
                err.to_string()
            }
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Table>, ApiError>;

async fn expenditures(state: &AppState) -> Result<Arc<Table>, ApiError> {
    state.datasets.expenditures().await.ok_or_else(|| {
        tracing::warn!("expenditure dataset unavailable");
        ApiError::Unavailable(UNAVAILABLE)
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/ranking-cidades - Top municipalities by total expenditure
async fn ranking_cidades(State(state): State<AppState>) -> ApiResult {
    let table = expenditures(&state).await?;
    let ranking = group_sum_top_n(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE, TOP_CITIES)?;
    Ok(Json(ranking))
}

/// GET /api/todas-cidades - Every municipality with its total expenditure
async fn todas_cidades(State(state): State<AppState>) -> ApiResult {
    let table = expenditures(&state).await?;
    Ok(Json(group_sum_all(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE)?))
}

/// GET /api/media-cidades - Top municipalities by average expense
async fn media_cidades(State(state): State<AppState>) -> ApiResult {
    let table = expenditures(&state).await?;
    let ranking = group_mean_top_n(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE, TOP_CITIES)?;
    Ok(Json(ranking))
}

/// GET /api/ranking-partidos - Top parties by total expenditure
async fn ranking_partidos(State(state): State<AppState>) -> ApiResult {
    let table = expenditures(&state).await?;
    let ranking = group_sum_top_n(&table, columns::PARTY_CODE, columns::EXPENDITURE, TOP_PARTIES)?;
    Ok(Json(ranking))
}

/// GET /api/mapa-calor - Total expenditure per municipality id (choropleth)
async fn mapa_calor(State(state): State<AppState>) -> ApiResult {
    let table = expenditures(&state).await?;
    Ok(Json(group_sum_all(&table, columns::MUNICIPALITY_ID, columns::EXPENDITURE)?))
}

/// GET /api/correlacao-gasto-votacao - Expenditure vs turnout (scatter plot)
async fn correlacao_gasto_votacao(State(state): State<AppState>) -> Result<Response, ApiError> {
    let crossed = state.datasets.crossed().await.ok_or_else(|| {
        tracing::warn!("crossed dataset unavailable");
        ApiError::Unavailable(CROSSED_UNAVAILABLE)
    })?;
    Ok(Json(crossed.records()).into_response())
}

/// GET /api/health - Liveness, always 200
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.datasets.readiness();
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "datasets": readiness.datasets,
    }))
}

/// GET /api/ready - 200 once every dataset is loaded, 503 otherwise
async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let readiness = state.datasets.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}

// ============================================================================
// Router
// ============================================================================

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/ranking-cidades", get(ranking_cidades))
        .route("/todas-cidades", get(todas_cidades))
        .route("/media-cidades", get(media_cidades))
        .route("/ranking-partidos", get(ranking_partidos))
        .route("/mapa-calor", get(mapa_calor))
        .route("/correlacao-gasto-votacao", get(correlacao_gasto_votacao))
        .with_state(state)
}

/// Full application: `/api/*`, `/` (index.html) and `/static/*`.
pub fn app(state: AppState) -> Router {
    let index = ServeFile::new(state.static_root.join("index.html"));
    let assets = ServeDir::new(state.static_root.join("static"));

    Router::new()
        .route_service("/", index)
        .nest("/api", api_router(state))
        .nest_service("/static", assets)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
