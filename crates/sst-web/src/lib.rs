//! Axum JSON API for SST: opportunity listing, evaluation, description
//! mining, and stats.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sst_core::{OpportunityQuery, Page, SortKey, SortOrder};
use sst_engine::{
    compute_stats, deliverables_report, evaluate, list_opportunities, load_opportunity,
    proposal_requirements_report, Clock, EngineError, ExtractionRules, SystemClock,
};
use sst_store::{MemoryStore, OpportunityStore, PgStore, StoreError};
use tokio::net::TcpListener;

pub const CRATE_NAME: &str = "sst-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OpportunityStore>,
    pub clock: Arc<dyn Clock>,
    pub rules: Arc<ExtractionRules>,
}

impl AppState {
    pub fn new(store: Arc<dyn OpportunityStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            rules: Arc::new(ExtractionRules::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rules(mut self, rules: ExtractionRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Store selection mirrors the deployment ladder: a reachable database,
    /// else a JSON snapshot, else the fixed demo records. Each downgrade is
    /// logged, never fatal.
    pub async fn from_env() -> Self {
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            match PgStore::connect(&database_url).await {
                Ok(store) => return Self::new(Arc::new(store)),
                Err(err) => {
                    tracing::warn!("database unavailable, falling back to snapshot: {err}")
                }
            }
        }
        if let Ok(path) = std::env::var("SST_OPPORTUNITIES_PATH") {
            match MemoryStore::from_json_file(&path) {
                Ok(store) => return Self::new(Arc::new(store)),
                Err(err) => {
                    tracing::warn!("snapshot unreadable, falling back to demo records: {err}")
                }
            }
        }
        Self::new(Arc::new(MemoryStore::demo()))
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Store(StoreError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => Self::NotFound,
            EngineError::Store(err) => Self::Store(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Opportunity not found".to_string()),
            ApiError::Store(StoreError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Opportunity store unavailable".to_string(),
            ),
            ApiError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Raw list-endpoint parameters. Numeric fields arrive as strings so that
/// unparseable values fall back to defaults instead of rejecting the
/// request. `start`/`length`/`order_col`/`order_dir` are the offset-based
/// aliases; `page`/`per_page`/`sort_by`/`sort_order` win when both are sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    per_page: Option<String>,
    start: Option<String>,
    length: Option<String>,
    search: Option<String>,
    agency: Option<String>,
    naics: Option<String>,
    active: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    order_col: Option<String>,
    order_dir: Option<String>,
}

fn parse_i64(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

impl ListParams {
    pub fn into_query(self) -> OpportunityQuery {
        let mut query = OpportunityQuery::default();

        if let Some(length) = parse_i64(self.length.as_ref()) {
            query.per_page = length;
        }
        if let Some(per_page) = parse_i64(self.per_page.as_ref()) {
            query.per_page = per_page;
        }
        if let Some(start) = parse_i64(self.start.as_ref()) {
            query.page = if query.per_page > 0 {
                start.div_euclid(query.per_page) + 1
            } else {
                1
            };
        }
        if let Some(page) = parse_i64(self.page.as_ref()) {
            query.page = page;
        }

        query.search = self.search.unwrap_or_default();
        query.agency = self.agency.unwrap_or_default();
        query.naics = self.naics.unwrap_or_default();
        query.active = self.active.unwrap_or_default();

        if let Some(token) = self.sort_by.or(self.order_col) {
            query.sort_by = SortKey::parse(&token);
        }
        if let Some(token) = self.sort_order.or(self.order_dir) {
            query.sort_order = SortOrder::parse(&token);
        }

        query
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/opportunities", get(list_handler))
        .route("/api/opportunities/{notice_id}", get(detail_handler))
        .route("/api/opportunities/{notice_id}/evaluate", post(evaluate_handler))
        .route(
            "/api/opportunities/{notice_id}/deliverables",
            post(deliverables_handler),
        )
        .route("/api/opportunities/{notice_id}/proposal", post(proposal_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/health", get(health_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("SST_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = AppState::from_env().await;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "serving opportunity API");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, ApiError> {
    let query = params.into_query();
    let page = list_opportunities(state.store.as_ref(), &query).await?;
    Ok(Json(page))
}

async fn detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(notice_id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let opportunity = load_opportunity(state.store.as_ref(), &notice_id).await?;
    Ok(Json(opportunity).into_response())
}

async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(notice_id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let opportunity = load_opportunity(state.store.as_ref(), &notice_id).await?;
    Ok(Json(evaluate(&opportunity, state.clock.as_ref())).into_response())
}

async fn deliverables_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(notice_id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let opportunity = load_opportunity(state.store.as_ref(), &notice_id).await?;
    Ok(Json(deliverables_report(&opportunity, &state.rules)).into_response())
}

async fn proposal_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(notice_id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let opportunity = load_opportunity(state.store.as_ref(), &notice_id).await?;
    Ok(Json(proposal_requirements_report(&opportunity, &state.rules)).into_response())
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = state
        .store
        .fetch_all()
        .await
        .map_err(|err| ApiError::from(EngineError::from(err)))?;
    Ok(Json(compute_stats(&records, state.clock.as_ref())).into_response())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": state.clock.now().to_rfc3339(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn demo_app() -> Router {
        app(AppState::new(Arc::new(MemoryStore::demo())))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn list_returns_page_contract() {
        let (status, body) =
            get_json(demo_app(), "/api/opportunities?per_page=1&page=2&sort_by=title&sort_order=asc")
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["pagination"]["total_pages"], 2);
        assert_eq!(body["pagination"]["has_prev"], true);
        assert_eq!(body["opportunities"].as_array().unwrap().len(), 1);
        // Ascending by title puts "IT Services and Support" on page 2.
        assert_eq!(body["opportunities"][0]["notice_id"], "DEMO001");
    }

    #[tokio::test]
    async fn unparseable_numeric_params_fall_back_to_defaults() {
        let (status, body) =
            get_json(demo_app(), "/api/opportunities?page=abc&per_page=xyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["per_page"], 20);
        assert_eq!(body["opportunities"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn offset_length_aliases_map_onto_pages() {
        let (status, body) = get_json(demo_app(), "/api/opportunities?start=1&length=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["page"], 2);
        // Default order is posted_date desc, so the older record is second.
        assert_eq!(body["opportunities"][0]["notice_id"], "DEMO001");
    }

    #[tokio::test]
    async fn filters_pass_through_to_the_store() {
        let (status, body) =
            get_json(demo_app(), "/api/opportunities?agency=general+services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["opportunities"][0]["notice_id"], "DEMO002");
    }

    #[tokio::test]
    async fn detail_distinguishes_found_and_missing() {
        let (status, body) = get_json(demo_app(), "/api/opportunities/DEMO001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice_id"], "DEMO001");

        let (status, body) = get_json(demo_app(), "/api/opportunities/NOPE").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Opportunity not found");
    }

    #[tokio::test]
    async fn evaluate_returns_recommendations() {
        let (status, body) = post_json(demo_app(), "/api/opportunities/DEMO001/evaluate").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice_id"], "DEMO001");
        assert!(!body["recommendations"].as_array().unwrap().is_empty());

        let (status, _) = post_json(demo_app(), "/api/opportunities/NOPE/evaluate").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deliverables_and_proposal_views_return_contexts() {
        let (status, body) =
            post_json(demo_app(), "/api/opportunities/DEMO001/deliverables").await;
        assert_eq!(status, StatusCode::OK);
        // The demo description mentions software and systems.
        assert!(!body["requirements"].as_array().unwrap().is_empty());

        let (status, body) = post_json(demo_app(), "/api/opportunities/DEMO001/proposal").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["requirements"].is_array());
        assert_eq!(body["set_aside_type"], "");
    }

    #[tokio::test]
    async fn stats_reports_aggregates() {
        let (status, body) = get_json(demo_app(), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_opportunities"], 2);
        assert_eq!(body["active_opportunities"], 2);
        assert_eq!(body["top_agencies"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn health_endpoint_is_always_up() {
        let (status, body) = get_json(demo_app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
