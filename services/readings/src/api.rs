use crate::aggregator::{ReadingsAggregator, Scope};
use crate::config::{ApiConfig, Config};
use crate::layout::{Layout, SourceFilter, SourceType, Status};
use crate::locator::SessionLocator;
use crate::mover::{MoveItemResult, MoveRequest, StatusMover};
use crate::parser::SessionParser;
use crate::reading::{ReadingCounts, SessionRecord, WorkTypeStats};
use crate::store::ObjectStore;
use crate::work_types::{WorkType, WorkTypeCatalog};
use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub aggregator: Arc<ReadingsAggregator>,
    pub mover: Arc<StatusMover>,
    pub catalog: WorkTypeCatalog,
    pub layout: Layout,
    pub region: String,
}

impl AppState {
    /// Wire every component around one store
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        let catalog = WorkTypeCatalog::new(config.catalog.primary_work_type.clone());
        let layout = Layout::new(config.catalog.primary_work_type.clone());

        let aggregator = ReadingsAggregator::new(
            layout.clone(),
            SessionLocator::new(store.clone()),
            SessionParser::new(store.clone(), catalog.clone(), config.presigned_url_expiry()),
        );
        let mover = StatusMover::new(store.clone(), layout.clone());

        Self {
            store,
            aggregator: Arc::new(aggregator),
            mover: Arc::new(mover),
            catalog,
            layout,
            region: config.s3.region.clone(),
        }
    }

    fn scope(&self, query: ReadingsQuery) -> Result<Scope, ApiError> {
        let work_type = self
            .catalog
            .resolve(query.work_type.as_deref())
            .map_err(ApiError::BadRequest)?;

        Ok(Scope {
            source: query.source.unwrap_or_default(),
            work_type,
        })
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler failures and the status code each maps to
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Query parameters for the read endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingsQuery {
    /// `all` (default), `field` or `simulator`
    #[serde(default, deserialize_with = "empty_as_none")]
    pub source: Option<SourceFilter>,
    /// Work type code, primary when absent
    pub work_type: Option<String>,
}

/// `?source=` arrives as an empty string and means the same as no filter
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => T::deserialize(raw.into_deserializer()).map(Some),
    }
}

/// Bulk move request body
#[derive(Debug, Deserialize)]
pub struct BulkMoveRequest {
    pub readings: Vec<MoveRequest>,
}

/// Bulk move response
#[derive(Debug, Serialize)]
pub struct BulkMoveResponse {
    pub success: bool,
    pub moved: usize,
    pub total: usize,
    pub results: Vec<MoveItemResult>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/work-types", get(list_work_types))
        .route("/api/work-types/stats", get(list_work_type_stats))
        .route("/api/work-types/:code", get(get_work_type))
        .route("/api/work-types/:code/stats", get(get_work_type_stats))
        .route("/api/readings", get(list_readings))
        .route("/api/readings/bulk-move", post(bulk_move))
        .route("/api/readings/:id", get(get_reading))
        .route("/api/counts", get(get_counts))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let primary = state.catalog.primary();
    let folders: BTreeMap<&str, Vec<String>> = SourceType::ALL
        .iter()
        .map(|&source| {
            let prefixes = Status::ALL
                .iter()
                .map(|&status| state.layout.status_prefix(primary, source, status))
                .collect();
            (source.as_str(), prefixes)
        })
        .collect();
    let work_types: Vec<&str> = state.catalog.all().iter().map(|w| w.code).collect();

    Json(serde_json::json!({
        "status": "ok",
        "bucket": state.store.bucket(),
        "region": state.region,
        "workTypes": work_types,
        "folders": folders,
    }))
}

async fn list_work_types(State(state): State<AppState>) -> Json<&'static [WorkType]> {
    Json(state.catalog.all())
}

async fn get_work_type(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<&'static WorkType>, ApiError> {
    state
        .catalog
        .get(&code)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Work type '{}' not found", code)))
}

/// Stats for every work type that has at least one session
#[instrument(skip(state))]
async fn list_work_type_stats(State(state): State<AppState>) -> Json<Vec<WorkTypeStats>> {
    let mut stats = Vec::new();
    for work_type in state.catalog.all() {
        let entry = state.aggregator.work_type_stats(work_type).await;
        if entry.total_readings > 0 {
            stats.push(entry);
        }
    }

    Json(stats)
}

#[instrument(skip(state))]
async fn get_work_type_stats(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<WorkTypeStats>, ApiError> {
    let work_type = state
        .catalog
        .get(&code)
        .ok_or_else(|| ApiError::NotFound(format!("Work type '{}' not found", code)))?;

    Ok(Json(state.aggregator.work_type_stats(work_type).await))
}

/// List every reading in scope, newest first
#[instrument(skip(state, query))]
async fn list_readings(
    State(state): State<AppState>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let scope = state.scope(query)?;

    Ok(Json(state.aggregator.readings(&scope).await))
}

/// Per-status counts derived from the same scan as the list
#[instrument(skip(state, query))]
async fn get_counts(
    State(state): State<AppState>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<ReadingCounts>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let scope = state.scope(query)?;

    let counts = state.aggregator.counts(&scope).await;
    info!(?counts, "Counts computed");

    Ok(Json(counts))
}

/// Get single reading
#[instrument(skip(state, query))]
async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<SessionRecord>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let work_type = state
        .catalog
        .resolve(query.work_type.as_deref())
        .map_err(ApiError::BadRequest)?;

    state
        .aggregator
        .find(&id, &work_type)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Reading not found".to_string()))
}

/// Move readings between status folders
#[instrument(skip(state, body))]
async fn bulk_move(
    State(state): State<AppState>,
    body: Result<Json<BulkMoveRequest>, JsonRejection>,
) -> Result<Json<BulkMoveResponse>, ApiError> {
    let Json(request) = body.map_err(|e| {
        warn!(error = %e, "Rejected bulk move body");
        ApiError::BadRequest("Invalid request body".to_string())
    })?;

    for reading in &request.readings {
        if let Some(work_type) = reading.work_type.as_deref() {
            if !state.catalog.contains(work_type) {
                return Err(ApiError::BadRequest(format!(
                    "Unknown work type '{}'",
                    work_type
                )));
            }
        }
    }

    // Runs detached so a dropped connection cannot stop a move between its
    // copy and its delete
    let mover = state.mover.clone();
    let report = tokio::spawn(async move { mover.bulk_move(&request.readings).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Bulk move task failed");
            ApiError::Internal("Failed to move readings".to_string())
        })?;

    Ok(Json(BulkMoveResponse {
        success: true,
        moved: report.moved,
        total: report.total,
        results: report.results,
    }))
}

/// Start the readings API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting readings API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{InMemoryObjectStore, StoreOperation};
    use axum::body::Bytes;
    use axum::http::{header, Request};
    use axum::extract::FromRequest;

    fn test_config() -> Config {
        serde_json::from_value(serde_json::json!({ "s3": { "bucket": "test-bucket" } })).unwrap()
    }

    fn seeded_state() -> (Arc<InMemoryObjectStore>, AppState) {
        let store = Arc::new(InMemoryObjectStore::new("test-bucket"));
        store.put(
            "f_correct/sess123/metadata.json",
            r#"{"session_id": "sess123", "timestamp": "2024-01-01T00:00:00Z", "ml_prediction": "1234"}"#,
        );
        store.put("f_correct/sess123/original.jpg", vec![0u8; 2048]);
        store.put(
            "s_incorrect/sim9/metadata.json",
            r#"{"session_id": "sim9", "timestamp": "2024-02-01T00:00:00Z"}"#,
        );
        let state = AppState::new(store.clone(), &test_config());
        (store, state)
    }

    async fn json_body(body: &str) -> Result<Json<BulkMoveRequest>, JsonRejection> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/readings/bulk-move")
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(Bytes::from(body.to_string())))
            .unwrap();
        Json::<BulkMoveRequest>::from_request(request, &()).await
    }

    fn query(source: Option<SourceFilter>, work_type: Option<&str>) -> Result<Query<ReadingsQuery>, QueryRejection> {
        Ok(Query(ReadingsQuery {
            source,
            work_type: work_type.map(String::from),
        }))
    }

    #[tokio::test]
    async fn test_list_readings_newest_first() {
        let (_, state) = seeded_state();
        let Json(records) = list_readings(State(state), query(None, None)).await.unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["sim9", "sess123"]);
        assert_eq!(records[1].images[0].label, "Full Meter View");
    }

    fn parsed_query(uri: &str) -> Result<Query<ReadingsQuery>, QueryRejection> {
        let uri: axum::http::Uri = uri.parse().unwrap();
        Query::try_from_uri(&uri)
    }

    #[tokio::test]
    async fn test_empty_query_values_mean_defaults() {
        let (_, state) = seeded_state();
        let Json(records) = list_readings(
            State(state.clone()),
            parsed_query("/api/readings?source=&workType="),
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 2);

        let Json(field) = list_readings(State(state.clone()), parsed_query("/api/readings?source=field"))
            .await
            .unwrap();
        assert_eq!(field.len(), 1);
        assert_eq!(field[0].id, "sess123");

        let err = list_readings(State(state), parsed_query("/api/readings?source=drone"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_work_type_is_bad_request() {
        let (_, state) = seeded_state();
        let err = list_readings(State(state), query(None, Some("NOPE")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let (_, state) = seeded_state();
        let Json(counts) = get_counts(State(state), query(Some(SourceFilter::Field), None))
            .await
            .unwrap();

        assert_eq!(counts.total_readings, 1);
        assert_eq!(counts.correct_count, 1);
        assert_eq!(counts.incorrect_new_count, 0);
        assert_eq!(counts.total_pictures, 1);
    }

    #[tokio::test]
    async fn test_get_reading_and_missing() {
        let (_, state) = seeded_state();
        let Json(record) = get_reading(
            State(state.clone()),
            Path("sim9".to_string()),
            query(None, None),
        )
        .await
        .unwrap();
        assert_eq!(record.source_type, SourceType::Simulator);
        assert_eq!(record.status, Status::IncorrectNew);

        let err = get_reading(State(state), Path("ghost".to_string()), query(None, None))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bulk_move_endpoint() {
        let (store, state) = seeded_state();
        let body = json_body(
            r#"{"readings": [
                {"sessionId": "sess123", "sourceType": "field", "currentStatus": "correct", "targetStatus": "incorrect_labeled"},
                {"sessionId": "ghost", "sourceType": "field", "currentStatus": "correct", "targetStatus": "incorrect_new"}
            ]}"#,
        )
        .await;

        let Json(response) = bulk_move(State(state), body).await.unwrap();
        assert!(response.success);
        assert_eq!(response.moved, 1);
        assert_eq!(response.total, 2);
        assert!(store.contains("f_incorrect_labeled/sess123/original.jpg"));
        assert!(store.keys_under("f_correct/").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bulk_move_touches_nothing() {
        let (store, state) = seeded_state();
        // Any store access would now fail loudly
        store.fail_on(StoreOperation::ListObjects, "");
        store.fail_on(StoreOperation::Copy, "");

        for raw in [
            r#"{"readings": "nope"}"#,
            r#"{"items": []}"#,
            r#"{"readings": [{"sessionId": "sess123"}]}"#,
            r#"{"readings": [{"sessionId": "x", "sourceType": "field", "currentStatus": "done", "targetStatus": "correct"}]}"#,
            "not json",
        ] {
            let err = bulk_move(State(state.clone()), json_body(raw).await)
                .await
                .unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }

        assert!(store.contains("f_correct/sess123/original.jpg"));
    }

    #[tokio::test]
    async fn test_work_type_endpoints() {
        let (_, state) = seeded_state();
        let Json(all) = list_work_types(State(state.clone())).await;
        assert_eq!(all.len(), 5);

        let Json(leak) = get_work_type(State(state.clone()), Path("LEAK".to_string()))
            .await
            .unwrap();
        assert_eq!(leak.name, "Leak Inspection");

        let err = get_work_type(State(state), Path("ZZZZ".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_work_type_stats_endpoints() {
        let (store, state) = seeded_state();
        store.put(
            "GO95/f_incorrect/pole1/metadata.json",
            r#"{"session_id": "pole1", "timestamp": "2024-03-01T00:00:00Z", "condition_code": "NEST_ON_POLE", "is_correct": false}"#,
        );

        let Json(all) = list_work_type_stats(State(state.clone())).await;
        let codes: Vec<_> = all.iter().map(|s| s.work_type_code.as_str()).collect();
        assert_eq!(codes, vec!["GO95", "METR"]);

        let Json(go95) = get_work_type_stats(State(state.clone()), Path("GO95".to_string()))
            .await
            .unwrap();
        assert_eq!(go95.work_type_name, "GO95 Electrical Pole Inspection");
        assert_eq!(go95.total_readings, 1);
        assert_eq!(go95.status_breakdown.incorrect_new, 1);
        assert_eq!(go95.condition_code_counts[0].code, "NEST_ON_POLE");

        let Json(leak) = get_work_type_stats(State(state.clone()), Path("LEAK".to_string()))
            .await
            .unwrap();
        assert_eq!(leak.total_readings, 0);

        let err = get_work_type_stats(State(state), Path("ZZZZ".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_bucket_and_folders() {
        let (_, state) = seeded_state();
        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["bucket"], "test-bucket");
        assert_eq!(json["region"], "us-east-1");
        assert_eq!(json["folders"]["field"][1], "f_incorrect/");
    }
}
