//! Preference API endpoints.

use axum::{
    Router,
    body::Body,
    extract::{Path, Request, State},
    response::{Json, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::{
    classify::ServerErrorsFailureClass, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, info, trace, warn};
use ts_rs::TS;

use crate::monitor::scheduler::CheckTrigger;
use crate::prefs::UserPreferences;
use crate::state::AppState;
use crate::store::{cycles, preferences};
use crate::web::error::{ApiError, db_error};

/// Creates the web server router.
pub fn create_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/status", get(status))
        .route("/courses", get(list_courses))
        .route("/preferences", get(get_all_preferences))
        .route("/preferences", post(put_preferences))
        .route("/preferences/{email}", get(get_preferences))
        .route("/preferences/{email}", delete(delete_preferences))
        .route("/check", post(trigger_check))
        .route("/cycles/latest", get(latest_cycle))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router)
        .layer((
            CompressionLayer::new(),
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    tracing::debug_span!("request", path = request.uri().path())
                })
                .on_request(())
                .on_body_chunk(())
                .on_eos(())
                .on_response(
                    |response: &Response<Body>, latency: Duration, _span: &Span| {
                        let status = format!(
                            "{} {}",
                            response.status().as_u16(),
                            response.status().canonical_reason().unwrap_or("??")
                        );
                        if latency > Duration::from_millis(500) {
                            warn!(latency = ?latency, status, "response");
                        } else {
                            debug!(latency = ?latency, status, "response");
                        }
                    },
                )
                .on_failure(
                    |error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                        warn!(error = ?error, latency = ?latency, "request failed");
                    },
                ),
            TimeoutLayer::new(Duration::from_secs(10)),
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ))
}

/// `GET /health`
async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: String,
    version: String,
    commit: String,
    user_count: i64,
    storage: String,
    uptime_seconds: u64,
}

/// `GET /api/status`
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let user_count = preferences::count(&state.db_pool)
        .await
        .map_err(|e| db_error("user count", e))?;

    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        user_count,
        storage: "postgres".to_string(),
        uptime_seconds: state.uptime_seconds(),
    }))
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseInfo {
    key: String,
    display_name: String,
    default_open_time: String,
    location: Option<(f64, f64)>,
}

/// `GET /api/courses`
async fn list_courses(State(state): State<AppState>) -> Json<Vec<CourseInfo>> {
    let courses = state
        .catalog
        .iter()
        .map(|club| CourseInfo {
            key: club.key.to_string(),
            display_name: club.display_name.to_string(),
            default_open_time: club.default_open_time.to_string(),
            location: club.location,
        })
        .collect();
    Json(courses)
}

/// `GET /api/preferences`
async fn get_all_preferences(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = preferences::get_all(&state.db_pool)
        .await
        .map_err(|e| db_error("preference listing", e))?;
    Ok(Json(json!({ "preferences": users })))
}

/// `GET /api/preferences/{email}`
async fn get_preferences(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserPreferences>, ApiError> {
    preferences::get(&state.db_pool, &email)
        .await
        .map_err(|e| db_error("preference lookup", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no preferences for {email}")))
}

/// `POST /api/preferences`
///
/// Upserts a full preference record. Validation failures never reach the
/// scheduler; time preferences are normalized to the two-bucket form before
/// persisting.
async fn put_preferences(
    State(state): State<AppState>,
    Json(prefs): Json<UserPreferences>,
) -> Result<Json<Value>, ApiError> {
    prefs
        .validate(&state.catalog)
        .map_err(|e| ApiError::invalid_preferences(e.to_string()))?;
    let prefs = prefs.normalized();

    preferences::put(&state.db_pool, &prefs)
        .await
        .map_err(|e| db_error("preference upsert", e))?;

    info!(user = %prefs.email, courses = prefs.selected_courses.len(), "preferences saved");
    Ok(Json(json!({ "status": "saved", "email": prefs.email })))
}

/// `DELETE /api/preferences/{email}`
async fn delete_preferences(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = preferences::delete(&state.db_pool, &email)
        .await
        .map_err(|e| db_error("preference delete", e))?;
    if !deleted {
        return Err(ApiError::not_found(format!("no preferences for {email}")));
    }
    info!(user = %email, "preferences deleted");
    Ok(Json(json!({ "status": "deleted", "email": email })))
}

/// `POST /api/check`
///
/// Queues one immediate monitor cycle with the normal cycle invariants.
async fn trigger_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .check_tx
        .try_send(CheckTrigger)
        .map_err(|_| ApiError::bad_request("a check is already queued"))?;
    Ok(Json(json!({ "status": "queued" })))
}

/// `GET /api/cycles/latest`
async fn latest_cycle(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let record = cycles::latest(&state.db_pool)
        .await
        .map_err(|e| db_error("cycle lookup", e))?
        .ok_or_else(|| ApiError::not_found("no cycles recorded yet"))?;
    Ok(Json(serde_json::to_value(&record).map_err(|e| {
        ApiError::internal_error(format!("cycle encoding failed: {e}"))
    })?))
}
