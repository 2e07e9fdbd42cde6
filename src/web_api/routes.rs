//! API Routes

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::camera_status_tracker::CameraStatusView;
use crate::config_store::FusionPolicy;
use crate::error::Result;
use crate::models::ApiResponse;
use crate::risk_engine::AlertLevel;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(get_status))
        // Fusion state
        .route("/api/identities", get(list_identities))
        .route("/api/assessments", get(list_assessments))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        // Policy
        .route("/api/policy", get(get_policy).put(update_policy))
        .with_state(state)
}

// ========================================
// Status Handlers
// ========================================

#[derive(Debug, Serialize)]
struct StatusResponse {
    cycle: u64,
    global_alert: AlertLevel,
    system_error: Option<String>,
    degraded: bool,
    identities_visible: usize,
    identities_tracked: usize,
    intents_dropped: u64,
    cameras: Vec<CameraStatusView>,
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let (cycle, global_alert, system_error, degraded, visible, dropped) = {
        let report = state.reports.borrow();
        (
            report.cycle,
            report.global_alert,
            report.system_error.clone(),
            report.is_system_error(),
            report.identities,
            report.intents_dropped,
        )
    };

    Json(ApiResponse::success(StatusResponse {
        cycle,
        global_alert,
        system_error,
        degraded,
        identities_visible: visible,
        identities_tracked: state.identities.identity_count().await,
        intents_dropped: dropped,
        cameras: state.camera_status.get_all().await,
    }))
}

// ========================================
// Fusion State Handlers
// ========================================

async fn list_identities(State(state): State<AppState>) -> impl IntoResponse {
    let merged = state.identities.merged_snapshot().await;
    Json(ApiResponse::success(merged))
}

async fn list_assessments(State(state): State<AppState>) -> impl IntoResponse {
    let assessments = state.reports.borrow().assessments.clone();
    Json(ApiResponse::success(assessments))
}

// ========================================
// Alert Handlers
// ========================================

#[derive(Deserialize)]
struct AlertQuery {
    limit: Option<usize>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100);
    let events = state.alert_log.get_latest(limit).await;
    Json(ApiResponse::success(events))
}

// ========================================
// Policy Handlers
// ========================================

async fn get_policy(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.config_store.policy().await))
}

async fn update_policy(
    State(state): State<AppState>,
    Json(policy): Json<FusionPolicy>,
) -> Result<impl IntoResponse> {
    state.config_store.update_policy(policy.clone()).await?;
    Ok(Json(ApiResponse::success(policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_log_service::AlertLogService;
    use crate::camera_status_tracker::CameraStatusTracker;
    use crate::config_store::ConfigStore;
    use crate::decision_cycle::CycleReport;
    use crate::identity_store::IdentityStore;
    use crate::state::AppConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ConfigStore>, watch::Sender<CycleReport>) {
        let config_store = Arc::new(ConfigStore::with_defaults());
        let (tx, rx) = watch::channel(CycleReport::initial());
        let state = AppState {
            config: AppConfig::default(),
            config_store: config_store.clone(),
            identities: Arc::new(IdentityStore::new(config_store.clone())),
            camera_status: Arc::new(CameraStatusTracker::new()),
            alert_log: Arc::new(AlertLogService::default()),
            reports: rx,
            started_at: chrono::Utc::now(),
        };
        (create_router(state), config_store, tx)
    }

    #[tokio::test]
    async fn test_healthz() {
        let (router, _, _tx) = app();
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_reflects_latest_report() {
        let (router, _, tx) = app();
        let mut report = CycleReport::initial();
        report.cycle = 7;
        report.global_alert = AlertLevel::Watch;
        tx.send(report).unwrap();

        let response = router
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["cycle"], 7);
        assert_eq!(json["data"]["global_alert"], "watch");
    }

    #[tokio::test]
    async fn test_invalid_policy_rejected() {
        let (router, config_store, _tx) = app();
        let body = r#"{"scoring": {"watch_threshold": 90, "critical_threshold": 50}}"#;
        let response = router
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/policy")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(config_store.policy().await.scoring.watch_threshold, 1);
    }

    #[tokio::test]
    async fn test_policy_update_applies() {
        let (router, config_store, _tx) = app();
        let body = r#"{"reid": {"match_threshold": 500.0}}"#;
        let response = router
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/policy")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(config_store.policy().await.reid.match_threshold, 500.0);
    }
}
