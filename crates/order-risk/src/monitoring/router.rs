use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use crate::alerts::AlertEmitter;
use crate::risk::domain::OrderId;

use super::evidence::{EvidenceError, EvidenceRepository, EvidenceStatus};
use super::record::DisputeEvent;
use super::repository::{MonitoringFilter, MonitoringRepository};
use super::scheduler::{MonitoringError, MonitoringScheduler};

/// Router builder for the monitoring listing, dispute intake, and evidence endpoints.
pub fn monitoring_router<M, V, A>(scheduler: Arc<MonitoringScheduler<M, V, A>>) -> Router
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    Router::new()
        .route("/api/v1/monitoring/orders", get(list_handler::<M, V, A>))
        .route("/api/v1/monitoring/sweep", post(sweep_handler::<M, V, A>))
        .route(
            "/api/v1/monitoring/orders/:order_id/dispute",
            post(dispute_handler::<M, V, A>),
        )
        .route(
            "/api/v1/monitoring/orders/:order_id/evidence",
            post(evidence_handler::<M, V, A>),
        )
        .route(
            "/api/v1/monitoring/orders/:order_id/evidence/communication-log",
            get(communication_log_handler::<M, V, A>),
        )
        .with_state(scheduler)
}

pub(crate) async fn list_handler<M, V, A>(
    State(scheduler): State<Arc<MonitoringScheduler<M, V, A>>>,
    Query(filter): Query<MonitoringFilter>,
) -> Response
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    match scheduler.get_monitored_orders(&filter) {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(err) => monitoring_error_response(err),
    }
}

pub(crate) async fn sweep_handler<M, V, A>(
    State(scheduler): State<Arc<MonitoringScheduler<M, V, A>>>,
) -> Response
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    match scheduler.sweep(Utc::now()).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => monitoring_error_response(err),
    }
}

pub(crate) async fn dispute_handler<M, V, A>(
    State(scheduler): State<Arc<MonitoringScheduler<M, V, A>>>,
    Path(order_id): Path<String>,
    axum::Json(event): axum::Json<DisputeEvent>,
) -> Response
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    match scheduler
        .report_dispute(&OrderId(order_id), event, Utc::now())
        .await
    {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => monitoring_error_response(err),
    }
}

pub(crate) async fn evidence_handler<M, V, A>(
    State(scheduler): State<Arc<MonitoringScheduler<M, V, A>>>,
    Path(order_id): Path<String>,
) -> Response
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    match scheduler
        .build_evidence(&OrderId(order_id), Utc::now())
        .await
    {
        Ok(package) if package.status == EvidenceStatus::Completed => {
            (StatusCode::CREATED, axum::Json(package)).into_response()
        }
        Ok(package) => (StatusCode::ACCEPTED, axum::Json(package)).into_response(),
        Err(err) => evidence_error_response(err),
    }
}

pub(crate) async fn communication_log_handler<M, V, A>(
    State(scheduler): State<Arc<MonitoringScheduler<M, V, A>>>,
    Path(order_id): Path<String>,
) -> Response
where
    M: MonitoringRepository + 'static,
    V: EvidenceRepository + 'static,
    A: AlertEmitter + 'static,
{
    let order_id = OrderId(order_id);
    let completed = match scheduler.evidence_packages(&order_id) {
        Ok(packages) => packages
            .into_iter()
            .find(|package| package.status == EvidenceStatus::Completed),
        Err(err) => return evidence_error_response(err),
    };
    let Some(package) = completed else {
        let payload = json!({
            "error": format!("no completed evidence package for order {order_id}"),
        });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    };

    match package.communication_log_csv() {
        Ok(csv) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/csv")], csv).into_response(),
        Err(err) => evidence_error_response(err),
    }
}

fn monitoring_error_response(err: MonitoringError) -> Response {
    let status = match &err {
        MonitoringError::NotFound(_) => StatusCode::NOT_FOUND,
        MonitoringError::Record { .. } => StatusCode::CONFLICT,
        MonitoringError::Feed(_) => StatusCode::BAD_GATEWAY,
        MonitoringError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn evidence_error_response(err: EvidenceError) -> Response {
    let status = match &err {
        EvidenceError::NotFound(_) => StatusCode::NOT_FOUND,
        EvidenceError::NotDisputed { .. } => StatusCode::CONFLICT,
        EvidenceError::Repository(_) | EvidenceError::Export(_) | EvidenceError::Aborted(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
