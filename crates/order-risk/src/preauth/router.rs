use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use crate::alerts::AlertEmitter;
use crate::monitoring::repository::MonitoringRepository;
use crate::risk::domain::{OrderContext, OrderId};
use crate::risk::policy::PolicyRegistry;
use crate::store::RepositoryError;

use super::gate::{GateError, MoveOutcome, PreAuthGate};
use super::order::ReviewRequest;
use super::repository::PreAuthRepository;

/// Gate plus the merchant policies used to resolve each incoming order.
pub struct PreAuthApi<P, M, A> {
    pub gate: PreAuthGate<P, M, A>,
    pub policies: Arc<PolicyRegistry>,
}

/// Router builder exposing the pre-auth check, review, and hand-off endpoints.
pub fn pre_auth_router<P, M, A>(gate: PreAuthGate<P, M, A>, policies: Arc<PolicyRegistry>) -> Router
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    let api = Arc::new(PreAuthApi { gate, policies });
    Router::new()
        .route("/api/v1/pre-auth/orders", post(check_handler::<P, M, A>))
        .route(
            "/api/v1/pre-auth/orders/:order_id",
            get(status_handler::<P, M, A>),
        )
        .route(
            "/api/v1/pre-auth/orders/:order_id/assessments",
            get(assessments_handler::<P, M, A>),
        )
        .route(
            "/api/v1/pre-auth/orders/:order_id/review",
            post(review_handler::<P, M, A>),
        )
        .route(
            "/api/v1/pre-auth/orders/:order_id/monitor",
            post(monitor_handler::<P, M, A>),
        )
        .with_state(api)
}

pub(crate) async fn check_handler<P, M, A>(
    State(api): State<Arc<PreAuthApi<P, M, A>>>,
    axum::Json(ctx): axum::Json<OrderContext>,
) -> Response
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    let policy = match api.policies.resolve(&ctx.merchant_id) {
        Ok(policy) => policy,
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    match api.gate.run_pre_auth_check(ctx, policy, Utc::now()).await {
        Ok(order) => (StatusCode::CREATED, axum::Json(order)).into_response(),
        Err(err) => gate_error_response(err),
    }
}

pub(crate) async fn status_handler<P, M, A>(
    State(api): State<Arc<PreAuthApi<P, M, A>>>,
    Path(order_id): Path<String>,
) -> Response
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    match api.gate.get(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(err) => gate_error_response(err),
    }
}

pub(crate) async fn assessments_handler<P, M, A>(
    State(api): State<Arc<PreAuthApi<P, M, A>>>,
    Path(order_id): Path<String>,
) -> Response
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    match api.gate.assessments(&OrderId(order_id)) {
        Ok(history) => (StatusCode::OK, axum::Json(history)).into_response(),
        Err(err) => gate_error_response(err),
    }
}

pub(crate) async fn review_handler<P, M, A>(
    State(api): State<Arc<PreAuthApi<P, M, A>>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    let result = api
        .gate
        .review(
            &OrderId(order_id),
            request.action,
            &request.reviewer,
            request.note,
            Utc::now(),
        )
        .await;
    match result {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(err) => gate_error_response(err),
    }
}

pub(crate) async fn monitor_handler<P, M, A>(
    State(api): State<Arc<PreAuthApi<P, M, A>>>,
    Path(order_id): Path<String>,
) -> Response
where
    P: PreAuthRepository + 'static,
    M: MonitoringRepository + 'static,
    A: AlertEmitter + 'static,
{
    match api
        .gate
        .move_pre_auth_to_monitoring(&OrderId(order_id), Utc::now())
        .await
    {
        Ok(outcome @ MoveOutcome::Created(_)) => {
            (StatusCode::CREATED, axum::Json(outcome)).into_response()
        }
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => gate_error_response(err),
    }
}

fn gate_error_response(err: GateError) -> Response {
    let status = match &err {
        GateError::Validation(_)
        | GateError::PolicyMismatch { .. }
        | GateError::MissingReviewer => StatusCode::UNPROCESSABLE_ENTITY,
        GateError::NotFound(_) => StatusCode::NOT_FOUND,
        GateError::Transition(_)
        | GateError::ReviewWindowElapsed { .. }
        | GateError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        GateError::Repository(_) | GateError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
