use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::service::OrderLifecycleService;
use crate::marketplace::domain::{AccountId, Actor, JobId, OrderId, OrderStatus, Role};
use crate::marketplace::error::{ErrorKind, MarketError};

pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const ROLE_HEADER: &str = "x-account-role";

#[derive(Debug, Default, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub tier_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Router exposing the order lifecycle and the caller's ledger.
pub fn marketplace_router(service: Arc<OrderLifecycleService>) -> Router {
    Router::new()
        .route("/api/v1/jobs/:job_id/apply", post(apply_handler))
        .route("/api/v1/orders/:order_id", get(order_handler))
        .route("/api/v1/orders/:order_id/submit", post(submit_handler))
        .route("/api/v1/orders/:order_id/status", put(status_handler))
        .route("/api/v1/orders/:order_id/cancel", post(cancel_handler))
        .route(
            "/api/v1/accounts/:account_id/orders",
            get(account_orders_handler),
        )
        .route(
            "/api/v1/accounts/:account_id/transactions",
            get(account_transactions_handler),
        )
        .with_state(service)
}

/// Resolve the caller from the headers set by the upstream auth layer.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let account_id = headers
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {ACCOUNT_HEADER} header") });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })?;

    let role = match headers.get(ROLE_HEADER).and_then(|value| value.to_str().ok()) {
        Some(raw) => raw.parse::<Role>().map_err(|err| {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        })?,
        None => Role::User,
    };

    Ok(Actor {
        account_id: AccountId::new(account_id),
        role,
    })
}

/// Map a marketplace error to its HTTP status and JSON body.
pub fn error_response(error: MarketError) -> Response {
    let status = match error.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let retry_after = match &error {
        MarketError::TooManyRequests {
            retry_after_secs, ..
        } => Some(*retry_after_secs),
        _ => None,
    };

    let payload = json!({ "error": error.to_string() });
    let mut response = (status, axum::Json(payload)).into_response();
    if let Some(seconds) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

pub(crate) async fn apply_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ApplyRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.apply(&JobId(job_id), &actor, request.tier_index, Utc::now()) {
        Ok(order) => (StatusCode::CREATED, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn order_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.get(&OrderId(order_id), &actor) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.submit(
        &OrderId(order_id),
        &actor,
        request.description,
        request.evidence,
        Utc::now(),
    ) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<StatusRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let status = match request.status.parse::<OrderStatus>() {
        Ok(status) => status,
        Err(err) => {
            return error_response(MarketError::BadRequest(format!("invalid order status: {err}")))
        }
    };

    match service.set_status(&OrderId(order_id), status, &actor, Utc::now()) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.cancel(&OrderId(order_id), &actor, Utc::now()) {
        Ok(order) => (StatusCode::OK, axum::Json(order)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn account_orders_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.list_for_account(&AccountId(account_id), &actor) {
        Ok(orders) => (StatusCode::OK, axum::Json(orders)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn account_transactions_handler(
    State(service): State<Arc<OrderLifecycleService>>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let account_id = AccountId(account_id);
    if !actor.is_admin() && !actor.owns(&account_id) {
        return error_response(MarketError::Forbidden(
            "transactions are visible to their owner and administrators".to_string(),
        ));
    }

    match service.ledger().transactions(&account_id) {
        Ok(transactions) => (StatusCode::OK, axum::Json(transactions)).into_response(),
        Err(error) => error_response(error),
    }
}
