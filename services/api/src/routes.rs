use crate::cache::{job_key, OPEN_JOBS_KEY};
use crate::infra::AppState;
use axum::extract::{Path, Request};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use taskmarket::error::AppError;
use taskmarket::marketplace::orders::{actor_from_headers, error_response};
use taskmarket::marketplace::{marketplace_router, AccountId, JobDraft, JobId, MarketError};

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    pub(crate) display_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KycReviewRequest {
    pub(crate) approve: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivationRequest {
    pub(crate) active: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AmountRequest {
    pub(crate) amount: Decimal,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

pub(crate) fn with_market_routes(state: &AppState) -> Router {
    let service_routes = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/jobs", get(list_jobs).post(create_job))
        .route(
            "/api/v1/jobs/:job_id",
            get(job_detail).put(update_job).delete(delete_job),
        )
        .route("/api/v1/accounts", post(register_account))
        .route("/api/v1/accounts/:account_id", get(account_detail))
        .route(
            "/api/v1/accounts/:account_id/kyc",
            post(submit_kyc).put(review_kyc),
        )
        .route("/api/v1/accounts/:account_id/active", put(set_active))
        .route("/api/v1/accounts/:account_id/recharge", post(recharge))
        .route("/api/v1/accounts/:account_id/withdraw", post(withdraw))
        .route("/api/v1/accounts/:account_id/audit", get(audit))
        .route("/api/v1/admin/sweep", post(sweep_now));

    marketplace_router(state.market.orders.clone())
        .merge(service_routes)
        .layer(middleware::from_fn(invalidate_on_write))
}

/// Any successful write may change slot counts or job fields, so cached listings are dropped.
async fn invalidate_on_write(
    Extension(state): Extension<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mutating = !matches!(*request.method(), Method::GET | Method::HEAD);
    let response = next.run(request).await;
    if mutating && response.status().is_success() {
        state.cache.invalidate_all();
    }
    response
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, MarketError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn list_jobs(Extension(state): Extension<AppState>) -> Result<Json<Value>, AppError> {
    if let Some(cached) = state.cache.get(OPEN_JOBS_KEY) {
        return Ok(Json(cached));
    }

    let jobs = state.market.jobs.list_open()?;
    let payload = json!(jobs);
    state
        .cache
        .put(OPEN_JOBS_KEY, payload.clone(), state.cache_ttl);
    Ok(Json(payload))
}

pub(crate) async fn job_detail(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let key = job_key(&job_id);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }

    let job = state.market.jobs.get(&JobId(job_id))?;
    let payload = json!(job);
    state.cache.put(&key, payload.clone(), state.cache_ttl);
    Ok(Json(payload))
}

pub(crate) async fn create_job(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(draft): Json<JobDraft>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        state.market.jobs.create(&actor, draft, Utc::now()),
    )
}

pub(crate) async fn update_job(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<JobDraft>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.market.jobs.update(&actor, &JobId(job_id), draft),
    )
}

pub(crate) async fn delete_job(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, state.market.jobs.delete(&actor, &JobId(job_id)))
}

/// Registers the calling identity; the auth layer has already vouched for the id.
pub(crate) async fn register_account(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        state
            .market
            .accounts
            .register(actor.account_id, request.display_name, Utc::now()),
    )
}

pub(crate) async fn account_detail(
    Extension(state): Extension<AppState>,
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
            "accounts are visible to their owner and administrators".to_string(),
        ));
    }
    respond(StatusCode::OK, state.market.accounts.get(&account_id))
}

pub(crate) async fn submit_kyc(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .market
            .accounts
            .submit_kyc(&actor, &AccountId(account_id)),
    )
}

pub(crate) async fn review_kyc(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<KycReviewRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .market
            .accounts
            .review_kyc(&actor, &AccountId(account_id), request.approve),
    )
}

pub(crate) async fn set_active(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ActivationRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .market
            .accounts
            .set_active(&actor, &AccountId(account_id), request.active),
    )
}

pub(crate) async fn recharge(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AmountRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if !actor.is_admin() {
        return error_response(MarketError::Forbidden(
            "administrator role required to recharge balances".to_string(),
        ));
    }

    let description = request
        .description
        .unwrap_or_else(|| format!("recharge by {}", actor.account_id));
    respond(
        StatusCode::CREATED,
        state.market.ledger.recharge(
            &AccountId(account_id),
            request.amount,
            &description,
            Utc::now(),
        ),
    )
}

pub(crate) async fn withdraw(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AmountRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let account_id = AccountId(account_id);
    if !actor.owns(&account_id) {
        return error_response(MarketError::Forbidden(
            "only the account owner may withdraw funds".to_string(),
        ));
    }

    let description = request
        .description
        .unwrap_or_else(|| "withdrawal".to_string());
    respond(
        StatusCode::CREATED,
        state
            .market
            .ledger
            .debit(&account_id, request.amount, &description, Utc::now()),
    )
}

pub(crate) async fn audit(
    Extension(state): Extension<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if !actor.is_admin() {
        return error_response(MarketError::Forbidden(
            "administrator role required to audit ledgers".to_string(),
        ));
    }
    respond(
        StatusCode::OK,
        state.market.ledger.audit(&AccountId(account_id)),
    )
}

pub(crate) async fn sweep_now(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if !actor.is_admin() {
        return error_response(MarketError::Forbidden(
            "administrator role required to run the sweeper".to_string(),
        ));
    }
    respond(StatusCode::OK, state.market.sweeper.sweep(Utc::now()))
}
