use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use server_api::{
    create_company, create_deal, create_user, delete_deal, get_deal, list_companies, list_deals,
    list_users, update_deal, ApiContext,
};
use shared::{
    domain::DealId,
    error::{ApiError, ErrorCode},
    protocol::{
        CompanySummary, Deal, DealFilters, DealUpdate, NewCompany, NewDeal, NewUser, UserSummary,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/deals", get(http_list_deals).post(http_create_deal))
        .route("/api/deals/", get(http_list_deals).post(http_create_deal))
        .route(
            "/api/deals/:deal_id",
            get(http_get_deal)
                .put(http_update_deal)
                .delete(http_delete_deal),
        )
        .route(
            "/api/companies",
            get(http_list_companies).post(http_create_company),
        )
        .route(
            "/api/companies/",
            get(http_list_companies).post(http_create_company),
        )
        .route("/api/users", get(http_list_users).post(http_create_user))
        .route("/api/users/", get(http_list_users).post(http_create_user))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if matches!(err.code, ErrorCode::Internal) {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_deals(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<DealFilters>,
) -> ApiResult<Vec<Deal>> {
    list_deals(&state.api, &filters).await.map(Json).map_err(reject)
}

async fn http_create_deal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewDeal>,
) -> ApiResult<Deal> {
    create_deal(&state.api, req).await.map(Json).map_err(reject)
}

async fn http_get_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i64>,
) -> ApiResult<Deal> {
    get_deal(&state.api, DealId(deal_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i64>,
    Json(req): Json<DealUpdate>,
) -> ApiResult<Deal> {
    update_deal(&state.api, DealId(deal_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_deal(
    State(state): State<Arc<AppState>>,
    Path(deal_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    delete_deal(&state.api, DealId(deal_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_companies(State(state): State<Arc<AppState>>) -> ApiResult<Vec<CompanySummary>> {
    list_companies(&state.api).await.map(Json).map_err(reject)
}

async fn http_create_company(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewCompany>,
) -> ApiResult<CompanySummary> {
    create_company(&state.api, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_users(State(state): State<Arc<AppState>>) -> ApiResult<Vec<UserSummary>> {
    list_users(&state.api).await.map(Json).map_err(reject)
}

async fn http_create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewUser>,
) -> ApiResult<UserSummary> {
    create_user(&state.api, req).await.map(Json).map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
