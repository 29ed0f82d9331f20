use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};

use crate::{
    auth::{AdminIdentity, ProducerIdentity},
    errors::ServiceError,
    ApiResponse, AppState, ListQuery,
};

/// Wallet summary for the current producer.
#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    responses((status = 200, description = "Wallet summary", body = crate::services::wallets::WalletSummaryResponse)),
    tag = "Wallet"
)]
pub async fn wallet_summary(
    State(state): State<AppState>,
    producer: ProducerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .wallets
        .summary(producer.0, &state.config.currency)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Paginated credit/debit history for the current producer.
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    params(("page" = u64, Query, description = "Page number"), ("limit" = u64, Query, description = "Page size")),
    responses((status = 200, description = "Wallet transactions")),
    tag = "Wallet"
)]
pub async fn wallet_transactions(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let transactions = state
        .services
        .wallets
        .transactions(producer.0, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(transactions)))
}

/// Platform wallet balance (admin only).
#[utoipa::path(
    get,
    path = "/api/v1/admin/wallet",
    responses((status = 200, description = "Platform wallet summary", body = crate::services::wallets::WalletSummaryResponse)),
    tag = "Admin"
)]
pub async fn platform_wallet(
    State(state): State<AppState>,
    _admin: AdminIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .wallets
        .platform_summary(&state.config.currency)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
