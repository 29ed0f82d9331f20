use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    auth::BuyerIdentity, errors::ServiceError, services::addresses::CreateAddressRequest,
    ApiResponse, AppState,
};

/// The current buyer's address book, default address first.
#[utoipa::path(
    get,
    path = "/api/v1/addresses",
    responses((status = 200, description = "Addresses")),
    tag = "Addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state.services.addresses.list(buyer.0).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

/// Add a delivery address.
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    request_body = CreateAddressRequest,
    responses(
        (status = 201, description = "Address created"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn create_address(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<CreateAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state.services.addresses.create(buyer.0, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(address))))
}
