use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{auth::BuyerIdentity, errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Replace the line's quantity instead of accumulating.
    #[serde(default)]
    pub replace: bool,
}

fn default_quantity() -> i32 {
    1
}

/// The current buyer's cart with product details.
#[utoipa::path(
    get,
    path = "/api/v1/carts",
    responses((status = 200, description = "Cart contents")),
    tag = "Carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(buyer.0).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a product to the cart or adjust an existing line.
#[utoipa::path(
    post,
    path = "/api/v1/carts/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Cart line upserted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_item(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .carts
        .add_item(buyer.0, request.product_id, request.quantity, request.replace)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Remove a product line from the cart.
#[utoipa::path(
    delete,
    path = "/api/v1/carts/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses((status = 200, description = "Line removed")),
    tag = "Carts"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.remove_item(buyer.0, product_id).await?;
    Ok(Json(ApiResponse::success("Removed from cart")))
}
