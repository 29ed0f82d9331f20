use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{BuyerIdentity, ProducerIdentity},
    entities::push_token::{self, Audience, Entity as PushTokenEntity},
    errors::ServiceError,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterPushTokenRequest {
    #[validate(length(min = 8, message = "Device token is required"))]
    pub token: String,
}

async fn register(
    state: &AppState,
    audience: Audience,
    owner_id: Uuid,
    request: RegisterPushTokenRequest,
) -> Result<push_token::Model, ServiceError> {
    request.validate()?;

    // Re-registering the same token is a no-op
    if let Some(existing) = PushTokenEntity::find()
        .filter(push_token::Column::Audience.eq(audience))
        .filter(push_token::Column::OwnerId.eq(owner_id))
        .filter(push_token::Column::Token.eq(request.token.clone()))
        .one(&*state.db)
        .await?
    {
        return Ok(existing);
    }

    let model = push_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        audience: Set(audience),
        owner_id: Set(owner_id),
        token: Set(request.token),
        created_at: Set(Utc::now()),
    };
    Ok(model.insert(&*state.db).await?)
}

/// Register a buyer device token for order-status notifications.
#[utoipa::path(
    post,
    path = "/api/v1/push/tokens",
    request_body = RegisterPushTokenRequest,
    responses(
        (status = 201, description = "Token registered"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Push"
)]
pub async fn register_buyer_token(
    State(state): State<AppState>,
    buyer: BuyerIdentity,
    Json(request): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = register(&state, Audience::Buyer, buyer.0, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(token))))
}

/// Register a producer device token for new-order notifications.
#[utoipa::path(
    post,
    path = "/api/v1/producer/push/tokens",
    request_body = RegisterPushTokenRequest,
    responses(
        (status = 201, description = "Token registered"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Push"
)]
pub async fn register_producer_token(
    State(state): State<AppState>,
    producer: ProducerIdentity,
    Json(request): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = register(&state, Audience::Producer, producer.0, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(token))))
}
