use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

/// The kind of principal a bearer token represents. Route groups admit
/// exactly one actor kind each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Buyer,
    Producer,
    Admin,
}

/// JWT claims carried by every actor token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id (buyer, producer or admin id)
    pub sub: String,
    pub actor: Actor,
    pub iat: i64,
    pub exp: i64,
}

/// Issues an HS256 bearer token for the given actor. Used by operational
/// tooling and the test harness; this service verifies tokens, it does not
/// run a login flow.
pub fn issue_token(
    secret: &str,
    actor: Actor,
    subject: Uuid,
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        actor,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to issue token: {e}")))
}

/// Verifies a bearer token and returns its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ServiceError::Unauthorized("invalid or expired token".to_string()))
}

fn bearer_claims(parts: &Parts, state: &AppState) -> Result<Claims, ServiceError> {
    let header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Unauthorized("malformed authorization header".to_string()))?;

    verify_token(&state.config.jwt_secret, token)
}

fn subject_id(claims: &Claims) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::Unauthorized("malformed token subject".to_string()))
}

/// Authenticated buyer identity.
#[derive(Debug, Clone, Copy)]
pub struct BuyerIdentity(pub Uuid);

/// Authenticated producer identity.
#[derive(Debug, Clone, Copy)]
pub struct ProducerIdentity(pub Uuid);

/// Authenticated admin identity.
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity(pub Uuid);

macro_rules! actor_extractor {
    ($ident:ident, $actor:expr, $label:literal) => {
        #[async_trait]
        impl<S> FromRequestParts<S> for $ident
        where
            AppState: FromRef<S>,
            S: Send + Sync,
        {
            type Rejection = ServiceError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let state = AppState::from_ref(state);
                let claims = bearer_claims(parts, &state)?;
                if claims.actor != $actor {
                    return Err(ServiceError::Forbidden(format!(
                        "{} access required",
                        $label
                    )));
                }
                Ok($ident(subject_id(&claims)?))
            }
        }
    };
}

actor_extractor!(BuyerIdentity, Actor::Buyer, "buyer");
actor_extractor!(ProducerIdentity, Actor::Producer, "producer");
actor_extractor!(AdminIdentity, Actor::Admin, "admin");

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

    #[test]
    fn issued_tokens_round_trip() {
        let id = Uuid::new_v4();
        let token = issue_token(SECRET, Actor::Producer, id, Duration::hours(1)).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.actor, Actor::Producer);
        assert_eq!(claims.sub, id.to_string());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            issue_token(SECRET, Actor::Buyer, Uuid::new_v4(), Duration::hours(1)).unwrap();
        assert!(verify_token("another_secret_key_that_is_long_enough", &token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token =
            issue_token(SECRET, Actor::Buyer, Uuid::new_v4(), Duration::seconds(-120)).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }
}
