//! Extract identity claims from the `Authorization: Bearer` header.

use crate::identity::{Claims, TokenVerifier};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

/// Extractor for optional bearer claims. Missing, unverifiable or expired tokens yield `None`.
#[derive(Clone, Debug)]
pub struct BearerClaims(pub Option<Claims>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerClaims
where
    S: Send + Sync,
    TokenVerifier: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
            .and_then(|s: &str| {
                s.strip_prefix("Bearer ")
                    .or_else(|| s.strip_prefix("bearer "))
            });
        let claims = match token {
            Some(token) => TokenVerifier::from_ref(state).decode(token),
            None => None,
        };
        Ok(BearerClaims(claims))
    }
}
