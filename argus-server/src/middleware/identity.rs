//! Caller identity extraction.
//!
//! The caller presents an identity token as `X-Account-Id: <uuid>`; a
//! missing or malformed header is rejected before any handler runs.
//! Whether the account exists and is active is admission's concern, not
//! this layer's.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use argus_model::AccountId;

use crate::errors::ApiError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Resolve the caller's account id into request extensions.
pub async fn identity_middleware(mut req: Request<Body>, next: Next) -> Response {
    let header = req
        .headers()
        .get(ACCOUNT_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    let Some(raw) = header else {
        return ApiError::unauthorized(
            "missing authentication header; provide X-Account-Id",
        )
        .into_response();
    };

    let Ok(account_id) = raw.parse::<AccountId>() else {
        return ApiError::unauthorized("invalid account id format")
            .into_response();
    };

    req.extensions_mut().insert(account_id);
    next.run(req).await
}
