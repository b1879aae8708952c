use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::security::CustomHeaderValidator;
use crate::utils::error::ApiError;

/// Guards merchant routes with the custom header check
pub async fn merchant_auth_middleware(
    State(validator): State<Arc<CustomHeaderValidator>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let validated = validator.validate(request.headers())?;

    debug!(
        "Merchant request authorized: app_id={}, timestamp={}",
        validated.app_id, validated.timestamp
    );

    Ok(next.run(request).await)
}
