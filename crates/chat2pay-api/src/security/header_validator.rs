use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::CustomHeadersConfig;
use crate::utils::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_APP_ID: &str = "X-App-ID";
pub const HEADER_API_KEY: &str = "X-API-Key";
pub const HEADER_TIMESTAMP: &str = "X-Request-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Request-Signature";

/// Shared-secret header check for merchant-side routes.
///
/// Requires `X-App-ID`, `X-API-Key` and a unix `X-Request-Timestamp` within
/// tolerance. With signatures enabled, `X-Request-Signature` must be
/// hex HMAC-SHA256(api_key, app_id + timestamp).
#[derive(Debug, Clone)]
pub struct CustomHeaderValidator {
    app_id: String,
    api_key: String,
    signature_enabled: bool,
    timestamp_tolerance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub app_id: String,
    pub timestamp: i64,
}

impl CustomHeaderValidator {
    pub fn new(app_id: String, api_key: String, signature_enabled: bool, timestamp_tolerance: i64) -> Self {
        Self {
            app_id,
            api_key,
            signature_enabled,
            timestamp_tolerance,
        }
    }

    pub fn from_config(config: &CustomHeadersConfig) -> Self {
        Self::new(
            config.app_id.clone(),
            config.api_key.clone(),
            config.request_signature.eq_ignore_ascii_case("enabled"),
            config.timestamp_tolerance,
        )
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<ValidatedRequest, ApiError> {
        let app_id = header(headers, HEADER_APP_ID)?;
        if app_id != self.app_id {
            warn!("Rejected request with unknown app id {}", app_id);
            return Err(ApiError::Unauthorized("Invalid X-App-ID".to_string()));
        }

        let api_key = header(headers, HEADER_API_KEY)?;
        if api_key != self.api_key {
            warn!("Rejected request with invalid API key for app {}", app_id);
            return Err(ApiError::Unauthorized("Invalid X-API-Key".to_string()));
        }

        let timestamp = header(headers, HEADER_TIMESTAMP)?
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized("Invalid X-Request-Timestamp header".to_string()))?;

        let skew = (Utc::now().timestamp() - timestamp).abs();
        if skew > self.timestamp_tolerance {
            warn!("Request timestamp skew {}s exceeds tolerance", skew);
            return Err(ApiError::Unauthorized(
                "Request timestamp out of tolerance window".to_string(),
            ));
        }

        if self.signature_enabled {
            let signature = header(headers, HEADER_SIGNATURE)?;
            self.verify_signature(app_id, timestamp, signature)?;
        }

        debug!("Merchant headers validated for app {}", app_id);

        Ok(ValidatedRequest {
            app_id: app_id.to_string(),
            timestamp,
        })
    }

    fn mac(&self, app_id: &str, timestamp: i64) -> Result<HmacSha256, ApiError> {
        let mut mac = HmacSha256::new_from_slice(self.api_key.as_bytes())
            .map_err(|e| ApiError::InternalError(format!("HMAC error: {}", e)))?;
        mac.update(format!("{}{}", app_id, timestamp).as_bytes());
        Ok(mac)
    }

    fn verify_signature(&self, app_id: &str, timestamp: i64, signature: &str) -> Result<(), ApiError> {
        let provided = hex::decode(signature.trim())
            .map_err(|_| ApiError::Unauthorized("Invalid signature".to_string()))?;

        self.mac(app_id, timestamp)?
            .verify_slice(&provided)
            .map_err(|_| {
                warn!("Invalid request signature for app {}", app_id);
                ApiError::Unauthorized("Invalid signature".to_string())
            })
    }

    /// Signature a client must send for `timestamp`
    pub fn generate_signature(&self, app_id: &str, timestamp: i64) -> Result<String, ApiError> {
        Ok(hex::encode(self.mac(app_id, timestamp)?.finalize().into_bytes()))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", name)))
}
