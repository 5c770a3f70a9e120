//! Error types for the SafeSender service

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use safesender_relay::RelayError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed request data
    #[error("{0}")]
    BadRequest(String),

    /// Target is absent, whatever the reason
    #[error("{0}")]
    NotFound(&'static str),

    /// Sender must wait
    #[error("Please wait {retry_after_secs} seconds before sending another message")]
    RateLimited { retry_after_secs: u64 },

    /// Body or payload over the limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Relay has no room right now
    #[error("Relay is at capacity, try again later")]
    Unavailable,

    /// Anything else
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_time: Option<u64>,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ServiceError::Internal(detail) = self {
            tracing::error!("Internal error: {}", detail);
        }

        let mut builder = HttpResponse::build(self.status_code());
        let wait_time = match self {
            ServiceError::RateLimited { retry_after_secs } => {
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
                Some(*retry_after_secs)
            }
            _ => None,
        };

        builder.json(ErrorResponse {
            success: false,
            error: self.to_string(),
            wait_time,
        })
    }
}

impl From<RelayError> for ServiceError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidInput(msg) => ServiceError::BadRequest(msg),
            // one answer for every flavour of absence
            RelayError::NotFound | RelayError::AlreadyDelivered => {
                ServiceError::NotFound("Not found")
            }
            RelayError::RateLimited { retry_after_secs } => {
                ServiceError::RateLimited { retry_after_secs }
            }
            err @ RelayError::PayloadTooLarge { .. } => {
                ServiceError::PayloadTooLarge(err.to_string())
            }
            RelayError::StoreFull { .. } => ServiceError::Unavailable,
            RelayError::Config(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_absence_is_indistinguishable() {
        let a = ServiceError::from(RelayError::NotFound);
        let b = ServiceError::from(RelayError::AlreadyDelivered);
        assert_eq!(a.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RelayError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                RelayError::PayloadTooLarge { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                RelayError::StoreFull { size: 2, available: 1 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RelayError::RateLimited { retry_after_secs: 1 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServiceError::from(err).status_code(), status);
        }
    }

    #[actix_web::test]
    async fn test_rate_limited_body_and_header() {
        let resp = ServiceError::RateLimited { retry_after_secs: 4 }.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "4");

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["wait_time"], 4);
    }

    #[actix_web::test]
    async fn test_internal_detail_not_echoed() {
        let resp = ServiceError::Internal("lock state at 0xdead".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
