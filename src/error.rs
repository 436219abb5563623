use std::time::Duration;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the planning pipeline, the stores and the account layer.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Transport-level failure reaching an external endpoint.
    #[error("network error reaching {endpoint}: {detail}")]
    Network {
        endpoint: &'static str,
        detail: String,
    },

    /// Missing or rejected credentials for the LLM, the store or a user.
    #[error("authentication failed for {endpoint}: {detail}")]
    Auth {
        endpoint: &'static str,
        detail: String,
    },

    /// Non-success answer from an external endpoint.
    #[error("{endpoint} responded with {status}: {detail}")]
    Upstream {
        endpoint: &'static str,
        status: String,
        detail: String,
    },

    /// Model output that could not be turned into a plan, even after repair.
    #[error("could not parse itinerary from model output: {reason}")]
    MalformedResponse { reason: String, excerpt: String },

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The fetch guard throttled a list refresh.
    #[error("list refresh requested too frequently")]
    RateLimited,

    #[error("local plan cache is corrupt: {0}")]
    CacheCorruption(String),

    #[error("local plan cache I/O failed: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PlannerError {
    pub fn validation(message: impl Into<String>) -> Self {
        PlannerError::Validation(vec![message.into()])
    }

    /// Whether the caller may simply try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlannerError::Network { .. }
                | PlannerError::Upstream { .. }
                | PlannerError::MalformedResponse { .. }
                | PlannerError::RateLimited
                | PlannerError::TimedOut(_)
        )
    }

    /// Message shown to an end user; generation failures ask for a retry.
    pub fn user_message(&self) -> String {
        match self {
            PlannerError::MalformedResponse { .. } => {
                "The itinerary could not be generated. Please try again.".to_string()
            }
            PlannerError::Network { .. }
            | PlannerError::Upstream { .. }
            | PlannerError::TimedOut(_) => {
                format!("{}. Please try again.", self)
            }
            _ => self.to_string(),
        }
    }
}

impl From<mongodb::error::Error> for PlannerError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match *err.kind {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => PlannerError::Network {
                endpoint: "plan store",
                detail: err.to_string(),
            },
            ErrorKind::Authentication { .. } => PlannerError::Auth {
                endpoint: "plan store",
                detail: err.to_string(),
            },
            _ => PlannerError::Upstream {
                endpoint: "plan store",
                status: "error".to_string(),
                detail: err.to_string(),
            },
        }
    }
}

impl From<bson::ser::Error> for PlannerError {
    fn from(err: bson::ser::Error) -> Self {
        PlannerError::Upstream {
            endpoint: "plan store",
            status: "serialization".to_string(),
            detail: err.to_string(),
        }
    }
}

impl ResponseError for PlannerError {
    fn status_code(&self) -> StatusCode {
        match self {
            PlannerError::Validation(_) => StatusCode::BAD_REQUEST,
            PlannerError::NotFound(_) => StatusCode::NOT_FOUND,
            PlannerError::Conflict(_) => StatusCode::CONFLICT,
            PlannerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PlannerError::Auth { endpoint, .. } if *endpoint == "account" => {
                StatusCode::UNAUTHORIZED
            }
            PlannerError::Auth { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PlannerError::Network { .. }
            | PlannerError::Upstream { .. }
            | PlannerError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
            PlannerError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            PlannerError::CacheCorruption(_)
            | PlannerError::CacheIo(_)
            | PlannerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.user_message(),
            "retryable": self.is_retryable(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_response_is_retryable_gateway_error() {
        let err = PlannerError::MalformedResponse {
            reason: "expected value".to_string(),
            excerpt: "not json".to_string(),
        };

        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.user_message().contains("try again"));
    }

    #[test]
    fn test_account_auth_maps_to_unauthorized() {
        let account = PlannerError::Auth {
            endpoint: "account",
            detail: "bad password".to_string(),
        };
        let llm = PlannerError::Auth {
            endpoint: "llm",
            detail: "missing key".to_string(),
        };

        assert_eq!(account.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(llm.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!llm.is_retryable());
    }

    #[test]
    fn test_validation_message_joins_all_problems() {
        let err = PlannerError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}
