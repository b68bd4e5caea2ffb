use crate::models::chat::ErrorBody;
use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use thiserror::Error;

pub const MISSING_CREDENTIAL_MESSAGE: &str = "API key is required";
pub const RATE_LIMITED_MESSAGE: &str =
    "Rate limited. Please try again shortly or check your OpenRouter plan.";
pub const NO_RESPONSE_STREAM_MESSAGE: &str = "No response stream";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Every way a relay call can fail before the first byte is streamed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{}", MISSING_CREDENTIAL_MESSAGE)]
    MissingCredential,

    #[error("{}", RATE_LIMITED_MESSAGE)]
    RateLimited,

    #[error("API error ({status}): Failed to get response from AI service")]
    Upstream {
        status: u16,
    },

    #[error("{}", NO_RESPONSE_STREAM_MESSAGE)]
    NoResponseBody,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingCredential => StatusCode::BAD_REQUEST,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Upstream { status } =>
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            RelayError::NoResponseBody | RelayError::Internal(_) =>
                StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.public_message() };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RelayError::MissingCredential.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(RelayError::Upstream { status: 401 }.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(RelayError::Upstream { status: 42 }.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(RelayError::NoResponseBody.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = RelayError::Internal("connection refused at 10.0.0.3".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            RelayError::Upstream { status: 503 }.public_message(),
            "API error (503): Failed to get response from AI service"
        );
    }
}
