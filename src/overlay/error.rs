use axum::http::StatusCode;
use thiserror::Error;

/// Failures of a single overlay request. Every variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("request body must be a JSON object: {0}")]
    InvalidBody(String),
    #[error("failed to fetch image: {0}")]
    Fetch(String),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to render overlay: {0}")]
    Render(String),
    #[error("delegated rendering failed: {0}")]
    Delegation(String),
}

impl OverlayError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OverlayError::MissingField(_)
            | OverlayError::InvalidField { .. }
            | OverlayError::InvalidBody(_)
            | OverlayError::Fetch(_)
            | OverlayError::Decode(_) => StatusCode::BAD_REQUEST,
            OverlayError::Delegation(_) => StatusCode::BAD_GATEWAY,
            OverlayError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = OverlayError::MissingField("img_url");
        assert_eq!(err.to_string(), "img_url is required");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_failures_are_not_client_errors() {
        assert_eq!(
            OverlayError::Delegation("503".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            OverlayError::Render("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
