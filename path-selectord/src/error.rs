use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failure to obtain an export from the aggregator
#[derive(Debug, thiserror::Error)]
pub enum ExportFetchError {
    #[error("request to aggregator failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("aggregator returned status code {0}")]
    Status(u16),
    #[error("malformed aggregator response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("aggregator reported failure: {0}")]
    Rejected(String),
}

/// Everything a routing request can fail with
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("{0}")]
    Validation(String),
    #[error("no qualifying instance of {0}: every instance exceeds the cost or delay limit")]
    NoQualifyingInstance(String),
    #[error("service instance data unavailable: {0}")]
    DataUnavailable(#[source] ExportFetchError),
    #[error("{0}")]
    Unauthorized(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl SelectError {
    pub fn status(&self) -> StatusCode {
        match self {
            SelectError::Validation(_) => StatusCode::BAD_REQUEST,
            SelectError::NoQualifyingInstance(_) => StatusCode::FORBIDDEN,
            SelectError::DataUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SelectError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for SelectError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
