use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logbook_core::error::LogbookError;
use serde_json::json;

/// Maps engine errors onto HTTP statuses. Server-side failures are logged
/// in full and answered with a generic body.
#[derive(Debug)]
pub struct ApiError(pub LogbookError);

impl From<LogbookError> for ApiError {
    fn from(err: LogbookError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LogbookError::NotFound(_) => StatusCode::NOT_FOUND,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let status = |e| ApiError(e).status();
        assert_eq!(status(LogbookError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(LogbookError::Parse("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(LogbookError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(LogbookError::Store("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn server_errors_hide_details() {
        let res = ApiError(LogbookError::Store("duckdb: file locked".into())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
