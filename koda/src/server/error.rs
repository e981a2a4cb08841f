use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kchat::{ChatError, ChatErrorKind};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A [`ChatError`] rendered without internal detail.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            ChatErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ChatErrorKind::Safety => StatusCode::SERVICE_UNAVAILABLE,
            ChatErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message a client may see.
    pub fn public_message(&self) -> String {
        match self.0.kind {
            ChatErrorKind::InvalidRequest => self.0.message.clone(),
            ChatErrorKind::Safety => "The service is temporarily unavailable. Please try again.".to_string(),
            ChatErrorKind::Store => "Internal server error".to_string(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(value: ChatError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                phase = "http",
                event = "request_failed",
                status = status.as_u16(),
                error_kind = self.0.kind.as_str(),
                error = %self.0
            );
        }

        (status, Json(ErrorBody { error: self.public_message() })).into_response()
    }
}
