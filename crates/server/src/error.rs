//! Error kind → HTTP status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use voicebridge_dialog::DialogError;
use voicebridge_media::MediaError;
use voicebridge_webhook::WebhookError;

/// An error ready to leave the API boundary.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        let status = match &err {
            MediaError::RoomNotFound(_)
            | MediaError::PeerNotFound(_)
            | MediaError::TrackNotFound(_)
            | MediaError::SubscriptionNotFound
            | MediaError::NoLayersAvailable => StatusCode::NOT_FOUND,
            MediaError::RoomExists(_) | MediaError::RoomClosed(_) => StatusCode::CONFLICT,
            MediaError::RoomFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            MediaError::E2eeMissing | MediaError::E2eeNoAlgorithm => StatusCode::BAD_REQUEST,
            MediaError::TrackEnded | MediaError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<DialogError> for ApiError {
    fn from(err: DialogError) -> Self {
        let status = match &err {
            DialogError::DialogNotFound(_)
            | DialogError::SessionNotFound(_)
            | DialogError::StateNotFound { .. } => StatusCode::NOT_FOUND,
            DialogError::SessionExists(_) => StatusCode::CONFLICT,
            DialogError::Validation { .. }
            | DialogError::Template(_)
            | DialogError::UnsupportedEvent(_)
            | DialogError::HookUrl(_) => StatusCode::BAD_REQUEST,
            DialogError::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
            DialogError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            DialogError::SessionEnded
            | DialogError::Io { .. }
            | DialogError::Parse { .. }
            | DialogError::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        let status = match &err {
            WebhookError::EndpointNotFound(_) | WebhookError::DeadLetterNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            WebhookError::NotReplayable(_) => StatusCode::CONFLICT,
            WebhookError::InvalidEnvelope(_) | WebhookError::Url(_) => StatusCode::BAD_REQUEST,
            WebhookError::Publish(_) | WebhookError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_mapping() {
        let err: ApiError = MediaError::RoomNotFound("r".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err: ApiError = MediaError::RoomExists("r".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        let err: ApiError = MediaError::RoomFull {
            id: "r".into(),
            count: 1,
            max: 1,
        }
        .into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_dialog_error_mapping() {
        let err: ApiError = DialogError::DeadlineExceeded.into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
        let err: ApiError = DialogError::Busy("speech").into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        let err: ApiError = DialogError::SessionExists("s".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
