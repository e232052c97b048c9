//! Pesto - HTTP responses and error mapping

use std::convert::Infallible;
use std::time::Duration;

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};
use warp::Rejection;

use crate::clipboard::ServiceError;

/// Error payload
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Payload answered by a successful delete
#[derive(Debug, Serialize)]
pub struct DeletedBody {
    pub id: i64,
    pub deleted: bool,
}

/// Request-level error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Request timed out after {0:?}")]
    DeadlineExceeded(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        json(&ErrorBody { error: self.to_string() }, status)
    }
}

/// Serialize `value` with the given status
pub fn json<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

/// Answer a handler result, using `status` on success
pub fn respond<T: Serialize>(result: Result<T, ApiError>, status: StatusCode) -> Response {
    match result {
        Ok(value) => json(&value, status),
        Err(e) => e.into_response(),
    }
}

/// Turn warp's own rejections into JSON errors
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(json(&ErrorBody { error: message }, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (ApiError::BadRequest("id".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Validation("content".into()).into(), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("item".into()).into(), StatusCode::NOT_FOUND),
            (ServiceError::from(StoreError::Io(std::io::Error::other("disk"))).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::DeadlineExceeded(Duration::from_millis(5)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn store_not_found_becomes_not_found() {
        let err: ApiError = ServiceError::from(StoreError::NotFound).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
