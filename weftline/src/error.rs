//! The error taxonomy: every typed failure surface the connection state
//! machine can hit, and how each converts to a response (or a silent close)
//! without ever leaking an internal detail onto the wire.
//!
//! [`crate::extract::ExtractorFailure`] is the one taxonomy row handled
//! entirely inside the handler adapter (it never reaches this enum); every
//! other row here is raised by [`crate::connection`].

use http::StatusCode;

use crate::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("malformed request head: {0}")]
    RequestParse(String),
    #[error("request head exceeded the configured {0}-byte limit")]
    HeaderTooLarge(usize),
    #[error("request body exceeded the configured {0}-byte limit")]
    BodyTooLarge(u64),
    #[error("timed out waiting to read the request")]
    ReadTimeout,
    #[error("timed out writing the response")]
    WriteTimeout,
    #[error("an unhandled error escaped the handler chain: {0}")]
    HandlerFailure(#[from] anyhow::Error),
    #[error("the request body ended before its declared Content-Length")]
    StreamPrematureEnd,
    #[error("the peer closed the connection")]
    ClientDisconnect,
}

impl FrameworkError {
    /// Whether this error, once answered, should still attempt to keep the
    /// connection alive. A `ReadTimeout` in practice always precedes a
    /// connection already past usefulness, so this framework closes after
    /// every `FrameworkError` response.
    pub fn should_close(&self) -> bool {
        true
    }
}

impl IntoResponse for FrameworkError {
    fn into_response(self) -> Response {
        let status = match &self {
            FrameworkError::RequestParse(_) => StatusCode::BAD_REQUEST,
            FrameworkError::HeaderTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            FrameworkError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            FrameworkError::ReadTimeout => StatusCode::REQUEST_TIMEOUT,
            FrameworkError::WriteTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            FrameworkError::HandlerFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FrameworkError::StreamPrematureEnd => StatusCode::BAD_REQUEST,
            FrameworkError::ClientDisconnect => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut resp = plain_text(status, self.to_string());
        *resp.status_mut() = status;
        resp
    }
}

fn plain_text(status: StatusCode, body: String) -> Response {
    let mut resp = Response::new(crate::body::Body::from_bytes(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain; charset=utf-8"));
    resp
}

/// The default `HandlerFailure` policy: log and answer `500`, installed
/// unless the server builder is given an override via
/// `Builder::set_exception_handler`.
pub fn default_exception_handler(err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "unhandled error escaped the handler chain");
    FrameworkError::HandlerFailure(err).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_too_large_maps_to_431() {
        let resp = FrameworkError::HeaderTooLarge(8192).into_response();
        assert_eq!(resp.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
    }

    #[test]
    fn body_too_large_maps_to_413() {
        let resp = FrameworkError::BodyTooLarge(1024).into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn read_timeout_maps_to_408() {
        let resp = FrameworkError::ReadTimeout.into_response();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
