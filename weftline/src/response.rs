//! The response type (component part of C6) and [`IntoResponse`], the
//! conversion every handler return type and every extractor failure funnels
//! through before it reaches the connection's encoder.

use http::{HeaderValue, StatusCode};

use crate::body::Body;

pub type Response = http::Response<Body>;

/// Converts a value into an HTTP response. Implemented for the primitive
/// return types a handler is likely to produce directly, and for
/// `Result`/`Option` so a fallible handler doesn't need to build a
/// `Response` by hand on the error path.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::new(Body::Empty)
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::Empty);
        *resp.status_mut() = self;
        resp
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        text_response(self)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        text_response(self.to_string())
    }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from_bytes(self));
        resp.headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        resp
    }
}

impl IntoResponse for bytes::Bytes {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from_bytes(self));
        resp.headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        resp
    }
}

impl<T: serde::Serialize> IntoResponse for crate::extract::Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => {
                let mut resp = Response::new(Body::from_bytes(bytes));
                resp.headers_mut()
                    .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                resp
            }
            Err(e) => {
                tracing::error!("failed to serialize Json response: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(t) => t.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

impl<T: IntoResponse> IntoResponse for Option<T> {
    fn into_response(self) -> Response {
        match self {
            Some(t) => t.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

fn text_response(body: String) -> Response {
    let mut resp = Response::new(Body::from_bytes(body));
    resp.headers_mut()
        .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    resp
}

/// Build a plain status-code response with no body, used internally for the
/// framework's own error paths (404, 405, 413, 431, 500, ...).
pub(crate) fn status(code: StatusCode) -> Response {
    code.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_empty_200() {
        let resp = ().into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body().size_hint(), crate::body::BodySize::Empty);
    }

    #[test]
    fn result_err_uses_error_conversion() {
        let r: Result<&'static str, StatusCode> = Err(StatusCode::BAD_REQUEST);
        assert_eq!(r.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn option_none_is_404() {
        let o: Option<&'static str> = None;
        assert_eq!(o.into_response().status(), StatusCode::NOT_FOUND);
    }
}
