//! The extractor protocol (component C7): pulling typed values out of a
//! request inside a handler's argument list.
//!
//! Two traits split the work the way the request itself splits: most
//! extractors only need the request's metadata (`FromRequestParts`) and can
//! run in any order and any number of times; a handful need the body
//! (`FromRequest`) and can run at most once, since the body is a stream that
//! gets consumed. `FromRequest` has a blanket impl for every
//! `FromRequestParts`, so a handler's argument list can mix both freely as
//! long as at most one body-consuming extractor appears in it.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{
    body::Body,
    query::QueryMap,
    request::{take_body, ConnInfo, PathParams, Request},
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractorFailure {
    #[error("missing path parameter {0:?}")]
    MissingPathParam(String),
    #[error("path parameter {0:?} failed to parse: {1}")]
    InvalidPathParam(String, String),
    #[error("failed to parse query string: {0}")]
    InvalidQuery(String),
    #[error("missing or invalid header {0:?}")]
    InvalidHeader(String),
    #[error("the request body was already consumed by an earlier extractor")]
    BodyAlreadyConsumed,
    #[error("failed to read request body: {0}")]
    BodyRead(#[from] crate::body::BodyError),
    #[error("request body was not valid UTF-8")]
    InvalidUtf8,
    #[error("failed to parse body as JSON: {0}")]
    InvalidJson(String),
    #[error("failed to parse body as a form: {0}")]
    InvalidForm(String),
    #[error(transparent)]
    State(#[from] weftline_core::state::StateNotFound),
}

impl crate::response::IntoResponse for ExtractorFailure {
    fn into_response(self) -> crate::response::Response {
        use http::StatusCode;
        let status = match &self {
            ExtractorFailure::MissingPathParam(_) | ExtractorFailure::InvalidPathParam(..) => {
                StatusCode::BAD_REQUEST
            }
            ExtractorFailure::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ExtractorFailure::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            ExtractorFailure::BodyAlreadyConsumed => StatusCode::INTERNAL_SERVER_ERROR,
            ExtractorFailure::BodyRead(crate::body::BodyError::Decode(msg))
                if msg.contains("exceeded") =>
            {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ExtractorFailure::BodyRead(_) => StatusCode::BAD_REQUEST,
            ExtractorFailure::InvalidUtf8 => StatusCode::BAD_REQUEST,
            ExtractorFailure::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ExtractorFailure::InvalidForm(_) => StatusCode::BAD_REQUEST,
            ExtractorFailure::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut resp = crate::response::Response::new(Body::from_bytes(self.to_string()));
        *resp.status_mut() = status;
        resp
    }
}

/// Extracts a value from a request's metadata only (method, uri, headers,
/// extensions) -- never the body. Can run any number of times per request.
pub trait FromRequestParts: Sized {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure>;
}

/// Extracts a value from the full request, including (potentially) its
/// body. Runs exactly once per handler invocation per argument.
pub trait FromRequest: Sized {
    fn from_request(
        req: &mut Request,
    ) -> impl std::future::Future<Output = Result<Self, ExtractorFailure>>;
}

impl<T: FromRequestParts> FromRequest for T {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        T::from_request_parts(req)
    }
}

impl FromRequestParts for ConnInfo {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        Ok(req.extensions().get::<ConnInfo>().expect("ConnInfo primed by connection layer").clone())
    }
}

impl FromRequestParts for http::HeaderMap {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        Ok(req.headers().clone())
    }
}

/// A header whose value can be decoded into a concrete Rust type, keyed by
/// its wire name. Implement this for a marker type to make it usable with
/// [`TypedHeader`]; `http::HeaderValue` + `http::HeaderName` stay the raw
/// escape hatch for anything not worth a dedicated type.
pub trait Header: Sized {
    const NAME: http::HeaderName;

    fn decode(value: &http::HeaderValue) -> Result<Self, ExtractorFailure>;
}

/// A single typed, required header, looked up by `T::NAME` and decoded with
/// `T::decode`.
pub struct TypedHeader<T>(pub T);

impl<T: Header> FromRequestParts for TypedHeader<T> {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        let value = req
            .headers()
            .get(T::NAME)
            .ok_or_else(|| ExtractorFailure::InvalidHeader(T::NAME.to_string()))?;
        T::decode(value).map(TypedHeader)
    }
}

/// The route's matched path parameters, raw (not yet percent-decoded). See
/// [`Path<T>`] for the common case of pulling a single named, typed
/// parameter out instead.
impl FromRequestParts for PathParams {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        Ok(req.extensions().get::<PathParams>().cloned().unwrap_or_default())
    }
}

/// The route's single captured path parameter, percent-decoded and parsed
/// with `T::from_str`. For routes that capture more than one segment, use
/// [`PathParams`] directly and look values up by name.
pub struct Path<T>(pub T);

impl<T> FromRequestParts for Path<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        let params = req.extensions().get::<PathParams>().cloned().unwrap_or_default();
        let (name, raw) = params
            .0
            .first()
            .ok_or_else(|| ExtractorFailure::MissingPathParam("<none captured>".into()))?;
        let decoded = percent_encoding::percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| ExtractorFailure::InvalidPathParam(name.clone(), "not valid UTF-8".into()))?;
        decoded
            .parse::<T>()
            .map(Path)
            .map_err(|e| ExtractorFailure::InvalidPathParam(name.clone(), e.to_string()))
    }
}

/// The full parsed query string, as an order-preserving multimap.
impl FromRequestParts for QueryMap {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        Ok(QueryMap::parse(req.uri().query().unwrap_or("")))
    }
}

/// Deserializes the query string into `T` via `serde` (one value per key;
/// repeated keys are not supported by this path -- use [`QueryMap`]
/// directly for that).
pub struct Query<T>(pub T);

impl<T: DeserializeOwned> FromRequestParts for Query<T> {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        let query = req.uri().query().unwrap_or("");
        urlencoded::from_str(query).map(Query).map_err(ExtractorFailure::InvalidQuery)
    }
}

/// Application state registered on the route or one of its enclosing
/// scopes via the builder's `.state(value)`. Looked up by `T`'s type, not by
/// name -- register at most one value of a given type per scope chain.
pub struct State<T>(pub T);

impl<T: Clone + Send + Sync + 'static> FromRequestParts for State<T> {
    fn from_request_parts(req: &Request) -> Result<Self, ExtractorFailure> {
        let layers = req
            .extensions()
            .get::<weftline_core::state::StateLayers>()
            .expect("StateLayers primed by the router");
        layers.try_get::<T>().cloned().map(State).map_err(Into::into)
    }
}

/// The buffered request body as raw bytes. The connection layer enforces
/// `ServerConfig::max_body_bytes` while filling the decoder, so no separate
/// limit is threaded through here.
impl FromRequest for Bytes {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        let mut body = take_body(req)?;
        body.collect(None).await.map_err(Into::into)
    }
}

/// The buffered request body decoded as UTF-8.
impl FromRequest for String {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        let bytes = Bytes::from_request(req).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ExtractorFailure::InvalidUtf8)
    }
}

/// The request body, deserialized as JSON.
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> FromRequest for Json<T> {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        let bytes = Bytes::from_request(req).await?;
        serde_json::from_slice(&bytes).map(Json).map_err(|e| ExtractorFailure::InvalidJson(e.to_string()))
    }
}

/// The request body, deserialized as `application/x-www-form-urlencoded`.
pub struct Form<T>(pub T);

impl<T: DeserializeOwned> FromRequest for Form<T> {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        let bytes = Bytes::from_request(req).await?;
        let text = std::str::from_utf8(&bytes).map_err(|_| ExtractorFailure::InvalidUtf8)?;
        urlencoded::from_str(text).map(Form).map_err(ExtractorFailure::InvalidForm)
    }
}

/// The request body as a live stream, for handlers that want to process
/// chunks as they arrive instead of buffering the whole thing.
pub struct BodyStream(pub Body);

impl FromRequest for BodyStream {
    async fn from_request(req: &mut Request) -> Result<Self, ExtractorFailure> {
        take_body(req).map(BodyStream)
    }
}

/// A minimal `application/x-www-form-urlencoded` / query-string deserializer
/// built on `form_urlencoded` + `serde`'s `value::MapDeserializer`, covering
/// the flat `struct { field: String }`-shaped types this crate's extractors
/// target (nested structures are out of scope, matching `serde_urlencoded`'s
/// own documented limits).
mod urlencoded {
    use serde::de::value::MapDeserializer;

    pub(crate) fn from_str<T: serde::de::DeserializeOwned>(input: &str) -> Result<T, String> {
        let pairs: Vec<(String, String)> =
            form_urlencoded::parse(input.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        let deserializer = MapDeserializer::<_, serde::de::value::Error>::new(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        T::deserialize(deserializer).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req_with_path(uri: &str, params: Vec<(&str, &str)>) -> Request {
        let mut req = http::Request::builder().uri(uri).body(Body::Empty).unwrap();
        req.extensions_mut().insert(PathParams(
            params.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        ));
        req
    }

    #[test]
    fn path_decodes_and_parses() {
        let req = req_with_path("/users/42", vec![("id", "42")]);
        let Path(id) = Path::<u32>::from_request_parts(&req).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn path_percent_decodes_before_parsing() {
        let req = req_with_path("/greet/hi", vec![("name", "hi%20there")]);
        let Path(name) = Path::<String>::from_request_parts(&req).unwrap();
        assert_eq!(name, "hi there");
    }

    #[test]
    fn query_map_parses_from_uri() {
        let req = http::Request::builder().uri("/search?q=rust&page=2").body(Body::Empty).unwrap();
        let q = QueryMap::from_request_parts(&req).unwrap();
        assert_eq!(q.get("q"), Some("rust"));
        assert_eq!(q.get("page"), Some("2"));
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct SearchParams {
        q: String,
        page: u32,
    }

    #[test]
    fn query_deserializes_into_struct() {
        let req = http::Request::builder().uri("/search?q=rust&page=2").body(Body::Empty).unwrap();
        let Query(params) = Query::<SearchParams>::from_request_parts(&req).unwrap();
        assert_eq!(params, SearchParams { q: "rust".into(), page: 2 });
    }

    #[monoio::test]
    async fn bytes_extractor_consumes_body_once() {
        let mut req = http::Request::builder().body(Body::from_bytes("hello")).unwrap();
        let bytes = Bytes::from_request(&mut req).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        let second = Bytes::from_request(&mut req).await;
        assert!(matches!(second, Err(ExtractorFailure::BodyAlreadyConsumed)));
    }

    #[monoio::test]
    async fn json_extractor_parses_body() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Payload {
            name: String,
        }
        let mut req =
            http::Request::builder().body(Body::from_bytes(r#"{"name":"ana"}"#)).unwrap();
        let Json(payload) = Json::<Payload>::from_request(&mut req).await.unwrap();
        assert_eq!(payload, Payload { name: "ana".into() });
    }
}
