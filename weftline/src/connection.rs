//! The connection state machine (component C12): accept a stream, decode one
//! request head at a time, dispatch it through the router, encode the
//! response, and either loop for the next request (keep-alive) or close.
//!
//! HTTP/1.x only -- no protocol detection, no HTTP/2 -- with the
//! decode-next-request-concurrently-with-send-this-response overlap that a
//! more aggressive pipeline might attempt (an `AccompanyPair`-style double
//! future) replaced by a plain sequential `fill_payload` call after the
//! response is flushed. This framework has no multiplexed transport to
//! justify that overlap's complexity; the simpler sequencing is easier to
//! reason about against `ServerConfig`'s timeout knobs.

use std::rc::Rc;

use futures::FutureExt;
use http::{header, HeaderValue, Method, StatusCode, Version};
use monoio::io::{AsyncReadRent, AsyncWriteRent, Split, Splitable};
use monoio_http::{
    common::body::{FixedBody, HttpBody},
    h1::codec::{
        decoder::{FillPayload, RequestDecoder},
        encoder::GenericEncoder,
    },
};
use tracing::{info, warn};

use weftline_core::{config::ServerConfig, listener::AcceptedAddr};

use crate::{
    body::Body,
    common::cancel::Waiter,
    error::FrameworkError,
    request::{prime_extensions, ConnInfo, Request},
    response::{IntoResponse, Response},
    router::{Lookup, RouterIndex},
};

/// Called when a handler panics or the exception hook the server was built
/// with chooses to report a [`FrameworkError::HandlerFailure`]-style error.
pub type ExceptionHandler = Rc<dyn Fn(anyhow::Error) -> Response>;

const CLOSE: &str = "close";
const KEEPALIVE: &str = "keep-alive";

/// Runs one accepted connection until the peer closes it, a configured
/// timeout fires, a request asks to close the connection, or `shutdown`
/// fires between two keep-alive requests.
pub async fn serve_connection<S>(
    stream: S,
    peer_addr: AcceptedAddr,
    local_addr: AcceptedAddr,
    router: Rc<RouterIndex>,
    config: Rc<ServerConfig>,
    exception_handler: ExceptionHandler,
    shutdown: Waiter,
) where
    S: Split + AsyncReadRent + AsyncWriteRent,
{
    let (reader, writer) = stream.into_split();
    let mut decoder = RequestDecoder::new(reader);
    let mut encoder = GenericEncoder::new(writer);
    decoder.set_timeout(Some(config.keep_alive_idle_timeout()));

    let conn = ConnInfo::new(peer_addr.clone(), local_addr);

    loop {
        if shutdown.cancelled() {
            info!("connection {:?} closing for graceful shutdown", peer_addr);
            break;
        }

        let decoded = match monoio::time::timeout(config.header_read_timeout(), decoder.next()).await {
            Ok(inner) => inner,
            Err(_) => {
                info!("connection {:?} timed out waiting for the next request head", peer_addr);
                break;
            }
        };

        let decoded_req = match decoded {
            Some(Ok(req)) => HttpBody::request(req),
            Some(Err(err)) => {
                warn!("connection {:?} sent a malformed request head: {err:?}", peer_addr);
                let resp = FrameworkError::RequestParse(format!("{err:?}")).into_response();
                let _ = send_response(&mut encoder, resp, &config, true).await;
                break;
            }
            None => break,
        };

        let (parts, http_body) = decoded_req.into_parts();
        let version = parts.version;
        let wants_close = client_wants_close(&parts.headers, version);
        let wants_continue = parts.headers.get(header::EXPECT).map(|v| v.as_bytes()) == Some(b"100-continue");
        let mut req: Request = http::Request::from_parts(parts, Body::Incoming(http_body));

        if wants_continue {
            let interim = http::Response::builder()
                .status(StatusCode::CONTINUE)
                .body(HttpBody::fixed_body(None))
                .expect("a bare 100-continue response always builds");
            if encoder.send_and_flush(interim).await.is_err() {
                break;
            }
        }

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let (resp, should_drain_body) = match router.lookup(&method, &path) {
            Lookup::Matched { route, params } => {
                req.extensions_mut().insert(params);
                prime_extensions(&mut req, conn.clone(), route.state.clone());
                (dispatch(route, req, &exception_handler).await, true)
            }
            Lookup::MethodNotAllowed { allow } => (method_not_allowed(&allow), false),
            Lookup::NotFound => (StatusCode::NOT_FOUND.into_response(), false),
        };

        // Any bytes the handler didn't read off the body must still be
        // drained so the decoder is positioned at the next request's head.
        if should_drain_body {
            match monoio::time::timeout(config.body_read_timeout(), decoder.fill_payload()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("connection {:?} failed to drain the request body: {err:?}", peer_addr);
                    break;
                }
                Err(_) => {
                    info!("connection {:?} timed out draining the request body", peer_addr);
                    break;
                }
            }
        }

        let close = wants_close || method == Method::CONNECT;
        match send_response(&mut encoder, resp, &config, close).await {
            Ok(()) => {}
            Err(err) => {
                warn!("connection {:?} write failed: {err}", peer_addr);
                break;
            }
        }

        if close {
            break;
        }
    }
}

async fn dispatch(
    route: &crate::route::FlatRoute,
    req: Request,
    exception_handler: &ExceptionHandler,
) -> Response {
    match std::panic::AssertUnwindSafe(route.service.call(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            exception_handler(anyhow::anyhow!(message))
        }
    }
}

pub(crate) fn method_not_allowed(allow: &[Method]) -> Response {
    let mut resp = StatusCode::METHOD_NOT_ALLOWED.into_response();
    let joined = allow.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&joined) {
        resp.headers_mut().insert(header::ALLOW, value);
    }
    resp
}

fn client_wants_close(headers: &http::HeaderMap, version: Version) -> bool {
    let connection = headers.get(header::CONNECTION).and_then(|v| v.to_str().ok());
    match connection {
        Some(v) if v.eq_ignore_ascii_case(CLOSE) => true,
        Some(v) if v.eq_ignore_ascii_case(KEEPALIVE) => false,
        _ => version == Version::HTTP_10,
    }
}

async fn send_response<W>(
    encoder: &mut GenericEncoder<W>,
    mut resp: Response,
    config: &ServerConfig,
    close: bool,
) -> std::io::Result<()>
where
    W: AsyncWriteRent,
{
    resp.headers_mut().insert(
        header::CONNECTION,
        HeaderValue::from_static(if close { CLOSE } else { KEEPALIVE }),
    );
    // `resp`'s body is handed to the encoder as-is: `Body` implements the
    // same streaming trait `HttpBody` does, so a `File`/`Incoming` body is
    // pulled one chunk at a time by the encoder's own `next_data` calls
    // rather than collected into one buffer here first.
    match monoio::time::timeout(config.write_timeout(), encoder.send_and_flush(resp)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(std::io::Error::new(std::io::ErrorKind::Other, format!("{err:?}"))),
        Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http10_without_keepalive_closes() {
        let headers = http::HeaderMap::new();
        assert!(client_wants_close(&headers, Version::HTTP_10));
    }

    #[test]
    fn http11_defaults_to_keepalive() {
        let headers = http::HeaderMap::new();
        assert!(!client_wants_close(&headers, Version::HTTP_11));
    }

    #[test]
    fn explicit_connection_close_overrides_version() {
        let mut headers = http::HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        assert!(client_wants_close(&headers, Version::HTTP_11));
    }

    #[test]
    fn explicit_keepalive_overrides_http10_default() {
        let mut headers = http::HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(!client_wants_close(&headers, Version::HTTP_10));
    }
}
