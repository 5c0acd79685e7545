//! The async readable body stream (component C5).
//!
//! Every request and response body in this crate is a [`Body`], a small enum
//! over the shapes a handler actually produces: nothing, a buffer already in
//! memory, a file read lazily off disk, or bytes still arriving off the wire.
//! `Body` is deliberately not a trait object -- the four shapes cover every
//! producer in this codebase and avoid a `Box<dyn Stream>` on the hot path.

use std::io;

use bytes::Bytes;
use monoio::fs::File;
use monoio_http::common::body::{Body as HttpBodyTrait, HttpBody, StreamHint};
use thiserror::Error;

/// What a caller can know about a body's length before reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySize {
    /// The body carries no bytes (e.g. `GET` requests, `204` responses).
    Empty,
    /// The exact byte length is known up front (buffered or file bodies).
    Sized(u64),
    /// The length is not known ahead of time (chunked/streamed bodies).
    Unsized,
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("io error reading body: {0}")]
    Io(#[from] io::Error),
    #[error("upstream decode error: {0}")]
    Decode(String),
}

/// A concrete request/response body.
///
/// `Body::Incoming` wraps the body half of a decoded connection request --
/// reading from it drives the same `monoio_http` decoder the connection
/// state machine is already polling for headers, so extractors that consume
/// the body do not duplicate that decode logic.
pub enum Body {
    Empty,
    Buf(Bytes),
    File { file: File, len: u64, pos: u64 },
    Incoming(HttpBody),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Body::Empty
        } else {
            Body::Buf(bytes)
        }
    }

    pub fn from_file(file: File, len: u64) -> Self {
        Body::File { file, len, pos: 0 }
    }

    pub fn size_hint(&self) -> BodySize {
        match self {
            Body::Empty => BodySize::Empty,
            Body::Buf(b) => BodySize::Sized(b.len() as u64),
            Body::File { len, .. } => BodySize::Sized(*len),
            Body::Incoming(b) => match b.stream_hint() {
                StreamHint::None => BodySize::Empty,
                StreamHint::Fixed => BodySize::Unsized,
                StreamHint::Stream => BodySize::Unsized,
            },
        }
    }

    /// Pull the next chunk of the body, or `None` once it is fully consumed.
    ///
    /// Extractors that buffer the whole body (`Bytes`, `String`, `Json<T>`,
    /// `Form<T>`) call this in a loop; [`crate::extract::BodyStream`] exposes
    /// it directly for callers that want to stream.
    pub async fn data(&mut self) -> Option<Result<Bytes, BodyError>> {
        match self {
            Body::Empty => None,
            Body::Buf(b) => {
                if b.is_empty() {
                    None
                } else {
                    Some(Ok(std::mem::take(b)))
                }
            }
            Body::File { file, len, pos } => {
                if *pos >= *len {
                    return None;
                }
                const CHUNK: u64 = 64 * 1024;
                let remaining = *len - *pos;
                let want = remaining.min(CHUNK) as usize;
                let buf = Vec::with_capacity(want);
                let (res, buf) = file.read_at(buf, *pos).await;
                match res {
                    Ok(0) => None,
                    Ok(n) => {
                        *pos += n as u64;
                        Some(Ok(Bytes::from(buf)))
                    }
                    Err(e) => Some(Err(e.into())),
                }
            }
            Body::Incoming(b) => match b.next_data().await {
                Some(Ok(bytes)) => Some(Ok(bytes)),
                Some(Err(e)) => Some(Err(BodyError::Decode(format!("{e:?}")))),
                None => None,
            },
        }
    }

    /// Buffer the whole body into memory, honoring an optional cap (the
    /// connection's configured `max_body_bytes`).
    pub async fn collect(&mut self, limit: Option<u64>) -> Result<Bytes, BodyError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.data().await {
            let chunk = chunk?;
            if let Some(limit) = limit {
                if out.len() as u64 + chunk.len() as u64 > limit {
                    return Err(BodyError::Decode("body exceeded configured limit".into()));
                }
            }
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }
}

impl From<HttpBody> for Body {
    fn from(body: HttpBody) -> Self {
        Body::Incoming(body)
    }
}

/// Lets the connection's `GenericEncoder` write a [`Body`] directly --
/// `File` and `Incoming` bodies are pulled chunk by chunk through
/// [`Body::data`] exactly as [`Body::collect`] does, except the encoder
/// drives that pull itself (one chunk per `next_data` call) instead of this
/// crate materializing the whole thing into one `Bytes` up front. Only a
/// body whose [`StreamHint`] is `Fixed` or `None` is ever fully in memory,
/// and only because it already was (`Buf`/`Empty`).
impl HttpBodyTrait for Body {
    type Data = Bytes;
    type Error = BodyError;

    async fn next_data(&mut self) -> Option<Result<Self::Data, Self::Error>> {
        self.data().await
    }

    fn stream_hint(&self) -> StreamHint {
        match self {
            Body::Empty => StreamHint::None,
            Body::Buf(_) => StreamHint::Fixed,
            Body::File { .. } => StreamHint::Stream,
            Body::Incoming(b) => b.stream_hint(),
        }
    }
}
