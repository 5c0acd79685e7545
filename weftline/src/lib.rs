//! `weftline`: the routing, extraction, and middleware-composition core of
//! an async HTTP/1.x server framework built on `monoio`.
//!
//! A minimal server:
//!
//! ```no_run
//! use weftline::{route::route, server::Server, Scope};
//!
//! async fn hello() -> &'static str {
//!     "hello"
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let scope = Scope::new("").serve(route::get("/hello", hello));
//! let server = Server::builder().build(scope)?;
//! monoio::start::<monoio::time::TimeDriver<monoio::IoUringDriver>, _>(async move {
//!     server.run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! });
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod common;
pub mod connection;
pub mod error;
pub mod extract;
pub mod handler;
pub mod middleware;
pub mod path;
pub mod query;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;

pub use body::Body;
pub use error::FrameworkError;
pub use middleware::{DynService, Middleware};
pub use path::Pattern;
pub use query::QueryMap;
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use route::{Route, Scope};
pub use router::RouterIndex;
pub use server::Server;

/// An error type every fallible extractor/handler signature can convert
/// into via `?`, matching the rest of this ecosystem's preference for
/// `anyhow` at handler boundaries over a bespoke per-crate error enum.
pub type AnyError = anyhow::Error;
