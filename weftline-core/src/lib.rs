#![feature(impl_trait_in_assoc_type)]

//! Core abstractions shared by the `weftline` HTTP framework.
//!
//! This crate has no notion of routes, extractors or HTTP semantics. It only
//! provides the load-bearing primitives the rest of the framework is built
//! from:
//!
//! - [`error`]: the `anyhow`-based escape hatch plus the `bail_into!` helper.
//! - [`state`]: the runtime, type-indexed, layered state map backing scope
//!   and route level `.state()` values.
//! - [`listener`]: a unified TCP/Unix listener and accepted-stream type.
//! - [`tls`]: TLS server-context construction for `rustls` and `native-tls`.
//! - [`config`]: the server configuration knobs and their (de)serialization.

#[macro_use]
mod error;
pub use error::{AnyError, AnyResult};

pub mod config;
pub mod state;
pub mod listener;
#[cfg(feature = "tls")]
pub mod tls;
