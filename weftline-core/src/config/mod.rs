//! Server configuration: the knobs in `ServerConfig` and their TOML/JSON
//! (de)serialization, following the extension-sniffing loader pattern used
//! throughout this codebase's config layer.

mod config;
mod parsers;

pub use config::{RuntimeConfig, RuntimeType, ServerConfig, TlsConfig, TlsStack};
