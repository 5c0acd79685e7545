use std::{os::unix::prelude::OsStrExt, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use super::parsers::parse;

const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;
const DEFAULT_HEADER_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BODY_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_KEEP_ALIVE_IDLE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Top level server configuration: the knobs every listener honors
/// regardless of which routes are mounted on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Largest request line + header block accepted before the connection
    /// is failed with `431 Request Header Fields Too Large`.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Largest request body accepted. `None` means unbounded (streamed).
    #[serde(default)]
    pub max_body_bytes: Option<u64>,

    #[serde(default = "default_header_read_timeout_secs")]
    pub header_read_timeout_secs: u64,

    #[serde(default = "default_body_read_timeout_secs")]
    pub body_read_timeout_secs: u64,

    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_keep_alive_idle_timeout_secs")]
    pub keep_alive_idle_timeout_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            runtime: RuntimeConfig::default(),
            max_header_bytes: default_max_header_bytes(),
            max_body_bytes: None,
            header_read_timeout_secs: default_header_read_timeout_secs(),
            body_read_timeout_secs: default_body_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            keep_alive_idle_timeout_secs: default_keep_alive_idle_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }

    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_secs(self.body_read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn keep_alive_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Load a `ServerConfig` from a `.toml` or `.json` file, the format
    /// picked by the file's extension.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<ServerConfig> {
        let raw = std::fs::read(path.as_ref())?;
        parse(&parse_extension(path.as_ref()), &raw)
    }
}

fn parse_extension(path: &Path) -> String {
    let extension = path.extension().unwrap_or_default().as_bytes().to_ascii_lowercase();
    String::from_utf8(extension).unwrap_or_default()
}

fn default_max_header_bytes() -> usize {
    DEFAULT_MAX_HEADER_BYTES
}
fn default_header_read_timeout_secs() -> u64 {
    DEFAULT_HEADER_READ_TIMEOUT_SECS
}
fn default_body_read_timeout_secs() -> u64 {
    DEFAULT_BODY_READ_TIMEOUT_SECS
}
fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}
fn default_keep_alive_idle_timeout_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_IDLE_TIMEOUT_SECS
}
fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

/// Thread/runtime shape. Unlike the io-uring proxy this is modeled on,
/// a single worker (the default) is a fully supported, common case -- the
/// framework does not assume multi-core deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub runtime_type: RuntimeType,

    #[serde(default = "default_cpu_affinity")]
    pub cpu_affinity: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            workers: default_workers(),
            runtime_type: RuntimeType::default(),
            cpu_affinity: default_cpu_affinity(),
        }
    }
}

fn default_workers() -> usize {
    1
}

fn default_cpu_affinity() -> bool {
    false
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    #[cfg(target_os = "linux")]
    IoUring,
    Legacy,
}

impl Default for RuntimeType {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self::IoUring
    }
    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Self::Legacy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub key: String,
    pub chain: String,
    #[serde(default)]
    pub stack: TlsStack,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TlsStack {
    Rustls,
    NativeTls,
}

impl Default for TlsStack {
    fn default() -> Self {
        Self::Rustls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_header_bytes, 8192);
        assert_eq!(cfg.max_body_bytes, None);
        assert_eq!(cfg.header_read_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.keep_alive_idle_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(cfg.runtime.workers, 1);
    }

    #[test]
    fn toml_round_trips_timeouts() {
        let toml_src = r#"
            max_header_bytes = 4096
            header_read_timeout_secs = 5

            [runtime]
            workers = 4
        "#;
        let cfg: ServerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.max_header_bytes, 4096);
        assert_eq!(cfg.header_read_timeout_secs, 5);
        assert_eq!(cfg.runtime.workers, 4);
        // untouched knobs still fall back to their defaults
        assert_eq!(cfg.write_timeout_secs, 30);
    }

    #[test]
    fn json_round_trips_tls() {
        let json_src = r#"{"tls": {"key": "k.pem", "chain": "c.pem", "stack": "native_tls"}}"#;
        let cfg: ServerConfig = serde_json::from_str(json_src).unwrap();
        let tls = cfg.tls.expect("tls present");
        assert_eq!(tls.stack, TlsStack::NativeTls);
    }
}
