//! Turns a [`crate::config::TlsConfig`] (cert/key file paths + stack choice)
//! into a ready-to-accept-on TLS server context for whichever stack the
//! config selected.

use std::io::Cursor;

use crate::config::{TlsConfig, TlsStack};

/// A constructed TLS server context, ready to wrap an accepted stream.
#[derive(Clone)]
pub enum TlsContext<A = ::rustls::ServerConfig, B = ::native_tls::Identity> {
    Rustls(A),
    Native(B),
}

impl TryFrom<&TlsConfig> for TlsContext {
    type Error = anyhow::Error;

    fn try_from(value: &TlsConfig) -> anyhow::Result<TlsContext> {
        let chain = std::fs::read(&value.chain)?;
        let key = std::fs::read(&value.key)?;
        match value.stack {
            TlsStack::Rustls => {
                let chain = rustls_pemfile::certs(&mut Cursor::new(&chain))?
                    .into_iter()
                    .map(::rustls::Certificate)
                    .collect::<Vec<_>>();
                if chain.is_empty() {
                    anyhow::bail!("empty cert file");
                }
                let key = rustls_pemfile::pkcs8_private_keys(&mut Cursor::new(&key))?
                    .pop()
                    .map(::rustls::PrivateKey)
                    .ok_or_else(|| anyhow::anyhow!("empty key file"))?;
                let scfg = ::rustls::ServerConfig::builder()
                    .with_safe_defaults()
                    .with_no_client_auth()
                    .with_single_cert(chain, key)?;
                Ok(TlsContext::Rustls(scfg))
            }
            TlsStack::NativeTls => {
                let identity = native_tls::Identity::from_pkcs8(&chain, &key)?;
                Ok(TlsContext::Native(identity))
            }
        }
    }
}
