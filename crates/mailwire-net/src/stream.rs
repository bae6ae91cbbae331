//! Plain and TLS socket streams.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A stream that can be plaintext, TLS, or either wrapped in a wire
/// tracer.
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
    /// A traced stream mirroring traffic to the `tracing` subscriber.
    Traced(Box<crate::TraceStream<MailStream>>),
}

impl MailStream {
    /// Creates a new plaintext stream.
    #[must_use]
    pub const fn plain(stream: TcpStream) -> Self {
        Self::Plain(stream)
    }

    /// Creates a new TLS stream.
    #[must_use]
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    /// Interposes the wire tracer. `escape` renders non-printable bytes
    /// as `=XX` hex escapes.
    #[must_use]
    pub fn traced(self, escape: bool) -> Self {
        match self {
            already @ Self::Traced(_) => already,
            other => Self::Traced(Box::new(crate::TraceStream::new(other, escape))),
        }
    }

    /// Upgrades a plaintext stream to TLS over the same TCP connection.
    ///
    /// Used by the STARTTLS / STLS commands after the server accepted the
    /// upgrade. No unencrypted byte is written once this returns. A
    /// traced stream stays traced across the upgrade.
    pub async fn upgrade_to_tls(self, host: &str, settings: &TlsSettings) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector(settings)?;
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
            Self::Traced(traced) => {
                let escape = traced.escape();
                let upgraded =
                    Box::pin(traced.into_inner().upgrade_to_tls(host, settings)).await?;
                Ok(upgraded.traced(escape))
            }
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Tls(_) => true,
            Self::Traced(traced) => traced.get_ref().is_tls(),
        }
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Traced(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Traced(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
            Self::Traced(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Traced(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// TLS negotiation settings derived from the `ssl.*` options.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// Enabled protocol versions (`ssl.protocols`), e.g. `TLSv1.3`.
    /// Empty means the rustls defaults.
    pub protocols: Vec<String>,
    /// Enabled cipher suites (`ssl.ciphersuites`), matched against the
    /// rustls suite names. Empty means the provider defaults.
    pub ciphersuites: Vec<String>,
}

impl TlsSettings {
    /// Builds settings from a protocol configuration.
    #[must_use]
    pub fn from_config(config: &crate::ProtocolConfig) -> Self {
        let split = |key: &str| {
            config
                .get(key)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default()
        };
        Self {
            protocols: split("ssl.protocols"),
            ciphersuites: split("ssl.ciphersuites"),
        }
    }
}

/// Creates a TLS connector honoring the configured protocol and suite lists.
pub fn create_tls_connector(settings: &TlsSettings) -> Result<TlsConnector> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    if !settings.ciphersuites.is_empty() {
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite());
            settings
                .ciphersuites
                .iter()
                .any(|want| want.eq_ignore_ascii_case(&name))
        });
        if provider.cipher_suites.is_empty() {
            return Err(Error::Config(format!(
                "no enabled cipher suite matches ssl.ciphersuites={:?}",
                settings.ciphersuites
            )));
        }
    }

    let versions = protocol_versions(&settings.protocols)?;

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

fn protocol_versions(
    names: &[String],
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>> {
    if names.is_empty() {
        return Ok(rustls::ALL_VERSIONS.to_vec());
    }

    let mut versions = Vec::new();
    for name in names {
        match name.as_str() {
            "TLSv1.2" => versions.push(&rustls::version::TLS12),
            "TLSv1.3" => versions.push(&rustls::version::TLS13),
            other => {
                return Err(Error::Config(format!(
                    "unsupported TLS protocol name: {other}"
                )));
            }
        }
    }
    Ok(versions)
}

/// Connects to a server with TLS from the first byte.
pub async fn connect_tls(host: &str, port: u16, settings: &TlsSettings) -> Result<MailStream> {
    let tcp = TcpStream::connect((host, port)).await?;

    let connector = create_tls_connector(settings)?;
    let server_name = ServerName::try_from(host.to_string())?;
    let tls = connector.connect(server_name, tcp).await?;

    Ok(MailStream::Tls(Box::new(tls)))
}

/// Connects to a server without TLS (plaintext or pre-STARTTLS).
pub async fn connect_plain(host: &str, port: u16) -> Result<MailStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    Ok(MailStream::Plain(tcp))
}

/// Opens a connection per the protocol configuration.
///
/// Applies the local bind overrides and connect timeout, resolves the
/// configured stream factory (falling back to the built-in one when
/// `socketFactory.fallback=true`), and wraps the socket in TLS when
/// `ssl.enable=true`.
pub async fn connect(
    config: &crate::ProtocolConfig,
    factory: Option<&Arc<dyn crate::StreamFactory>>,
) -> Result<MailStream> {
    crate::factory::open_stream(config, factory).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tls_connector_defaults() {
        let connector = create_tls_connector(&TlsSettings::default());
        assert!(connector.is_ok());
    }

    #[test]
    fn test_protocol_version_names() {
        let versions =
            protocol_versions(&["TLSv1.2".to_string(), "TLSv1.3".to_string()]).unwrap();
        assert_eq!(versions.len(), 2);

        let err = protocol_versions(&["SSLv3".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_ciphersuite_rejected() {
        let settings = TlsSettings {
            protocols: Vec::new(),
            ciphersuites: vec!["TLS_NOT_A_SUITE".to_string()],
        };
        assert!(create_tls_connector(&settings).is_err());
    }
}
