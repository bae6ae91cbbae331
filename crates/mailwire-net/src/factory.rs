//! Stream factory seam.
//!
//! The host application may supply its own socket factory (for proxies,
//! test harnesses, or pinned-certificate TLS). The engines only see the
//! [`StreamFactory`] trait; the built-in [`RustlsFactory`] is used when no
//! custom factory is configured, or as a one-shot fallback when
//! `socketFactory.fallback=true`.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio_rustls::client::TlsStream;

use crate::stream::{MailStream, TlsSettings, create_tls_connector};
use crate::{Error, ProtocolConfig, Result};

/// Boxed future returned by factory methods, keeping the trait dyn-safe.
pub type FactoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Creates TCP connections and wraps them in TLS.
pub trait StreamFactory: Send + Sync {
    /// Opens a TCP connection to `host:port`.
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> FactoryFuture<'a, TcpStream>;

    /// Wraps an existing TCP connection in a TLS client session.
    fn wrap<'a>(
        &'a self,
        stream: TcpStream,
        host: &'a str,
    ) -> FactoryFuture<'a, TlsStream<TcpStream>>;
}

/// The built-in factory: plain tokio sockets, rustls for TLS.
#[derive(Debug, Clone, Default)]
pub struct RustlsFactory {
    /// TLS settings applied when wrapping.
    pub tls: TlsSettings,
    /// Local address to bind before connecting (`localaddress`).
    pub local_address: Option<IpAddr>,
    /// Local port to bind before connecting (`localport`).
    pub local_port: Option<u16>,
    /// Deadline for the TCP connect.
    pub connect_timeout: Duration,
}

impl RustlsFactory {
    /// Builds a factory from the protocol configuration.
    #[must_use]
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            tls: TlsSettings::from_config(config),
            local_address: config.get("localaddress").and_then(|v| v.parse().ok()),
            local_port: config
                .get("localport")
                .and_then(|v| v.parse().ok())
                .filter(|p| *p != 0),
            connect_timeout: config.connect_timeout(),
        }
    }

    async fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let mut addrs = lookup_host((host, port)).await?;
        let addr = addrs.next().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {host}"),
            ))
        })?;

        let connect = self.bound_connect(addr);
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.connect_timeout)),
        }
    }

    async fn bound_connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        if self.local_address.is_none() && self.local_port.is_none() {
            return Ok(TcpStream::connect(addr).await?);
        }

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        let bind_ip = self.local_address.unwrap_or(if addr.is_ipv4() {
            IpAddr::from([0, 0, 0, 0])
        } else {
            IpAddr::from([0u16; 8])
        });
        socket.bind(SocketAddr::new(bind_ip, self.local_port.unwrap_or(0)))?;
        Ok(socket.connect(addr).await?)
    }
}

impl StreamFactory for RustlsFactory {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> FactoryFuture<'a, TcpStream> {
        Box::pin(self.open_tcp(host, port))
    }

    fn wrap<'a>(
        &'a self,
        stream: TcpStream,
        host: &'a str,
    ) -> FactoryFuture<'a, TlsStream<TcpStream>> {
        Box::pin(async move {
            let connector = create_tls_connector(&self.tls)?;
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())?;
            Ok(connector.connect(server_name, stream).await?)
        })
    }
}

/// Opens a stream per the configuration, applying the factory fallback rule.
///
/// The custom factory, when present, is tried first. If it fails and
/// `socketFactory.fallback=true`, the built-in factory is tried exactly
/// once; otherwise the original error surfaces.
pub async fn open_stream(
    config: &ProtocolConfig,
    custom: Option<&Arc<dyn StreamFactory>>,
) -> Result<MailStream> {
    let host = config.host().to_string();
    let port = config.effective_port();
    let default = RustlsFactory::from_config(config);
    let use_tls = config.get_bool("ssl.enable", false);
    let debug = config.get_bool("debug", false);
    let quote = config.get_bool("debug.quote", false);

    let stream = if let Some(factory) = custom {
        match open_with(factory.as_ref(), &host, port, use_tls).await {
            Ok(stream) => Ok(stream),
            Err(err) if config.get_bool("socketFactory.fallback", false) => {
                tracing::warn!(%err, "configured socket factory failed, falling back to default");
                open_with(&default, &host, port, use_tls).await
            }
            Err(err) => Err(err),
        }
    } else {
        open_with(&default, &host, port, use_tls).await
    }?;

    Ok(if debug { stream.traced(quote) } else { stream })
}

async fn open_with(
    factory: &dyn StreamFactory,
    host: &str,
    port: u16,
    use_tls: bool,
) -> Result<MailStream> {
    let tcp = factory.connect(host, port).await?;
    if use_tls {
        let tls = factory.wrap(tcp, host).await?;
        Ok(MailStream::tls(tls))
    } else {
        Ok(MailStream::plain(tcp))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_factory_connects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let factory = RustlsFactory {
            connect_timeout: Duration::from_secs(5),
            ..RustlsFactory::default()
        };
        let stream = factory.connect("127.0.0.1", addr.port()).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_fallback_disabled_surfaces_error() {
        struct Failing;
        impl StreamFactory for Failing {
            fn connect<'a>(&'a self, _host: &'a str, _port: u16) -> FactoryFuture<'a, TcpStream> {
                Box::pin(async {
                    Err(Error::Config("factory unavailable".to_string()))
                })
            }
            fn wrap<'a>(
                &'a self,
                _stream: TcpStream,
                _host: &'a str,
            ) -> FactoryFuture<'a, TlsStream<TcpStream>> {
                Box::pin(async { Err(Error::Config("factory unavailable".to_string())) })
            }
        }

        let config = ProtocolConfig::empty("smtp");
        let custom: Arc<dyn StreamFactory> = Arc::new(Failing);
        let result = open_stream(&config, Some(&custom)).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
