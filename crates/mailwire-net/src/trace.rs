//! Wire tracing.
//!
//! When protocol debugging is enabled, the engines wrap their stream in a
//! [`TraceStream`] that mirrors every read and write to the `tracing`
//! subscriber under the `mailwire::wire` target. Non-printable bytes are
//! escaped quoted-printable style (`=0D`, `=0A`, ...) so binary literals
//! stay one line per event.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Transparent stream wrapper that logs traffic.
pub struct TraceStream<S> {
    inner: S,
    escape: bool,
}

impl<S> TraceStream<S> {
    /// Wraps a stream. When `escape` is true, non-printable bytes are
    /// rendered as `=XX` hex escapes instead of raw text.
    pub const fn new(inner: S, escape: bool) -> Self {
        Self { inner, escape }
    }

    /// Returns whether hex escaping is enabled.
    pub const fn escape(&self) -> bool {
        self.escape
    }

    /// Returns a reference to the inner stream.
    pub const fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Consumes the wrapper and returns the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn render(&self, data: &[u8]) -> String {
        if self.escape {
            escape_bytes(data)
        } else {
            String::from_utf8_lossy(data).into_owned()
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TraceStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let received = &buf.filled()[before..];
            if !received.is_empty() {
                tracing::trace!(target: "mailwire::wire", "S: {}", this.render(received));
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TraceStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            if *n > 0 {
                tracing::trace!(target: "mailwire::wire", "C: {}", this.render(&buf[..*n]));
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if (0x20..0x7F).contains(&b) && b != b'=' {
            out.push(b as char);
        } else {
            out.push_str(&format!("={b:02X}"));
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"OK\r\n"), "OK=0D=0A");
        assert_eq!(escape_bytes(b"a=b"), "a=3Db");
    }

    #[tokio::test]
    async fn test_passthrough() {
        let mock = tokio_test::io::Builder::new()
            .write(b"CAPA\r\n")
            .read(b"+OK\r\n")
            .build();
        let mut traced = TraceStream::new(mock, true);

        traced.write_all(b"CAPA\r\n").await.unwrap();
        let mut buf = [0u8; 5];
        traced.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"+OK\r\n");
    }
}
