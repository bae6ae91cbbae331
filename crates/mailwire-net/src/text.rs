//! CRLF line framing for the text protocols.
//!
//! POP3, SMTP, and NNTP all speak CRLF-terminated lines, multi-line bodies
//! terminated by a lone `.`, and leading-dot stuffing. This module carries
//! that framing once; the IMAP crate has its own literal-aware reader.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Buffered line-oriented stream with an optional per-read deadline.
pub struct TextStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    timeout: Option<Duration>,
}

impl<S> TextStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new text stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            timeout: None,
        }
    }

    /// Sets the per-read deadline. `None` disables it.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Reads one CRLF-terminated line, returning it without the terminator.
    pub async fn read_line(&mut self) -> Result<String> {
        self.read_line_extended(1).await
    }

    /// Reads one line with the deadline multiplied by `factor`.
    ///
    /// SMTP reads the reply that follows the DATA terminator with twice
    /// the normal deadline.
    pub async fn read_line_extended(&mut self, factor: u32) -> Result<String> {
        let deadline = self.timeout.map(|t| t * factor);
        let raw = match deadline {
            Some(limit) => tokio::time::timeout(limit, Self::read_raw_line(&mut self.reader))
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => Self::read_raw_line(&mut self.reader).await?,
        };

        String::from_utf8(raw)
            .map_err(|_| Error::ConnectionLost("non-UTF-8 response line".to_string()))
    }

    async fn read_raw_line(reader: &mut BufReader<S>) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEof);
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..pos]);
                reader.consume(pos + 1);
                // Tolerate bare LF from sloppy servers; strip the CR of CRLF.
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::ConnectionLost("line too long".to_string()));
            }
        }
    }

    /// Reads a multi-line body terminated by a lone `.`, un-stuffing
    /// leading dots. The returned bytes keep CRLF line endings and
    /// exclude the terminator line.
    pub async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();

        loop {
            let line = self.read_line().await?;
            if line == "." {
                break;
            }
            let unstuffed = line.strip_prefix('.').unwrap_or(&line);
            body.extend_from_slice(unstuffed.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        Ok(body)
    }

    /// Writes one line, appending CRLF, and flushes.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(line.as_bytes());
        self.write_buffer.extend_from_slice(b"\r\n");

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Writes raw bytes and flushes.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Writes `data` canonicalised to CRLF with leading dots stuffed,
    /// then the `.` terminator line, and flushes.
    pub async fn write_dot_stuffed(&mut self, data: &[u8]) -> Result<()> {
        let stuffed = dot_stuff(data);
        let stream = self.reader.get_mut();
        stream.write_all(&stuffed).await?;
        stream.write_all(b".\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the text stream and returns the inner stream.
    ///
    /// Note: any buffered read data is lost; callers upgrade to TLS only
    /// at protocol points where the server has nothing in flight.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Canonicalises `data` to CRLF line endings and doubles any line-leading
/// `.`. The result always ends with CRLF (unless `data` is empty) and
/// never contains the `.` terminator.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 2);
    let mut at_line_start = true;
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                // Swallow the LF of a CRLF pair; a bare CR still breaks the line.
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                at_line_start = true;
            }
            b'\n' => {
                out.extend_from_slice(b"\r\n");
                at_line_start = true;
            }
            byte => {
                if at_line_start && byte == b'.' {
                    out.push(b'.');
                }
                out.push(byte);
                at_line_start = false;
            }
        }
        i += 1;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Byte count of the canonicalised, dot-stuffed form of `data`, excluding
/// the terminator. Used for the SMTP SIZE= estimate.
#[must_use]
pub fn dot_stuffed_len(data: &[u8]) -> usize {
    dot_stuff(data).len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_stuff_plain() {
        assert_eq!(dot_stuff(b"hello\r\nworld\r\n"), b"hello\r\nworld\r\n");
    }

    #[test]
    fn test_dot_stuff_leading_dots() {
        assert_eq!(dot_stuff(b".hidden\r\n..deep\r\n"), b"..hidden\r\n...deep\r\n");
    }

    #[test]
    fn test_dot_stuff_canonicalises_bare_endings() {
        assert_eq!(dot_stuff(b"a\nb\rc"), b"a\r\nb\r\nc\r\n");
    }

    #[test]
    fn test_dot_stuff_interior_dot_untouched() {
        assert_eq!(dot_stuff(b"a.b\r\n"), b"a.b\r\n");
    }

    #[test]
    fn test_dot_stuff_empty() {
        assert_eq!(dot_stuff(b""), b"");
    }

    #[test]
    fn test_dot_stuffed_len_matches() {
        let data = b".one\ntwo\r\n.three";
        assert_eq!(dot_stuffed_len(data), dot_stuff(data).len());
    }

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let mock = tokio_test::io::Builder::new().read(b"+OK ready\r\n").build();
        let mut stream = TextStream::new(mock);
        assert_eq!(stream.read_line().await.unwrap(), "+OK ready");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = tokio_test::io::Builder::new().build();
        let mut stream = TextStream::new(mock);
        assert!(matches!(
            stream.read_line().await,
            Err(Error::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_read_multiline_unstuffs() {
        let mock = tokio_test::io::Builder::new()
            .read(b"line one\r\n..dotted\r\n.\r\n")
            .build();
        let mut stream = TextStream::new(mock);
        let body = stream.read_multiline().await.unwrap();
        assert_eq!(body, b"line one\r\n.dotted\r\n");
    }

    #[tokio::test]
    async fn test_write_dot_stuffed_terminator() {
        let mock = tokio_test::io::Builder::new()
            .write(b"msg\r\n")
            .write(b".\r\n")
            .build();
        let mut stream = TextStream::new(mock);
        stream.write_dot_stuffed(b"msg").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_line() {
        let mock = tokio_test::io::Builder::new().write(b"NOOP\r\n").build();
        let mut stream = TextStream::new(mock);
        stream.write_line("NOOP").await.unwrap();
    }
}
