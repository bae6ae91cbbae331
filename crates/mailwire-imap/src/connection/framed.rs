//! Framed I/O for the IMAP protocol.
//!
//! IMAP responses are CRLF lines, except that a line ending `{n}\r\n`
//! announces n raw bytes (which may themselves contain CRLFs) belonging
//! to the same response. The framed reader accumulates one complete
//! response, literals resolved, before the parser sees it.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::Result;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
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

    /// Reads one complete response, literal payloads included.
    ///
    /// Every byte consumed from the socket ends up in the returned
    /// buffer: either as response text or as a literal payload.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        match self.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, Self::read_response_inner(&mut self.reader))
                    .await
                    .map_err(|_| mailwire_net::Error::Timeout(limit))?
            }
            None => Self::read_response_inner(&mut self.reader).await,
        }
    }

    async fn read_response_inner(reader: &mut BufReader<S>) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = Self::read_line(reader).await?;
            response.extend_from_slice(&line);

            if let Some(literal_len) = parse_literal_length(&line) {
                if literal_len > MAX_LITERAL_SIZE {
                    return Err(crate::Error::Protocol(format!(
                        "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                let mut literal = vec![0u8; literal_len];
                reader
                    .read_exact(&mut literal)
                    .await
                    .map_err(mailwire_net::Error::Io)?;
                response.extend_from_slice(&literal);
                // The response continues after the literal.
            } else {
                break;
            }
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(reader: &mut BufReader<S>) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = reader.fill_buf().await.map_err(mailwire_net::Error::Io)?;
            if buf.is_empty() {
                return Err(mailwire_net::Error::UnexpectedEof.into());
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                reader.consume(pos + 2);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(crate::Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes command bytes and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream
            .write_all(&self.write_buffer)
            .await
            .map_err(mailwire_net::Error::Io)?;
        stream.flush().await.map_err(mailwire_net::Error::Io)?;

        Ok(())
    }

    /// Writes raw bytes (literal payloads) and flushes.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await.map_err(mailwire_net::Error::Io)?;
        stream.flush().await.map_err(mailwire_net::Error::Io)?;

        Ok(())
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: any buffered data is lost. Used for the STARTTLS rebind,
    /// which happens at a point where the server has nothing in flight.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line (`{123}\r\n`).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];

    let open = line.iter().rposition(|&b| b == b'{')?;
    if !line.ends_with(b"}") {
        return None;
    }

    let num = &line[open + 1..line.len() - 1];
    // {123+} (LITERAL+) only appears client-to-server; reject it here.
    let num_str = std::str::from_utf8(num).ok()?;
    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    num_str.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = tokio_test::io::Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (BODY {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_read_literal_containing_crlf() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (BODY[HEADER] {23}\r\n")
            .read(b"Subject: hi\r\nDate: x\r\n\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(
            response,
            b"* 1 FETCH (BODY[HEADER] {23}\r\nSubject: hi\r\nDate: x\r\n\r\n)\r\n".as_slice()
        );
    }

    #[tokio::test]
    async fn test_eof_is_unexpected_end_of_stream() {
        let mock = tokio_test::io::Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("unexpected end of stream"));
    }

    #[tokio::test]
    async fn test_literal_size_cap() {
        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (BODY {{{literal_size}}}\r\n");

        let mock = tokio_test::io::Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = tokio_test::io::Builder::new()
            .write(b"A0001 NOOP\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"A0001 NOOP\r\n").await.unwrap();
    }
}
