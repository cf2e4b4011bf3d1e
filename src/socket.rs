//! Blocking socket I/O.
//!
//! One [`Connection`] wraps a client [`TcpStream`] plus whatever bytes have
//! been read from it but not yet consumed by a parser, so header reads and
//! chunked-body reads can interleave without losing bytes read ahead of where
//! the caller asked. Every call either returns a definite byte count or an
//! `IcapError::Io`/`IcapError::Timeout`; `send` loops (via `std`'s `write_all`)
//! until every byte is written or an error occurs.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::{IcapError, IcapResult};

/// Bind a listening socket. The manager creates this once in the parent and
/// forked workers inherit the file descriptor.
pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    Ok(listener)
}

/// A client connection with a small read-ahead buffer.
pub struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

const READ_CHUNK: usize = 8192;

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Connection {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Read more bytes from the socket into the internal buffer.
    ///
    /// Returns the number of bytes read; `0` means the peer closed the
    /// connection. A timed-out read surfaces as `IcapError::Timeout`.
    fn fill_more(&mut self) -> IcapResult<usize> {
        let mut tmp = [0u8; READ_CHUNK];
        match self.stream.read(&mut tmp) {
            Ok(n) => {
                self.buf.extend_from_slice(&tmp[..n]);
                Ok(n)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(IcapError::Timeout)
            }
            Err(e) => Err(IcapError::Io(e)),
        }
    }

    /// Read a complete `CRLF CRLF`-terminated header block, capped at
    /// `max_size` bytes (overflow is `ProtocolError(414)`).
    ///
    /// The returned string ends with the final header line's own `CRLF` but
    /// not the blank line that terminated the block; any bytes read past the
    /// blank line remain buffered for the next read (body or next request).
    pub fn read_header_block(&mut self, max_size: usize) -> IcapResult<String> {
        loop {
            if let Some(pos) = find_double_crlf(&self.buf) {
                let block = self.buf.split_to(pos + 2);
                let _blank_line = self.buf.split_to(2); // remaining CRLF of the blank line
                return String::from_utf8(block.to_vec())
                    .map_err(|_| IcapError::protocol(400, "non-UTF8 header block"));
            }
            if self.buf.len() > max_size {
                return Err(IcapError::protocol(414, "header block exceeds size cap"));
            }
            let n = self.fill_more()?;
            if n == 0 {
                return Err(IcapError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
        }
    }

    /// Read at least one more chunk-parser cycle's worth of body bytes,
    /// draining anything already buffered first.
    ///
    /// Returns an empty slice only once the peer has closed the connection.
    pub fn next_body_bytes(&mut self) -> IcapResult<Bytes> {
        if !self.buf.is_empty() {
            return Ok(self.buf.split().freeze());
        }
        let n = self.fill_more()?;
        if n == 0 {
            return Ok(Bytes::new());
        }
        Ok(self.buf.split().freeze())
    }

    /// Read exactly `n` bytes, draining the read-ahead buffer first.
    ///
    /// Used for encapsulated header sections whose length is known from the
    /// `Encapsulated` offsets.
    pub fn read_exact(&mut self, n: usize) -> IcapResult<Bytes> {
        while self.buf.len() < n {
            let read = self.fill_more()?;
            if read == 0 {
                return Err(IcapError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Feed one parser step: drain (or top up) the buffer, hand it to
    /// `parser`, and push back whatever the parser didn't consume.
    ///
    /// The caller loops on `!parser.is_complete()`.
    pub fn read_chunked_step(
        &mut self,
        parser: &mut crate::protocol::chunked::ChunkedParser,
    ) -> IcapResult<Vec<u8>> {
        if self.buf.is_empty() {
            let n = self.fill_more()?;
            if n == 0 {
                return Err(IcapError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
        }
        let taken = self.buf.split().freeze();
        let (decoded, consumed) = parser
            .parse_chunk(&taken)
            .map_err(|e| IcapError::protocol(400, e.to_string()))?;
        if consumed < taken.len() {
            self.buf.extend_from_slice(&taken[consumed..]);
        }
        Ok(decoded)
    }

    pub fn write_all(&mut self, data: &[u8]) -> IcapResult<()> {
        self.stream.write_all(data).map_err(IcapError::Io)
    }

    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;
    use std::thread;

    fn loopback_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Connection::new(server), client)
    }

    #[test]
    fn reads_header_block_stopping_before_blank_line() {
        let (mut conn, mut client) = loopback_pair();
        client
            .write_all(b"REQMOD icap://h/r ICAP/1.0\r\nHost: h\r\n\r\nBODYFOLLOWS")
            .unwrap();
        let block = conn.read_header_block(8192).unwrap();
        assert_eq!(block, "REQMOD icap://h/r ICAP/1.0\r\nHost: h\r\n");
        let remainder = conn.next_body_bytes().unwrap();
        assert_eq!(&remainder[..], b"BODYFOLLOWS");
    }

    #[test]
    fn oversized_header_block_is_rejected() {
        let (mut conn, mut client) = loopback_pair();
        let huge = "X-Pad: ".to_string() + &"a".repeat(100) + "\r\n";
        thread::spawn(move || {
            let _ = client.write_all(huge.as_bytes());
        });
        let err = conn.read_header_block(16).unwrap_err();
        assert_eq!(err.icap_status(), Some(414));
    }

    #[test]
    fn read_exact_drains_buffer_then_reads_more() {
        let (mut conn, mut client) = loopback_pair();
        client
            .write_all(b"REQMOD icap://h/r ICAP/1.0\r\n\r\nHELLOWORLD")
            .unwrap();
        let _ = conn.read_header_block(8192).unwrap();
        let bytes = conn.read_exact(10).unwrap();
        assert_eq!(&bytes[..], b"HELLOWORLD");
    }

    #[test]
    fn read_chunked_step_decodes_body_and_preserves_trailing_bytes() {
        let (mut conn, mut client) = loopback_pair();
        client
            .write_all(b"REQMOD icap://h/r ICAP/1.0\r\n\r\n4\r\nabcd\r\n0\r\n\r\nNEXTREQUEST")
            .unwrap();
        let _ = conn.read_header_block(8192).unwrap();
        let mut parser = crate::protocol::chunked::ChunkedParser::new();
        let mut body = Vec::new();
        while !parser.is_complete() {
            body.extend(conn.read_chunked_step(&mut parser).unwrap());
        }
        assert_eq!(body, b"abcd");
        let remainder = conn.next_body_bytes().unwrap();
        assert_eq!(&remainder[..], b"NEXTREQUEST");
    }

    #[test]
    fn read_header_block_reports_eof_on_peer_close() {
        let (mut conn, client) = loopback_pair();
        drop(client);
        let err = conn.read_header_block(8192).unwrap_err();
        assert!(matches!(err, IcapError::Io(_)));
    }
}
