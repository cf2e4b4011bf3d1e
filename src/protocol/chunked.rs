//! Chunked transfer-coding (RFC 2616 §3.6.1) for ICAP encapsulated bodies,
//! with the ICAP `ieof` extension: a terminal `0; ieof\r\n\r\n` chunk means
//! "this is the whole entity", as opposed to a plain `0\r\n\r\n` which only
//! ends a preview and invites the client to send the remainder later.

use std::str;

use bytes::Bytes;

/// Incremental chunked-body decoder.
///
/// Feed it whatever bytes are available; it consumes as much as it can and
/// reports how much it used, so the caller can top up the buffer from the
/// socket and call again. [`ChunkedParser::is_complete`] is true once the
/// terminal chunk (and any trailers) has been consumed.
#[derive(Debug, Clone)]
pub struct ChunkedParser {
    state: ChunkState,
    current_chunk_size: usize,
    current_chunk_read: usize,
    ieof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    ReadingSize,
    ReadingChunk,
    ReadingTrailers,
    Complete,
}

/// Malformed chunked-body input; always maps to `ProtocolError(400)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkedParseError {
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),
    #[error("chunk size too large: {0}")]
    ChunkSizeTooLarge(usize),
}

const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

impl Default for ChunkedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedParser {
    pub fn new() -> Self {
        Self {
            state: ChunkState::ReadingSize,
            current_chunk_size: 0,
            current_chunk_read: 0,
            ieof: false,
        }
    }

    /// Parse as much of `input` as forms complete chunks.
    ///
    /// Returns the decoded body bytes produced by this call and the number
    /// of input bytes consumed. Call again with more data appended if
    /// `!is_complete()` after the buffer is exhausted.
    pub fn parse_chunk(&mut self, input: &[u8]) -> Result<(Vec<u8>, usize), ChunkedParseError> {
        let mut output = Vec::new();
        let mut pos = 0;
        let mut consumed = 0;

        while pos < input.len() {
            match self.state {
                ChunkState::ReadingSize => {
                    let Some(crlf_pos) = find_crlf(&input[pos..]) else {
                        break;
                    };
                    let line = str::from_utf8(&input[pos..pos + crlf_pos])
                        .map_err(|_| ChunkedParseError::InvalidChunkSize("non-UTF8".into()))?;
                    let (size_part, ext_part) = match line.split_once(';') {
                        Some((size, ext)) => (size.trim(), Some(ext.trim())),
                        None => (line.trim(), None),
                    };
                    self.current_chunk_size = usize::from_str_radix(size_part, 16)
                        .map_err(|e| ChunkedParseError::InvalidChunkSize(e.to_string()))?;
                    if self.current_chunk_size > MAX_CHUNK_SIZE {
                        return Err(ChunkedParseError::ChunkSizeTooLarge(self.current_chunk_size));
                    }
                    pos += crlf_pos + 2;
                    consumed = pos;

                    if self.current_chunk_size == 0 {
                        if let Some(ext) = ext_part {
                            self.ieof = ext.eq_ignore_ascii_case("ieof");
                        }
                        self.state = ChunkState::ReadingTrailers;
                    } else {
                        self.state = ChunkState::ReadingChunk;
                        self.current_chunk_read = 0;
                    }
                }

                ChunkState::ReadingChunk => {
                    let remaining_in_chunk = self.current_chunk_size - self.current_chunk_read;
                    let available = input.len() - pos;
                    let to_read = remaining_in_chunk.min(available);

                    output.extend_from_slice(&input[pos..pos + to_read]);
                    pos += to_read;
                    self.current_chunk_read += to_read;

                    if self.current_chunk_read == self.current_chunk_size {
                        if pos + 2 <= input.len() && &input[pos..pos + 2] == b"\r\n" {
                            pos += 2;
                            consumed = pos;
                            self.state = ChunkState::ReadingSize;
                        } else {
                            break;
                        }
                    } else {
                        consumed = pos;
                    }
                }

                ChunkState::ReadingTrailers => {
                    let Some(end_pos) = find_crlf(&input[pos..]) else {
                        break;
                    };
                    // An empty trailer line (immediate CRLF) ends the message.
                    pos += end_pos + 2;
                    consumed = pos;
                    self.state = ChunkState::Complete;
                    break;
                }

                ChunkState::Complete => break,
            }
        }

        Ok((output, consumed))
    }

    /// Whether the terminal chunk (and trailers) has been fully consumed.
    pub fn is_complete(&self) -> bool {
        self.state == ChunkState::Complete
    }

    /// Whether the terminal chunk carried the `ieof` extension: this body
    /// is the entire entity, not just a preview.
    pub fn is_ieof(&self) -> bool {
        self.ieof
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Encode `data` as a chunked body followed by the terminal `0\r\n\r\n`.
pub fn encode_chunked(data: &[u8]) -> Bytes {
    if data.is_empty() {
        return Bytes::from_static(b"0\r\n\r\n");
    }

    const CHUNK_SIZE: usize = 8192;
    let mut result = Vec::with_capacity(data.len() + data.len() / CHUNK_SIZE * 16 + 16);
    let mut pos = 0;
    while pos < data.len() {
        let end = (pos + CHUNK_SIZE).min(data.len());
        let chunk = &data[pos..end];
        result.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        result.extend_from_slice(chunk);
        result.extend_from_slice(b"\r\n");
        pos = end;
    }
    result.extend_from_slice(b"0\r\n\r\n");
    Bytes::from(result)
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    memchr::memchr(b'\r', data).filter(|&i| data.get(i + 1) == Some(&b'\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_chunks_then_terminal() {
        let data = b"1a\r\nThis is the first chunk\r\n15\r\nSecond chunk here\r\n0\r\n\r\n";
        let mut parser = ChunkedParser::new();
        let (decoded, consumed) = parser.parse_chunk(data).unwrap();
        assert_eq!(decoded, b"This is the first chunkSecond chunk here");
        assert_eq!(consumed, data.len());
        assert!(parser.is_complete());
        assert!(!parser.is_ieof());
    }

    #[test]
    fn empty_body_is_just_the_terminal_chunk() {
        let mut parser = ChunkedParser::new();
        let (decoded, consumed) = parser.parse_chunk(b"0\r\n\r\n").unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 5);
        assert!(parser.is_complete());
    }

    #[test]
    fn ieof_extension_is_recognized_on_terminal_chunk() {
        let mut parser = ChunkedParser::new();
        let (decoded, _) = parser.parse_chunk(b"4\r\nabcd\r\n0; ieof\r\n\r\n").unwrap();
        assert_eq!(decoded, b"abcd");
        assert!(parser.is_complete());
        assert!(parser.is_ieof());
    }

    #[test]
    fn plain_terminal_chunk_without_ieof_is_not_marked_complete_entity() {
        let mut parser = ChunkedParser::new();
        let (decoded, _) = parser
            .parse_chunk(b"a\r\nabcdefghij\r\n0\r\n\r\n")
            .unwrap();
        assert_eq!(decoded, b"abcdefghij");
        assert!(parser.is_complete());
        assert!(!parser.is_ieof());
    }

    #[test]
    fn incremental_feed_across_two_calls() {
        let data = b"1a\r\nThis is the first chunk\r\n15\r\nSecond chunk here\r\n0\r\n\r\n";
        let mut parser = ChunkedParser::new();
        let (decoded1, consumed1) = parser.parse_chunk(&data[..20]).unwrap();
        assert_eq!(decoded1, b"This is the first chunk");
        assert!(!parser.is_complete());

        let (decoded2, consumed2) = parser.parse_chunk(&data[consumed1..]).unwrap();
        assert_eq!(decoded2, b"Second chunk here");
        assert_eq!(consumed1 + consumed2, data.len());
        assert!(parser.is_complete());
    }

    #[test]
    fn non_hex_chunk_size_is_rejected() {
        let mut parser = ChunkedParser::new();
        let result = parser.parse_chunk(b"zz\r\nchunk data\r\n0\r\n\r\n");
        assert!(matches!(result, Err(ChunkedParseError::InvalidChunkSize(_))));
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let mut parser = ChunkedParser::new();
        let result = parser.parse_chunk(b"40000000\r\nx\r\n0\r\n\r\n");
        assert!(matches!(
            result,
            Err(ChunkedParseError::ChunkSizeTooLarge(_))
        ));
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let data = b"Hello, World!".repeat(1000);
        let encoded = encode_chunked(&data);
        let mut parser = ChunkedParser::new();
        let (decoded, consumed) = parser.parse_chunk(&encoded).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(consumed, encoded.len());
        assert!(parser.is_complete());
    }

    #[test]
    fn encode_empty_is_bare_terminal_chunk() {
        assert_eq!(encode_chunked(b"").as_ref(), b"0\r\n\r\n");
    }
}
