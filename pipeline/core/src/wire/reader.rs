//! Stream Reader
//!
//! Turns an HTTP response body into complete, newline-terminated text lines.
//!
//! Network chunks split the byte stream at arbitrary points: in the middle of
//! a `data: ` prefix, in the middle of a JSON payload, or in the middle of a
//! multi-byte UTF-8 sequence. [`LineBuffer`] carries the undecoded byte tail
//! and the partial last line across pushes so that every line it yields is
//! exactly what a single-chunk delivery would have produced.
//!
//! [`FrameReader`] wraps a byte stream and exposes the lines lazily. It is
//! tied to one response body and cannot be restarted.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::FRAME_PREFIX;
use crate::session::TransportError;

/// Replacement character emitted for invalid UTF-8 sequences
const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder and line splitter
///
/// Holds a single text buffer across pushes. After each push, everything up
/// to the last `\n` has been returned as complete lines; the remainder stays
/// buffered until more bytes arrive or [`LineBuffer::finish`] is called.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    buffer: String,
    /// When set, the final unterminated line is only flushed if it starts
    /// with this prefix
    flush_prefix: Option<&'static str>,
}

impl LineBuffer {
    /// Create a buffer that flushes any non-blank trailing line on finish
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer for SSE frames
    ///
    /// On finish, the trailing partial line is kept only when it carries the
    /// `data: ` prefix.
    #[must_use]
    pub fn for_frames() -> Self {
        Self {
            flush_prefix: Some(FRAME_PREFIX),
            ..Self::default()
        }
    }

    /// Append a chunk of bytes and return the lines it completed
    ///
    /// Returned lines have their `\n` (and a preceding `\r`, if any) removed.
    /// Empty lines are returned too; SSE uses them as frame separators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_lines()
    }

    /// Signal end of input and return the final line, if any
    ///
    /// An incomplete UTF-8 sequence left at the very end of the input is
    /// replaced with U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.buffer.push(REPLACEMENT);
        }

        let mut rest = std::mem::take(&mut self.buffer);
        if rest.ends_with('\r') {
            rest.pop();
        }

        match self.flush_prefix {
            Some(prefix) if rest.starts_with(prefix) => Some(rest),
            Some(_) => {
                if !rest.trim().is_empty() {
                    tracing::debug!(len = rest.len(), "Discarding unterminated non-frame line");
                }
                None
            }
            None if rest.trim().is_empty() => None,
            None => Some(rest),
        }
    }

    /// Number of buffered bytes that have not been returned as lines yet
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.pending.len() + self.buffer.len()
    }

    fn decode(&mut self, chunk: &[u8]) {
        let bytes = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut start = 0;
        while start < bytes.len() {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));

                    match e.error_len() {
                        // Sequence cut off by the chunk boundary: wait for more bytes
                        None => {
                            self.pending.extend_from_slice(&bytes[valid_end..]);
                            return;
                        }
                        Some(bad) => {
                            self.buffer.push(REPLACEMENT);
                            start = valid_end + bad;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }
}

/// Lazy line reader over a response body
///
/// Pulls chunks from the underlying byte stream only when no complete line is
/// buffered, so fragments reach the caller as soon as their bytes arrive.
pub struct FrameReader<S> {
    inner: S,
    lines: LineBuffer,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineBuffer::for_frames(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Return the next complete line
    ///
    /// Yields `None` once the body has ended and every buffered line has
    /// been returned. A body read failure is yielded once as `Some(Err(_))`;
    /// the reader is finished afterwards.
    pub async fn next_line(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    self.ready.extend(self.lines.push(&chunk));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.ready.clear();
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    if let Some(last) = self.lines.finish() {
                        self.ready.push_back(last);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn push_all(buffer: &mut LineBuffer, chunks: &[&[u8]]) -> Vec<String> {
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(buffer.push(chunk));
        }
        lines.extend(buffer.finish());
        lines
    }

    #[test]
    fn test_splits_complete_lines_and_keeps_partial() {
        let mut buffer = LineBuffer::for_frames();

        let lines = buffer.push(b"data: \"a\"\n\ndata: \"b");
        assert_eq!(lines, vec!["data: \"a\"".to_string(), String::new()]);
        assert_eq!(buffer.buffered_len(), "data: \"b".len());

        let lines = buffer.push(b"\"\n\n");
        assert_eq!(lines, vec!["data: \"b\"".to_string(), String::new()]);
        assert_eq!(buffer.buffered_len(), 0);
    }

    #[test]
    fn test_prefix_split_across_chunks() {
        let mut buffer = LineBuffer::for_frames();
        let lines = push_all(&mut buffer, &[b"da", b"ta", b": \"x\"\n"]);
        assert_eq!(lines, vec!["data: \"x\"".to_string()]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9, "🦀" is four bytes
        let text = "data: \"caf\u{e9} \u{1f980}\"\n".as_bytes();
        let e_start = text.iter().position(|b| *b == 0xC3).unwrap();
        let crab_start = text.iter().position(|b| *b == 0xF0).unwrap();

        let mut buffer = LineBuffer::for_frames();
        let lines = push_all(
            &mut buffer,
            &[
                &text[..=e_start],
                &text[e_start + 1..crab_start + 2],
                &text[crab_start + 2..],
            ],
        );
        assert_eq!(lines, vec!["data: \"caf\u{e9} \u{1f980}\"".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::new();
        let lines = push_all(&mut buffer, &[b"ab\xFFcd\n"]);
        assert_eq!(lines, vec!["ab\u{FFFD}cd".to_string()]);
    }

    #[test]
    fn test_truncated_sequence_at_end_is_replaced() {
        let mut buffer = LineBuffer::new();
        let lines = push_all(&mut buffer, &[b"data: x\xE2\x82"]);
        assert_eq!(lines, vec!["data: x\u{FFFD}".to_string()]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut buffer = LineBuffer::for_frames();
        let lines = push_all(&mut buffer, &[b"data: \"a\"\r\n\r\n"]);
        assert_eq!(lines, vec!["data: \"a\"".to_string(), String::new()]);
    }

    #[test]
    fn test_finish_flushes_only_frame_lines() {
        let mut frames = LineBuffer::for_frames();
        frames.push(b"data: \"tail\"");
        assert_eq!(frames.finish(), Some("data: \"tail\"".to_string()));

        let mut frames = LineBuffer::for_frames();
        frames.push(b": keep-alive");
        assert_eq!(frames.finish(), None);

        let mut plain = LineBuffer::new();
        plain.push(b"{\"done\":true}");
        assert_eq!(plain.finish(), Some("{\"done\":true}".to_string()));
    }

    #[test]
    fn test_chunking_does_not_change_lines() {
        let body = "data: \"Hello\"\n\ndata: \" w\u{f6}rld\"\n\ndata: {\"text\":\"!\"}\n\n";
        let bytes = body.as_bytes();

        let mut whole = LineBuffer::for_frames();
        let expected = push_all(&mut whole, &[bytes]);

        for size in 1..=7 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let mut split = LineBuffer::for_frames();
            assert_eq!(push_all(&mut split, &chunks), expected, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn test_frame_reader_yields_lines_lazily() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: \"He")),
            Ok(Bytes::from_static(b"llo\"\n\ndata: \" world\"")),
        ];
        let mut reader = FrameReader::new(futures::stream::iter(chunks));

        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await {
            lines.push(line.unwrap());
        }

        assert_eq!(
            lines,
            vec![
                "data: \"Hello\"".to_string(),
                String::new(),
                "data: \" world\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_reader_surfaces_body_error_once() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: \"a\"\n")),
            Err(TransportError::Body("connection reset".into())),
            Ok(Bytes::from_static(b"data: \"never\"\n")),
        ];
        let mut reader = FrameReader::new(futures::stream::iter(chunks));

        assert_eq!(reader.next_line().await.unwrap().unwrap(), "data: \"a\"");
        assert!(matches!(
            reader.next_line().await,
            Some(Err(TransportError::Body(_)))
        ));
        assert!(reader.next_line().await.is_none());
    }
}
