// SPDX-License-Identifier: Apache-2.0

//! Assembles complete lines from raw chunks read off the file.

use bytes::BytesMut;
use tracing::warn;

use crate::topology::payload::LogLine;

/// Buffers the unterminated tail of the data seen so far and hands out
/// complete lines as their newline arrives.
///
/// A line that grows past `max_line_size` is dropped as a whole; everything
/// up to the next newline is skipped so the following line starts clean.
pub struct LineReader {
    partial: BytesMut,
    max_line_size: usize,
    /// Skipping the remainder of an oversized line
    discarding: bool,
}

impl LineReader {
    pub fn new(max_line_size: usize) -> Self {
        Self {
            partial: BytesMut::new(),
            max_line_size,
            discarding: false,
        }
    }

    /// Feed a chunk. `emit` is called once per completed line and returns
    /// false to stop; in that case the rest of the chunk is discarded and
    /// false is returned.
    pub fn push<F>(&mut self, mut chunk: &[u8], emit: &mut F) -> bool
    where
        F: FnMut(LogLine) -> bool,
    {
        while !chunk.is_empty() {
            let Some(idx) = chunk.iter().position(|&b| b == b'\n') else {
                self.buffer(chunk);
                break;
            };

            let (head, rest) = chunk.split_at(idx);
            chunk = &rest[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let len = self.partial.len() + head.len();
            if len > self.max_line_size {
                self.drop_oversized(len);
                continue;
            }

            self.partial.extend_from_slice(head);
            if !emit(self.take_line()) {
                return false;
            }
        }
        true
    }

    /// Unterminated remainder, used only when the stream ends for good.
    pub fn finish(&mut self) -> Option<LogLine> {
        self.discarding = false;
        if self.partial.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    /// Forget buffered content, e.g. after the file was truncated or replaced.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.discarding = false;
    }

    /// Ignore everything up to and including the next newline. Used when
    /// reading starts in the middle of a line.
    pub fn skip_to_next_line(&mut self) {
        self.partial.clear();
        self.discarding = true;
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    fn buffer(&mut self, chunk: &[u8]) {
        if self.discarding {
            return;
        }
        let len = self.partial.len() + chunk.len();
        if len > self.max_line_size {
            self.drop_oversized(len);
            self.discarding = true;
        } else {
            self.partial.extend_from_slice(chunk);
        }
    }

    fn drop_oversized(&mut self, len: usize) {
        warn!(
            len,
            max_line_size = self.max_line_size,
            reason = "line too long",
            "Dropping line"
        );
        self.partial.clear();
    }

    fn take_line(&mut self) -> LogLine {
        if self.partial.last() == Some(&b'\r') {
            self.partial.truncate(self.partial.len() - 1);
        }
        LogLine::new(self.partial.split().freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(reader: &mut LineReader, chunks: &[&str]) -> Vec<LogLine> {
        let mut out = Vec::new();
        for chunk in chunks {
            reader.push(chunk.as_bytes(), &mut |line| {
                out.push(line);
                true
            });
        }
        out
    }

    fn lines(expected: &[&'static str]) -> Vec<LogLine> {
        expected.iter().map(|s| LogLine::from(*s)).collect()
    }

    #[test]
    fn splits_complete_lines() {
        let mut reader = LineReader::new(1024);
        let out = collect(&mut reader, &["one\ntwo\nthree\n"]);
        assert_eq!(out, lines(&["one", "two", "three"]));
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let mut reader = LineReader::new(1024);

        let out = collect(&mut reader, &["{\"timestamp\":\"t1\",", "\"file\":\"a.txt\""]);
        assert!(out.is_empty());
        assert_eq!(reader.pending(), 32);

        let out = collect(&mut reader, &["}\n"]);
        assert_eq!(
            out,
            vec![LogLine::from("{\"timestamp\":\"t1\",\"file\":\"a.txt\"}")]
        );
    }

    #[test]
    fn strips_crlf_and_keeps_empty_lines() {
        let mut reader = LineReader::new(1024);
        let out = collect(&mut reader, &["a\r\n\nb\n"]);
        assert_eq!(out, lines(&["a", "", "b"]));
    }

    #[test]
    fn drops_oversized_line_whole() {
        let mut reader = LineReader::new(8);
        let out = collect(&mut reader, &["short\nthis line is ", "far too long\n", "next\n"]);
        assert_eq!(out, lines(&["short", "next"]));
    }

    #[test]
    fn drops_oversized_line_within_one_chunk() {
        let mut reader = LineReader::new(4);
        let out = collect(&mut reader, &["ok\ntoolong\nok2\n"]);
        assert_eq!(out, lines(&["ok", "ok2"]));
    }

    #[test]
    fn stop_request_is_honoured() {
        let mut reader = LineReader::new(1024);
        let mut seen = 0;
        let completed = reader.push(b"a\nb\nc\n", &mut |_| {
            seen += 1;
            seen < 2
        });
        assert!(!completed);
        assert_eq!(seen, 2);
    }

    #[test]
    fn finish_returns_remainder_and_reset_clears() {
        let mut reader = LineReader::new(1024);
        collect(&mut reader, &["tail without newline"]);
        assert_eq!(reader.finish(), Some("tail without newline".into()));
        assert_eq!(reader.finish(), None);

        collect(&mut reader, &["stale"]);
        reader.reset();
        assert_eq!(reader.pending(), 0);
    }
}
