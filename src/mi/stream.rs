//! Splits the subprocess's raw byte stream into complete lines (§4.3).

/// Accumulates raw bytes across reads and yields complete lines split on
/// `\r\n` or `\n`. Bytes are buffered and decoded only once a complete line
/// is found, never decoded chunk-by-chunk — a multibyte UTF-8 code point
/// split across two reads must not corrupt into U+FFFD (§4.1 "higher code
/// points pass through, UTF-8 is transparent"). A trailing partial line
/// with no terminator is held until more bytes arrive. [`LineSplitter::finish`]
/// exposes whatever was left over when the stream closed, for callers that
/// want to inspect it; the crate's own reader loop (`process.rs`) calls it
/// but discards the result (§9 open question, resolved: a partial
/// unterminated line from a dying GDB is dropped, not dispatched as a final
/// `Raw` record — matching the teacher's `process_output`, which returns
/// immediately on `Ok(0)` without flushing a partial buffer).
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a freshly read chunk and returns every complete line found,
    /// in order. Incomplete trailing bytes (including a bisected multibyte
    /// UTF-8 code point) are retained for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        loop {
            let newline = match self.buf.iter().position(|&b| b == b'\n') {
                Some(idx) => idx,
                None => break,
            };
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Called once the stream has closed. Returns the remaining buffered
    /// bytes, decoded, as a final line, if any was left unterminated.
    pub fn finish(mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_on_lf() {
        let mut s = LineSplitter::new();
        assert_eq!(s.feed(b"^done\n~\"hi\"\n"), vec!["^done", "~\"hi\""]);
    }

    #[test]
    fn splits_on_crlf() {
        let mut s = LineSplitter::new();
        assert_eq!(s.feed(b"(gdb) \r\n"), vec!["(gdb) "]);
    }

    #[test]
    fn buffers_partial_line_across_feeds() {
        let mut s = LineSplitter::new();
        assert!(s.feed(b"^do").is_empty());
        assert_eq!(s.feed(b"ne\n"), vec!["^done"]);
    }

    #[test]
    fn finish_yields_unterminated_tail() {
        let mut s = LineSplitter::new();
        assert!(s.feed(b"~\"partial").is_empty());
        assert_eq!(s.finish(), Some("~\"partial".to_string()));
    }

    #[test]
    fn finish_is_none_when_buffer_empty() {
        let mut s = LineSplitter::new();
        assert!(s.feed(b"^done\n").len() == 1);
        assert_eq!(s.finish(), None);
    }

    #[test]
    fn multibyte_utf8_sequence_split_across_feeds_decodes_intact() {
        // "café" — the trailing 'é' is a two-byte UTF-8 sequence (0xC3 0xA9);
        // split the feed between its two bytes.
        let bytes = "~\"café\"\n".as_bytes().to_vec();
        let (first, second) = bytes.split_at(bytes.len() - 2);
        let mut s = LineSplitter::new();
        assert!(s.feed(first).is_empty());
        let lines = s.feed(second);
        assert_eq!(lines, vec!["~\"café\""]);
    }
}
