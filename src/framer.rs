use log::warn;

/// Accumulator cap. A well-behaved robot sends a newline every few dozen
/// bytes; hitting this means the peer is streaming garbage or the baud rate
/// is wrong.
pub const MAX_ACCUM: usize = 64 * 1024;

/// Splits an arbitrarily-chunked byte stream into newline-terminated records.
///
/// Leftover partial bytes persist across `feed` calls. Invalid UTF-8 is
/// replaced, never fatal. If the accumulator would exceed [`MAX_ACCUM`] the
/// buffered prefix is dropped and input is discarded up to the next newline,
/// so one runaway line cannot pin unbounded memory.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: String,
    discarding: bool,
    dropped: u64,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk and return every complete line it finishes, trimmed.
    /// Empty lines are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        let mut rest: &str = &text;
        let mut out = Vec::new();

        loop {
            if self.discarding {
                match rest.find('\n') {
                    Some(i) => {
                        self.discarding = false;
                        rest = &rest[i + 1..];
                    }
                    None => return out,
                }
            }
            match rest.find('\n') {
                Some(i) => {
                    if self.buf.len() + i > MAX_ACCUM {
                        self.drop_oversized(self.buf.len() + i);
                        self.discarding = false; // delimiter is in this chunk
                        rest = &rest[i + 1..];
                        continue;
                    }
                    self.buf.push_str(&rest[..i]);
                    let line = self.buf.trim();
                    if !line.is_empty() {
                        out.push(line.to_string());
                    }
                    self.buf.clear();
                    rest = &rest[i + 1..];
                }
                None => {
                    if self.buf.len() + rest.len() > MAX_ACCUM {
                        self.drop_oversized(self.buf.len() + rest.len());
                        self.discarding = true;
                    } else {
                        self.buf.push_str(rest);
                    }
                    return out;
                }
            }
        }
    }

    /// Number of oversized lines dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes currently buffered waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn drop_oversized(&mut self, size: usize) {
        warn!(
            "frame too large ({} bytes without newline), dropping and resyncing",
            size
        );
        self.buf.clear();
        self.dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_line_in_one_chunk() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"hello\n"), vec!["hello"]);
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn split_inside_line() {
        let mut f = LineFramer::new();
        assert!(f.feed(b"hel").is_empty());
        assert!(f.feed(b"lo wor").is_empty());
        assert_eq!(f.feed(b"ld\n"), vec!["hello world"]);
    }

    #[test]
    fn split_inside_delimiter() {
        // CRLF split across two chunks: CR is trimmed, LF finishes the line
        let mut f = LineFramer::new();
        assert!(f.feed(b"one\r").is_empty());
        assert_eq!(f.feed(b"\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn multiple_lines_per_chunk_in_order() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"a\nb\nc\npartial"), vec!["a", "b", "c"]);
        assert_eq!(f.feed(b"\n"), vec!["partial"]);
    }

    #[test]
    fn empty_lines_dropped() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"\n\n  \nx\n\n"), vec!["x"]);
    }

    #[test]
    fn invalid_utf8_replaced() {
        let mut f = LineFramer::new();
        let lines = f.feed(b"ok \xff\xfe bytes\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].ends_with(" bytes"));
    }

    #[test]
    fn oversized_line_dropped_and_resynced() {
        let mut f = LineFramer::new();
        let junk = vec![b'x'; MAX_ACCUM + 1];
        assert!(f.feed(&junk).is_empty());
        assert_eq!(f.dropped(), 1);
        // still discarding: more junk goes nowhere
        assert!(f.feed(b"yyyy").is_empty());
        assert_eq!(f.pending(), 0);
        // newline resynchronizes, next line comes through intact
        assert_eq!(f.feed(b"tail\nfresh\n"), vec!["fresh"]);
        assert_eq!(f.dropped(), 1);
    }

    #[test]
    fn oversized_with_late_delimiter_in_same_chunk() {
        let mut f = LineFramer::new();
        f.feed(&vec![b'x'; MAX_ACCUM]);
        // the delimiter arrives together with the overflowing tail
        assert_eq!(f.feed(b"xx\nok\n"), vec!["ok"]);
        assert_eq!(f.dropped(), 1);
    }
}
