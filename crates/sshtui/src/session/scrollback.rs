//! Bounded per-session output history.
//!
//! The buffer stores raw bytes only. Lines are derived on demand so that the
//! pager always reflects the latest captured output.

use crate::config::DEFAULT_SCROLLBACK_LIMIT;

/// A truncating byte log that keeps only its most recent `limit` bytes.
#[derive(Debug, Clone)]
pub struct ScrollbackBuffer {
    data: Vec<u8>,
    /// Offset of the first retained byte in `data`.
    start: usize,
    limit: usize,
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_SCROLLBACK_LIMIT)
    }
}

impl ScrollbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with a custom ceiling. A zero limit is treated as 1.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            start: 0,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends bytes, discarding the oldest ones beyond the ceiling.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.limit {
            self.data.clear();
            self.start = 0;
            self.data.extend_from_slice(&bytes[bytes.len() - self.limit..]);
            return;
        }

        self.data.extend_from_slice(bytes);
        let overflow = self.len().saturating_sub(self.limit);
        self.start += overflow;

        // Compact once the dead prefix is as large as the live window.
        if self.start >= self.limit {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }

    /// The retained bytes, oldest first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// The last `limit` bytes, or the whole buffer if it is shorter.
    pub fn replay_tail(&self, limit: usize) -> &[u8] {
        let bytes = self.as_bytes();
        &bytes[bytes.len().saturating_sub(limit)..]
    }

    /// The retained bytes split on line feeds.
    pub fn view(&self) -> Vec<&[u8]> {
        self.as_bytes().split(|&b| b == b'\n').collect()
    }

    /// Owned, lossily decoded lines for display.
    pub fn snapshot_lines(&self) -> Vec<String> {
        self.view()
            .into_iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer() {
        let buffer = ScrollbackBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.limit(), 1024 * 1024);
        assert!(buffer.replay_tail(4096).is_empty());
        assert_eq!(buffer.view(), vec![&b""[..]]);
    }

    #[test]
    fn test_view_reconstructs_input() {
        let mut buffer = ScrollbackBuffer::new();
        let chunks: [&[u8]; 4] = [
            b"first line\nsec",
            b"ond line\n",
            b"\xff\x00binary",
            b"\n\ntail",
        ];
        let mut expected = Vec::new();
        for chunk in chunks {
            buffer.append(chunk);
            expected.extend_from_slice(chunk);
        }

        assert_eq!(buffer.view().join(&b'\n'), expected);
        assert_eq!(buffer.view().len(), 5);
    }

    #[test]
    fn test_truncation_keeps_most_recent_bytes() {
        let mut buffer = ScrollbackBuffer::with_limit(10);
        let mut all = Vec::new();
        for i in 0..25u8 {
            let chunk = [b'a' + (i % 26), b'0' + (i % 10), b'-'];
            buffer.append(&chunk);
            all.extend_from_slice(&chunk);
            let keep = all.len().min(10);
            assert_eq!(buffer.as_bytes(), &all[all.len() - keep..]);
        }
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_truncation_at_default_limit() {
        let mut buffer = ScrollbackBuffer::new();
        let mut all = Vec::new();
        for i in 0..300u32 {
            let chunk = vec![(i % 251) as u8; 4096];
            buffer.append(&chunk);
            all.extend_from_slice(&chunk);
        }
        assert!(all.len() > 1024 * 1024);
        assert_eq!(buffer.len(), 1024 * 1024);
        assert_eq!(buffer.as_bytes(), &all[all.len() - 1024 * 1024..]);
    }

    #[test]
    fn test_single_chunk_larger_than_limit() {
        let mut buffer = ScrollbackBuffer::with_limit(4);
        buffer.append(b"ab");
        buffer.append(b"0123456789");
        assert_eq!(buffer.as_bytes(), b"6789");
    }

    #[test]
    fn test_replay_tail_bounds() {
        let mut buffer = ScrollbackBuffer::new();
        buffer.append(b"short");
        assert_eq!(buffer.replay_tail(4096), b"short");

        let long = vec![b'x'; 10_000];
        buffer.append(&long);
        let tail = buffer.replay_tail(4096);
        assert_eq!(tail.len(), 4096);
        assert_eq!(tail, &buffer.as_bytes()[buffer.len() - 4096..]);
    }

    #[test]
    fn test_snapshot_lines_lossy() {
        let mut buffer = ScrollbackBuffer::new();
        buffer.append(b"ok\n\xffbad");
        assert_eq!(buffer.snapshot_lines(), vec!["ok".to_string(), "\u{fffd}bad".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = ScrollbackBuffer::with_limit(8);
        buffer.append(b"0123456789");
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.append(b"x");
        assert_eq!(buffer.as_bytes(), b"x");
    }
}
