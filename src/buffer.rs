//! The caller-visible receive buffer.

use crate::config::RX_BUF_SIZE;
use crate::util;

/// Bytes received since the last [`clear`](ReceiveBuffer::clear).
///
/// The length never exceeds `RX_BUF_SIZE - 1`; the byte after the last
/// received one is always zero. Chunks delivered between two clears are
/// appended in arrival order.
pub struct ReceiveBuffer {
    data: [u8; RX_BUF_SIZE],
    len: usize,
    ready: bool,
    /// Everything before this offset has already been seen by the dispatcher
    /// or consumed by a synchronous exchange.
    scanned: usize,
}

impl ReceiveBuffer {
    /// An empty buffer.
    pub const fn new() -> Self {
        Self {
            data: [0; RX_BUF_SIZE],
            len: 0,
            ready: false,
            scanned: 0,
        }
    }

    /// Appends a chunk, returning how many bytes fit.
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        let room = RX_BUF_SIZE - 1 - self.len;
        let n = chunk.len().min(room);
        self.data[self.len..self.len + n].copy_from_slice(&chunk[..n]);
        self.len += n;
        self.data[self.len] = 0;
        if n > 0 {
            self.ready = true;
        }
        n
    }

    /// Resets length and ready flag. Does not touch the receive arm.
    pub fn clear(&mut self) {
        self.len = 0;
        self.ready = false;
        self.scanned = 0;
        self.data[0] = 0;
    }

    /// Everything received since the last clear.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The received text, up to the first invalid UTF-8 byte.
    pub fn as_str(&self) -> &str {
        util::utf8_prefix(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether any bytes arrived since the last clear.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        self.len == RX_BUF_SIZE - 1
    }

    /// Whether `token` occurs in the received bytes.
    pub fn contains(&self, token: &str) -> bool {
        util::contains(self.as_bytes(), token.as_bytes())
    }

    /// Bytes not yet seen by the dispatcher.
    pub fn unscanned(&self) -> &[u8] {
        &self.data[self.scanned.min(self.len)..self.len]
    }

    /// Marks everything received so far as seen.
    pub fn mark_scanned(&mut self) {
        self.scanned = self.len;
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_chunks_and_keeps_terminator() {
        let mut buf = ReceiveBuffer::new();
        assert!(!buf.is_ready());
        buf.append(b"WIFI CONNECTED\r\n");
        buf.append(b"OK\r\n");
        assert!(buf.is_ready());
        assert_eq!(buf.as_str(), "WIFI CONNECTED\r\nOK\r\n");
        assert_eq!(buf.data[buf.len()], 0);
    }

    #[test]
    fn never_fills_the_terminator_slot() {
        let mut buf = ReceiveBuffer::new();
        let big = [b'x'; RX_BUF_SIZE + 10];
        assert_eq!(buf.append(&big), RX_BUF_SIZE - 1);
        assert!(buf.is_full());
        assert_eq!(buf.append(b"more"), 0);
        assert_eq!(buf.data[RX_BUF_SIZE - 1], 0);
    }

    #[test]
    fn watermark_hides_seen_bytes_until_clear() {
        let mut buf = ReceiveBuffer::new();
        buf.append(b"OK\r\n");
        buf.mark_scanned();
        buf.append(b"+IPD,2:hi");
        assert_eq!(buf.unscanned(), b"+IPD,2:hi");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.unscanned(), b"");
    }
}
