use std::io::{self, ErrorKind, Read};

/// Default capacity for device-side rings.
pub const DEFAULT_RING_CAPACITY: usize = 4 * 0x10000;

/// Fixed-capacity wrap-around byte store.
///
/// `feed` is where the next byte is written and `consumed` is the next byte
/// to be read. One cell always stays empty, so `feed == consumed` only ever
/// means "empty"; usable capacity is `capacity() - 1`.
///
/// The buffer does no locking of its own. Each stream owns one ring and
/// guards it with its own mutex.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    feed: usize,
    consumed: usize,
}

impl RingBuffer {
    /// Create a ring with `capacity` cells (minimum 2).
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(2)].into_boxed_slice(),
            feed: 0,
            consumed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Producer cursor.
    pub fn feed(&self) -> usize {
        self.feed
    }

    /// Consumer cursor.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Map any offset, negative included, into `0..capacity`.
    pub fn wrap(&self, i: isize) -> usize {
        let size = self.buf.len() as isize;
        i.rem_euclid(size) as usize
    }

    /// Bytes written but not yet consumed.
    pub fn len(&self) -> usize {
        self.distance(self.consumed, self.feed)
    }

    pub fn is_empty(&self) -> bool {
        self.feed == self.consumed
    }

    /// Bytes that can be written without touching unread data.
    pub fn free_space(&self) -> usize {
        self.buf.len() - 1 - self.len()
    }

    /// True if `i` points at an unread byte.
    pub fn is_in_range(&self, i: usize) -> bool {
        let i = i % self.buf.len();
        if self.consumed <= self.feed {
            i >= self.consumed && i < self.feed
        } else {
            i >= self.consumed || i < self.feed
        }
    }

    /// Unread bytes from cursor `i` up to `feed`; 0 if `i` is outside the
    /// unread region.
    pub fn bytes_available_from(&self, i: usize) -> usize {
        if !self.is_in_range(i) {
            return 0;
        }
        self.distance(i % self.buf.len(), self.feed)
    }

    /// Byte at absolute cursor `i` (wrapped).
    pub fn at(&self, i: usize) -> u8 {
        self.buf[i % self.buf.len()]
    }

    /// Unread byte `offset` positions after `consumed`, if present.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        (offset < self.len()).then(|| self.at(self.consumed + offset))
    }

    /// Append as much of `data` as fits. Returns the number of bytes
    /// accepted; the caller retries the rest later.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free_space());
        let first = n.min(self.buf.len() - self.feed);
        self.buf[self.feed..self.feed + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.feed = (self.feed + n) % self.buf.len();
        n
    }

    /// Fill free space straight from a reader, in at most two contiguous
    /// segments. `WouldBlock` and `TimedOut` count as "no data".
    ///
    /// Returns the number of bytes stored. `Ok(0)` with free space available
    /// can mean EOF for streams; callers that care use [`Self::fill_once`].
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut total = 0usize;
        for _ in 0..2 {
            match self.fill_once(reader)? {
                Some(0) | None => break,
                Some(n) => total += n,
            }
        }
        Ok(total)
    }

    /// One read into the next contiguous free segment.
    ///
    /// `Ok(None)` means the reader had nothing right now; `Ok(Some(0))` with
    /// free space means the reader hit EOF.
    pub fn fill_once<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<usize>> {
        let free = self.free_space();
        if free == 0 {
            return Ok(Some(0));
        }
        let end = (self.feed + free).min(self.buf.len());
        loop {
            match reader.read(&mut self.buf[self.feed..end]) {
                Ok(n) => {
                    self.feed = (self.feed + n) % self.buf.len();
                    return Ok(Some(n));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Copy unread bytes starting at cursor `from` into `out`, without
    /// consuming them. Returns the number of bytes copied.
    pub fn read_into(&self, from: usize, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes_available_from(from));
        let start = from % self.buf.len();
        let first = n.min(self.buf.len() - start);
        out[..first].copy_from_slice(&self.buf[start..start + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        n
    }

    /// Copy up to `len` unread bytes starting at cursor `from`.
    pub fn copy_from(&self, from: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len.min(self.bytes_available_from(from))];
        let n = self.read_into(from, &mut out);
        out.truncate(n);
        out
    }

    /// Advance the consumer cursor by up to `n` bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len());
        self.consumed = (self.consumed + n) % self.buf.len();
    }

    /// Copy out every unread byte and mark it consumed.
    pub fn drain(&mut self) -> Vec<u8> {
        let out = self.copy_from(self.consumed, self.len());
        self.consume(out.len());
        out
    }

    /// Drop all content and reset both cursors.
    pub fn reinit(&mut self) {
        self.feed = 0;
        self.consumed = 0;
    }

    fn distance(&self, from: usize, to: usize) -> usize {
        self.wrap(to as isize - from as isize)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn wrap_handles_negative_and_large_offsets() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.wrap(0), 0);
        assert_eq!(ring.wrap(8), 0);
        assert_eq!(ring.wrap(11), 3);
        assert_eq!(ring.wrap(-1), 7);
        assert_eq!(ring.wrap(-8), 0);
        assert_eq!(ring.wrap(-17), 7);
    }

    #[test]
    fn keeps_one_cell_free() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(b"0123456789"), 7);
        assert_eq!(ring.len(), 7);
        assert_eq!(ring.free_space(), 0);
        assert_eq!(ring.write(b"x"), 0);
        assert_ne!(ring.feed(), ring.consumed());
    }

    #[test]
    fn partial_accept_then_retry() {
        let mut ring = RingBuffer::new(8);
        let data = b"abcdefghij";
        let first = ring.write(data);
        assert_eq!(first, 7);
        assert_eq!(ring.drain(), b"abcdefg");
        let second = ring.write(&data[first..]);
        assert_eq!(second, 3);
        assert_eq!(ring.drain(), b"hij");
    }

    #[test]
    fn read_across_wrap_point() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcde");
        ring.consume(5);
        ring.write(b"123456");
        assert_eq!(ring.feed(), 3);
        assert_eq!(ring.consumed(), 5);

        let mut out = [0u8; 6];
        assert_eq!(ring.read_into(ring.consumed(), &mut out), 6);
        assert_eq!(&out, b"123456");
        assert_eq!(ring.bytes_available_from(7), 4);
        assert_eq!(ring.copy_from(7, 10), b"3456");
    }

    #[test]
    fn range_checks_follow_cursors() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdef");
        ring.consume(4);
        ring.write(b"ghi");
        // unread: cells 4,5,6,7,0
        assert!(ring.is_in_range(4));
        assert!(ring.is_in_range(7));
        assert!(ring.is_in_range(0));
        assert!(!ring.is_in_range(1));
        assert!(!ring.is_in_range(3));
        assert_eq!(ring.bytes_available_from(1), 0);
        assert_eq!(ring.bytes_available_from(0), 1);
        assert_eq!(ring.peek(4), Some(b'i'));
        assert_eq!(ring.peek(5), None);
    }

    #[test]
    fn interleaved_traffic_never_overwrites() {
        let mut ring = RingBuffer::new(16);
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0u8;
        for step in 0..500usize {
            let burst: Vec<u8> = (0..(step % 11))
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let accepted = ring.write(&burst);
            expected.extend(burst[..accepted].iter().copied());
            // rejected bytes are simply not produced
            next = next.wrapping_sub((burst.len() - accepted) as u8);

            assert!(ring.bytes_available_from(ring.consumed()) <= ring.capacity() - 1);

            let take = step % 7;
            let mut out = vec![0u8; take];
            let n = ring.read_into(ring.consumed(), &mut out);
            ring.consume(n);
            for byte in &out[..n] {
                assert_eq!(Some(*byte), expected.pop_front());
            }
        }
    }

    #[test]
    fn fill_from_reader_uses_both_segments() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdef");
        ring.consume(6);
        let mut reader = Cursor::new(b"0123456".to_vec());
        assert_eq!(ring.fill_from(&mut reader).unwrap(), 7);
        assert_eq!(ring.drain(), b"0123456");
    }

    #[test]
    fn fill_once_reports_would_block() {
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::WouldBlock, "idle"))
            }
        }
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.fill_once(&mut Idle).unwrap(), None);
        assert_eq!(ring.fill_from(&mut Idle).unwrap(), 0);
    }

    #[test]
    fn reinit_empties() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abc");
        ring.consume(1);
        ring.reinit();
        assert!(ring.is_empty());
        assert_eq!(ring.feed(), 0);
        assert_eq!(ring.consumed(), 0);
    }
}
