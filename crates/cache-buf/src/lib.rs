//! A growable, contiguous byte buffer with independent read/write cursors.
//!
//! `DynBuf` is the single allocation a connection uses for both inbound and
//! outbound bytes. Capacity only ever grows by doubling (or shrinks back to
//! `init_size` in one step) so that the cost of a resize is amortized and the
//! buffer never needs more than `O(log(max_size / init_size))` reallocations
//! to reach its ceiling.

use thiserror::Error;

/// Errors a [`DynBuf`] resize can fail with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DynBufError {
    /// The requested capacity would exceed `max_size`.
    #[error("buffer capacity would exceed the configured maximum of {max_size} bytes")]
    Overflow {
        /// The ceiling that was hit.
        max_size: usize,
    },
}

/// A contiguous byte region of current capacity `C`, with a read cursor `r`
/// and write cursor `w` such that `0 <= r <= w <= C`.
///
/// The readable region is `[r, w)`; the writable region is `[w, C)`.
#[derive(Debug)]
pub struct DynBuf {
    data: Vec<u8>,
    r: usize,
    w: usize,
    init_size: usize,
    max_size: usize,
}

impl DynBuf {
    /// Creates a buffer at its initial capacity.
    ///
    /// `max_size` is clamped up to at least `init_size`: a buffer can always
    /// hold at least one capacity's worth of data.
    pub fn create(init_size: usize, max_size: usize) -> Self {
        let max_size = max_size.max(init_size);
        DynBuf {
            data: vec![0u8; init_size],
            r: 0,
            w: 0,
            init_size,
            max_size,
        }
    }

    /// Current total capacity `C`.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The configured ceiling this buffer will never grow past.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of bytes available to read, `w - r`.
    pub fn readable_size(&self) -> usize {
        self.w - self.r
    }

    /// Number of bytes available to write into without growing, `C - w`.
    pub fn writable_size(&self) -> usize {
        self.data.len() - self.w
    }

    /// The readable region `[r, w)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.r..self.w]
    }

    /// The writable region `[w, C)`.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.w..]
    }

    /// Resolves an absolute `(offset, len)` pair against the backing
    /// storage, regardless of the current read/write cursors.
    ///
    /// Codecs record parsed tokens as offsets into this storage rather than
    /// borrowed slices, so a [`Request`](https://docs.rs/cache-proto)'s
    /// views stay valid (and `Send`-able) across the parse/dispatch split;
    /// the dispatch invariant in turn requires this buffer not be grown or
    /// compacted while such a view is outstanding.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Read cursor, as an absolute offset into the backing storage.
    pub fn read_cursor(&self) -> usize {
        self.r
    }

    /// Write cursor, as an absolute offset into the backing storage.
    pub fn write_cursor(&self) -> usize {
        self.w
    }

    /// Rewinds the read cursor to an earlier position.
    ///
    /// Used by codecs to implement atomic framing: on any non-`Ok` parse
    /// status the caller restores `r` to the value observed before parsing
    /// began, so a short or invalid frame never partially consumes input.
    ///
    /// # Panics
    /// Panics if `pos` is not `<= w`, since that would move the read cursor
    /// past the write cursor.
    pub fn set_read_cursor(&mut self, pos: usize) {
        assert!(pos <= self.w, "read cursor cannot pass the write cursor");
        self.r = pos;
    }

    /// Advances the read cursor by `n` bytes, consuming that much of the
    /// readable region.
    ///
    /// # Panics
    /// Panics if `n` would push `r` past `w`.
    pub fn advance_read(&mut self, n: usize) {
        assert!(n <= self.readable_size(), "advance_read past write cursor");
        self.r += n;
    }

    /// Advances the write cursor by `n` bytes after the caller has filled
    /// that much of [`writable_mut`].
    ///
    /// # Panics
    /// Panics if `n` would push `w` past capacity.
    pub fn advance_write(&mut self, n: usize) {
        assert!(n <= self.writable_size(), "advance_write past capacity");
        self.w += n;
    }

    /// Appends bytes to the writable region, growing first if necessary.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), DynBufError> {
        self.ensure_writable(bytes.len())?;
        let w = self.w;
        self.data[w..w + bytes.len()].copy_from_slice(bytes);
        self.advance_write(bytes.len());
        Ok(())
    }

    /// Doubles capacity in place.
    ///
    /// Fails with [`DynBufError::Overflow`] if `2 * C > max_size`; on success
    /// the byte content of `[0, w)` is preserved bit-exact and only the
    /// internal end pointer moves.
    pub fn double(&mut self) -> Result<(), DynBufError> {
        let nsize = self.capacity() * 2;
        if nsize > self.max_size {
            return Err(DynBufError::Overflow {
                max_size: self.max_size,
            });
        }
        self.resize_to(nsize);
        Ok(())
    }

    /// Grows to the smallest power-of-two multiple of `init_size` that is
    /// `>= cap`, subject to `max_size`.
    pub fn fit(&mut self, cap: usize) -> Result<(), DynBufError> {
        if cap > self.max_size {
            return Err(DynBufError::Overflow {
                max_size: self.max_size,
            });
        }
        let mut nsize = self.init_size;
        while nsize < cap {
            nsize *= 2;
        }
        if nsize > self.capacity() {
            self.resize_to(nsize);
        }
        Ok(())
    }

    /// Grows the buffer by repeated doubling until at least `extra` more
    /// writable bytes are available (or fails with [`DynBufError::Overflow`]
    /// if that would exceed `max_size`).
    ///
    /// This is the primitive codecs call before composing a response: an
    /// upper-bound write size is computed, `ensure_writable` is called once,
    /// and the compose path can then write without further capacity checks.
    pub fn ensure_writable(&mut self, extra: usize) -> Result<(), DynBufError> {
        while self.writable_size() < extra {
            self.double()?;
        }
        Ok(())
    }

    /// Reallocates back to `init_size`.
    ///
    /// # Panics
    /// Panics if `w > init_size`; the caller must drain or reset the buffer
    /// first, matching the reference implementation's precondition.
    pub fn shrink(&mut self) {
        assert!(
            self.w <= self.init_size,
            "cannot shrink a buffer with more than init_size bytes written"
        );
        self.resize_to(self.init_size);
    }

    /// Resets both cursors to zero without reallocating.
    pub fn reset(&mut self) {
        self.r = 0;
        self.w = 0;
    }

    /// Compacts the readable region down to the start of the buffer,
    /// discarding already-consumed bytes. Used between event-loop turns so
    /// unbounded `r` growth doesn't force premature doubling.
    pub fn compact(&mut self) {
        if self.r == 0 {
            return;
        }
        self.data.copy_within(self.r..self.w, 0);
        self.w -= self.r;
        self.r = 0;
    }

    fn resize_to(&mut self, nsize: usize) {
        let old = self.capacity();
        self.data.resize(nsize, 0);
        log::trace!("dynbuf resized from {old} to {nsize} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_at_init_size() {
        let buf = DynBuf::create(64, 1024);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.readable_size(), 0);
        assert_eq!(buf.writable_size(), 64);
    }

    #[test]
    fn double_preserves_content_and_grows() {
        let mut buf = DynBuf::create(8, 64);
        buf.put_slice(b"hello").unwrap();
        buf.double().unwrap();
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.readable(), b"hello");
    }

    #[test]
    fn double_respects_max_size() {
        let mut buf = DynBuf::create(8, 8);
        assert_eq!(buf.double(), Err(DynBufError::Overflow { max_size: 8 }));
    }

    #[test]
    fn fit_grows_to_smallest_power_of_two_multiple() {
        let mut buf = DynBuf::create(8, 1024);
        buf.fit(20).unwrap();
        assert_eq!(buf.capacity(), 32);
    }

    #[test]
    fn fit_is_noop_when_already_big_enough() {
        let mut buf = DynBuf::create(64, 1024);
        buf.fit(10).unwrap();
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn shrink_returns_to_init_size() {
        let mut buf = DynBuf::create(8, 1024);
        buf.fit(100).unwrap();
        buf.reset();
        buf.shrink();
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn reset_does_not_reallocate() {
        let mut buf = DynBuf::create(8, 1024);
        buf.put_slice(b"abc").unwrap();
        let cap = buf.capacity();
        buf.reset();
        assert_eq!(buf.capacity(), cap);
        assert_eq!(buf.readable_size(), 0);
    }

    #[test]
    fn compact_shifts_unread_bytes_to_front() {
        let mut buf = DynBuf::create(16, 1024);
        buf.put_slice(b"abcdef").unwrap();
        buf.advance_read(3);
        buf.compact();
        assert_eq!(buf.readable(), b"def");
        assert_eq!(buf.read_cursor(), 0);
    }

    #[test]
    fn ensure_writable_grows_until_sufficient() {
        let mut buf = DynBuf::create(4, 1024);
        buf.ensure_writable(100).unwrap();
        assert!(buf.writable_size() >= 100);
    }

    #[test]
    fn cursors_never_cross() {
        let mut buf = DynBuf::create(8, 64);
        buf.put_slice(b"ab").unwrap();
        assert!(buf.read_cursor() <= buf.write_cursor());
        buf.advance_read(2);
        assert!(buf.read_cursor() <= buf.write_cursor());
    }
}
