//! A classical position/limit/capacity byte window, in the style of
//! `java.nio.ByteBuffer`. This is the working buffer the selector loop
//! reads socket bytes into and the decoder substrate parses out of.
//!
//! `slice` and `duplicate` share the underlying storage (an `Rc<RefCell<Vec<u8>>>`)
//! while keeping independent cursors, so a decoder can hand a zero-copy
//! view of "the bytes for this field" to a caller without buffering a
//! second copy. Because of the `Rc`, a `Buffer` is confined to the thread
//! that owns it (the `SelectorProcessor` worker); outbound payloads that
//! must cross threads are carried as `bytes::Bytes` instead (see
//! [`crate::write_queue`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A resizable byte buffer with `position <= limit <= capacity` enforced
/// at every mutation.
#[derive(Clone)]
pub struct Buffer {
    storage: Rc<RefCell<Vec<u8>>>,
    position: usize,
    limit: usize,
}

impl Buffer {
    /// Allocates a new buffer of `capacity` bytes, position 0, limit ==
    /// capacity (ready for `put`).
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            storage: Rc::new(RefCell::new(vec![0u8; capacity])),
            position: 0,
            limit: capacity,
        }
    }

    /// Wraps existing bytes as a buffer ready for `get` (position 0,
    /// limit == data length).
    pub fn wrap(data: Vec<u8>) -> Self {
        let limit = data.len();
        Buffer {
            storage: Rc::new(RefCell::new(data)),
            position: 0,
            limit,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn capacity(&self) -> usize {
        self.storage.borrow().len()
    }

    /// Bytes remaining between `position` and `limit`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn set_position(&mut self, position: usize) {
        assert!(position <= self.limit, "position past limit");
        self.position = position;
    }

    pub fn set_limit(&mut self, limit: usize) {
        assert!(limit <= self.capacity(), "limit past capacity");
        self.limit = limit;
        if self.position > self.limit {
            self.position = self.limit;
        }
    }

    /// `position <- 0`. Leaves `limit` untouched.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// `limit <- position; position <- 0`. Switches a buffer that was
    /// being filled (via `put`) to one ready to be drained (via `get`).
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// `clear` resets position to 0 and limit to capacity, discarding any
    /// notion of what was previously written (contents are not zeroed).
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Shifts the unread `[position, limit)` region to the start of the
    /// buffer, sets `position <- remaining`, `limit <- capacity`. Used to
    /// preserve a decoder's unconsumed tail across reads.
    pub fn compact(&mut self) {
        let remaining = self.remaining();
        {
            let mut storage = self.storage.borrow_mut();
            storage.copy_within(self.position..self.limit, 0);
        }
        self.position = remaining;
        self.limit = self.capacity();
    }

    /// A single byte at the current position, advancing position by one.
    pub fn get_u8(&mut self) -> u8 {
        assert!(self.has_remaining(), "buffer underflow");
        let byte = self.storage.borrow()[self.position];
        self.position += 1;
        byte
    }

    /// Copies `min(dst.len(), remaining())` bytes out, advancing position
    /// by that many bytes, and returns the count copied.
    pub fn get_bytes(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        let storage = self.storage.borrow();
        dst[..n].copy_from_slice(&storage[self.position..self.position + n]);
        drop(storage);
        self.position += n;
        n
    }

    /// Writes a single byte at the current position, advancing position
    /// by one. The underlying storage grows if `position == capacity`.
    pub fn put_u8(&mut self, byte: u8) {
        self.reserve_for(1);
        self.storage.borrow_mut()[self.position] = byte;
        self.position += 1;
        if self.position > self.limit {
            self.limit = self.position;
        }
    }

    /// Copies all of `src` in, advancing position and growing storage as
    /// needed.
    pub fn put_bytes(&mut self, src: &[u8]) {
        self.reserve_for(src.len());
        self.storage.borrow_mut()[self.position..self.position + src.len()].copy_from_slice(src);
        self.position += src.len();
        if self.position > self.limit {
            self.limit = self.position;
        }
    }

    fn reserve_for(&mut self, n: usize) {
        let needed = self.position + n;
        let mut storage = self.storage.borrow_mut();
        if needed > storage.len() {
            storage.resize(needed, 0);
        }
    }

    /// A read-only view of `[position, limit)` without copying or
    /// advancing this buffer's own cursor.
    pub fn bytes(&self) -> Vec<u8> {
        self.storage.borrow()[self.position..self.limit].to_vec()
    }

    /// A new buffer over `[position, position+len)` of this buffer's
    /// storage, sharing the same backing memory but with its own cursors
    /// (position 0, limit `len`). Does not advance this buffer's cursor.
    pub fn slice(&self, len: usize) -> Buffer {
        assert!(len <= self.remaining(), "slice beyond remaining");
        Buffer {
            storage: self.storage.clone(),
            position: self.position,
            limit: self.position + len,
        }
    }

    /// A new buffer sharing this buffer's storage and current
    /// position/limit, but with an independent cursor going forward.
    pub fn duplicate(&self) -> Buffer {
        Buffer {
            storage: self.storage.clone(),
            position: self.position,
            limit: self.limit,
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_then_drain() {
        let mut buf = Buffer::with_capacity(16);
        buf.put_bytes(b"hello");
        assert_eq!(buf.position(), 5);
        buf.flip();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 5);
        let mut out = [0u8; 5];
        let n = buf.get_bytes(&mut out);
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
        assert!(!buf.has_remaining());
    }

    #[test]
    fn compact_preserves_tail() {
        let mut buf = Buffer::with_capacity(8);
        buf.put_bytes(b"abcdef");
        buf.flip();
        buf.get_u8();
        buf.get_u8();
        buf.compact();
        assert_eq!(buf.position(), 4);
        assert_eq!(buf.limit(), buf.capacity());
        buf.flip();
        assert_eq!(buf.bytes(), b"cdef");
    }

    #[test]
    fn slice_shares_storage() {
        let mut buf = Buffer::with_capacity(8);
        buf.put_bytes(b"abcdef");
        buf.flip();
        let s = buf.slice(3);
        assert_eq!(s.bytes(), b"abc");
        // advancing the original does not affect the slice's own cursor
        buf.get_u8();
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn invariant_position_le_limit_le_capacity() {
        let mut buf = Buffer::with_capacity(4);
        buf.set_limit(4);
        buf.set_position(4);
        assert!(buf.position() <= buf.limit());
        assert!(buf.limit() <= buf.capacity());
    }
}
