//! # Growable byte buffer with a read cursor
//!
//! Used for outgoing command frames and for accumulating module responses.
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

/// Errors of buffer operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// Growing the buffer failed
    OutOfMemory,

    /// Requested range exceeds the buffer length
    OutOfRange,
}

/// Byte sequence with an internal read position
///
/// `append_*` methods return the offset at which data was written. `get_*` methods advance
/// the read position, `peek_*` methods leave it untouched.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,

    /// Next index to read from, 0 <= position <= data.len()
    position: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled buffer of the given length
    pub fn zeroed(length: usize) -> Result<Self, BufferError> {
        let mut buffer = Self::new();
        buffer.append_extra(length)?;
        Ok(buffer)
    }

    /// Creates a buffer holding a copy of the given bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, BufferError> {
        let mut buffer = Self::new();
        buffer.append_slice(data)?;
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the read position. Fails if the position is not inside the buffer.
    pub fn set_position(&mut self, position: usize) -> bool {
        if position >= self.data.len() {
            return false;
        }

        self.position = position;
        true
    }

    /// Advances the read position by `count` bytes
    pub fn skip(&mut self, count: usize) -> bool {
        match self.position.checked_add(count) {
            Some(position) => self.set_position(position),
            None => false,
        }
    }

    /// True if all bytes have been read
    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Zeroes `count` bytes starting at `position`. A count of zero clears up to the end.
    pub fn zero(&mut self, position: usize, count: usize) -> bool {
        let count = if count == 0 {
            match self.data.len().checked_sub(position) {
                Some(rest) => rest,
                None => return false,
            }
        } else {
            count
        };

        match self.data.get_mut(position..position.saturating_add(count)) {
            Some(range) => {
                range.fill(0);
                true
            }
            None => false,
        }
    }

    /// Drops all bytes before the read position and resets the position to zero
    pub fn remove_read_bytes(&mut self) {
        self.data.drain(..self.position);
        self.position = 0;
    }

    pub fn append_slice(&mut self, value: &[u8]) -> Result<usize, BufferError> {
        let offset = self.data.len();
        self.reserve(value.len())?;
        self.data.extend_from_slice(value);
        Ok(offset)
    }

    pub fn append_str(&mut self, value: &str) -> Result<usize, BufferError> {
        self.append_slice(value.as_bytes())
    }

    pub fn append_byte(&mut self, value: u8) -> Result<usize, BufferError> {
        self.append_slice(&[value])
    }

    /// Appends the big-endian IEEE-754 representation
    pub fn append_f32(&mut self, value: f32) -> Result<usize, BufferError> {
        self.append_slice(&value.to_be_bytes())
    }

    /// Appends the big-endian IEEE-754 representation
    pub fn append_f64(&mut self, value: f64) -> Result<usize, BufferError> {
        self.append_slice(&value.to_be_bytes())
    }

    /// Appends `count` bytes of `other` starting at `position`. A count of zero copies the rest.
    pub fn append_buffer(&mut self, other: &ByteBuffer, position: usize, count: usize) -> Result<usize, BufferError> {
        let end = if count == 0 {
            other.len()
        } else {
            position.checked_add(count).ok_or(BufferError::OutOfRange)?
        };

        let range = other.data.get(position..end).ok_or(BufferError::OutOfRange)?;
        self.append_slice(range)
    }

    /// Moves `count` unread bytes of `other` into this buffer, advancing its read position.
    /// A count of zero moves all unread bytes.
    pub fn append_unread(&mut self, other: &mut ByteBuffer, count: usize) -> Result<usize, BufferError> {
        let count = if count == 0 { other.remaining() } else { count };
        let data = other.get(count).ok_or(BufferError::OutOfRange)?;
        self.append_slice(data)
    }

    /// Grows the buffer by `count` zero bytes
    pub fn append_extra(&mut self, count: usize) -> Result<usize, BufferError> {
        let offset = self.data.len();
        self.reserve(count)?;
        self.data.resize(offset + count, 0);
        Ok(offset)
    }

    /// Resets length and read position
    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Shortens the buffer, keeping the read position inside
    pub fn truncate(&mut self, length: usize) {
        self.data.truncate(length);
        self.position = self.position.min(self.data.len());
    }

    /// Returns the next `count` bytes and advances the read position
    pub fn get(&mut self, count: usize) -> Option<&[u8]> {
        let start = self.position;
        let end = start.checked_add(count)?;
        if end > self.data.len() {
            return None;
        }

        self.position = end;
        Some(&self.data[start..end])
    }

    /// Copies the next bytes into `target` and advances the read position
    pub fn get_into(&mut self, target: &mut [u8]) -> bool {
        match self.get(target.len()) {
            Some(data) => {
                target.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Copies the next bytes into `target` without moving the read position
    pub fn peek_into(&self, target: &mut [u8]) -> bool {
        let end = match self.position.checked_add(target.len()) {
            Some(end) if end <= self.data.len() => end,
            _ => return false,
        };

        target.copy_from_slice(&self.data[self.position..end]);
        true
    }

    /// Byte at the given offset from the read position
    pub fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.data.get(self.position.checked_add(offset)?).copied()
    }

    /// Byte at the given offset counted backwards from the last byte
    pub fn peek_byte_at_end(&self, offset: usize) -> Option<u8> {
        let index = self.data.len().checked_sub(offset)?.checked_sub(1)?;
        self.data.get(index).copied()
    }

    /// Number of bytes not read yet
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// All bytes, independent of the read position
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Offset of the first occurrence of `needle`
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        find(&self.data, needle)
    }

    fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.data.try_reserve(additional).map_err(|_| BufferError::OutOfMemory)
    }
}

impl Index<usize> for ByteBuffer {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.data[index]
    }
}

impl IndexMut<usize> for ByteBuffer {
    fn index_mut(&mut self, index: usize) -> &mut u8 {
        &mut self.data[index]
    }
}

/// Exact substring search. An empty needle matches at offset zero.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}
