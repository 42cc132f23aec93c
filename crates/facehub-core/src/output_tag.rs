//! Bounded, nul-terminated copy of a tag for fixed-capacity output slots.

use std::borrow::Cow;
use std::fmt;

/// Capacity of the session's tag output slot, terminator included.
pub const TAG_CAPACITY: usize = 256;

/// A tag copy that never exceeds `CAP - 1` bytes and is always followed by a nul byte.
///
/// Truncation backs off to a UTF-8 character boundary, so the copy is always
/// valid UTF-8. The source string is never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputTag<const CAP: usize> {
    buf: [u8; CAP],
    len: usize,
}

impl<const CAP: usize> OutputTag<CAP> {
    const NONZERO_CAPACITY: () = assert!(CAP > 0, "OutputTag capacity must hold the terminator");

    pub fn new(tag: &str) -> Self {
        let mut out = Self::empty();
        out.set(tag);
        out
    }

    pub fn empty() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO_CAPACITY;
        Self { buf: [0u8; CAP], len: 0 }
    }

    /// Replace the contents with `tag`, truncated to at most `CAP - 1` bytes
    /// on a character boundary.
    pub fn set(&mut self, tag: &str) {
        let src = tag.as_bytes();
        let mut len = src.len().min(CAP - 1);
        while !tag.is_char_boundary(len) {
            len -= 1;
        }
        self.buf[..len].copy_from_slice(&src[..len]);
        self.buf[len..].fill(0);
        self.len = len;
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.len = 0;
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn was_truncated_from(&self, original: &str) -> bool {
        original.len() > self.len
    }

    /// Content bytes, terminator excluded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Content bytes followed by the nul terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    /// Truncation may split a multi-byte character; such a tail is replaced.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl<const CAP: usize> Default for OutputTag<CAP> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const CAP: usize> fmt::Debug for OutputTag<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTag")
            .field("capacity", &CAP)
            .field("value", &self.to_string_lossy())
            .finish()
    }
}

impl<const CAP: usize> fmt::Display for OutputTag<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
