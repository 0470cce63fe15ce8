//! Immutable byte payloads
//!
//! A [`ByteView`] is the unit of data stored in and returned from the cache.
//! It wraps either an owned byte buffer or a shared text value; that detail
//! is invisible to callers, which see a read-only byte payload with cheap
//! clones. Copies out of a view are always explicit.

use bytes::Bytes;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

/// An immutable view of bytes.
///
/// `ByteView` is meant to be used as a value type. Cloning is cheap (the
/// underlying storage is reference-counted) and the contents can never be
/// mutated, which is what allows the cache to hand the same view to many
/// callers at once.
///
/// # Example
///
/// ```
/// use peercache::ByteView;
///
/// let view = ByteView::from("#FF0000");
/// assert_eq!(view.len(), 7);
/// assert_eq!(view.as_bytes(), b"#FF0000");
/// ```
#[derive(Debug, Clone)]
pub struct ByteView {
    repr: Repr,
}

#[derive(Debug, Clone)]
enum Repr {
    /// Owned byte buffer
    Bytes(Bytes),
    /// Shared text value
    Text(Arc<str>),
}

impl ByteView {
    /// Create an empty view
    pub fn new() -> Self {
        Self {
            repr: Repr::Bytes(Bytes::new()),
        }
    }

    /// Length of the payload in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Borrow the payload as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Bytes(b) => b,
            Repr::Text(s) => s.as_bytes(),
        }
    }

    /// Borrow the payload as text, if it is held as text
    pub fn as_text(&self) -> Option<&str> {
        match &self.repr {
            Repr::Bytes(_) => None,
            Repr::Text(s) => Some(s),
        }
    }

    /// Byte at index `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn at(&self, i: usize) -> u8 {
        self.as_bytes()[i]
    }

    /// Sub-view over `range`, without copying the underlying storage when
    /// the payload is held as owned bytes
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> ByteView {
        match &self.repr {
            Repr::Bytes(b) => ByteView {
                repr: Repr::Bytes(b.slice(range)),
            },
            Repr::Text(s) => ByteView::from(&s[range]),
        }
    }

    /// Copy the payload into `dest`, returning the number of bytes copied
    ///
    /// Copies at most `dest.len()` bytes.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let src = self.as_bytes();
        let n = src.len().min(dest.len());
        dest[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Copy the payload into a fresh `Vec<u8>`
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Convert into an owned [`Bytes`] buffer, copying only when the
    /// payload is held as text
    pub fn into_bytes(self) -> Bytes {
        match self.repr {
            Repr::Bytes(b) => b,
            Repr::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
        }
    }
}

impl Default for ByteView {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Bytes> for ByteView {
    fn from(b: Bytes) -> Self {
        Self {
            repr: Repr::Bytes(b),
        }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(b: Vec<u8>) -> Self {
        Self {
            repr: Repr::Bytes(Bytes::from(b)),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(b: &[u8]) -> Self {
        Self {
            repr: Repr::Bytes(Bytes::copy_from_slice(b)),
        }
    }
}

impl From<String> for ByteView {
    fn from(s: String) -> Self {
        Self {
            repr: Repr::Text(Arc::from(s.as_str())),
        }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self {
            repr: Repr::Text(Arc::from(s)),
        }
    }
}

impl PartialEq for ByteView {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteView {}

impl PartialEq<[u8]> for ByteView {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for ByteView {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl PartialEq<str> for ByteView {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Hash for ByteView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}
