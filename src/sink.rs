//! Value sinks
//!
//! A [`Sink`] is the caller-supplied destination a value is delivered into.
//! Loaders populate the sink they are handed; the cache then takes the
//! sink's frozen [`ByteView`] for storage. On the way out, values are copied
//! into the caller's buffer, decoded into a message, or handed over as a
//! view, depending on the sink variant.
//!
//! Sinks that can adopt an existing view without copying override
//! [`Sink::set_view`]; for everything else the default forwards to the
//! byte/text setters, so the fast path is resolved statically instead of by
//! runtime type probing.

use prost::Message;

use crate::byteview::ByteView;
use crate::error::{Error, Result};

/// Destination for a value produced by a cache lookup or a loader.
///
/// A loader must call exactly one of the setters on success. After a setter
/// has been called, [`view`](Sink::view) returns the frozen payload.
pub trait Sink: Send {
    /// Set the value to a copy of `value`.
    ///
    /// The caller retains ownership of `value`; implementations that keep
    /// the bytes clone them, so cached data is never aliased with a
    /// caller-owned mutable buffer.
    fn set_bytes(&mut self, value: &[u8]) -> Result<()>;

    /// Set the value to a copy of `value` held as text.
    fn set_text(&mut self, value: &str) -> Result<()>;

    /// The frozen view of the value this sink currently holds.
    ///
    /// Returns [`Error::SinkUnset`] if no setter has been called yet.
    fn view(&self) -> Result<ByteView>;

    /// Adopt an existing view.
    ///
    /// This is the copy-free fast path used when the value is already held
    /// in memory as a [`ByteView`]. The default forwards to
    /// [`set_text`](Sink::set_text) or [`set_bytes`](Sink::set_bytes)
    /// according to the view's representation.
    fn set_view(&mut self, view: ByteView) -> Result<()> {
        match view.as_text() {
            Some(text) => self.set_text(text),
            None => self.set_bytes(view.as_bytes()),
        }
    }
}

/// Encode `message` and store the encoded form in `dest`.
///
/// This is how protobuf-producing loaders hand a message to any sink
/// variant.
pub fn set_proto<M: Message>(dest: &mut dyn Sink, message: &M) -> Result<()> {
    dest.set_bytes(&message.encode_to_vec())
}

// =============================================================================
// Allocating byte sink
// =============================================================================

/// Sink that allocates a fresh buffer for the value and writes it into the
/// caller's destination vector.
///
/// The destination buffer is always a private copy; the bytes retained by
/// the cache are never aliased with it.
///
/// # Example
///
/// ```
/// use peercache::sink::{ByteSink, Sink};
///
/// let mut value = Vec::new();
/// let mut sink = ByteSink::new(&mut value);
/// sink.set_bytes(b"payload").unwrap();
/// assert_eq!(value, b"payload");
/// ```
pub struct ByteSink<'a> {
    dest: &'a mut Vec<u8>,
    view: Option<ByteView>,
}

impl<'a> ByteSink<'a> {
    /// Create a sink writing into `dest`
    pub fn new(dest: &'a mut Vec<u8>) -> Self {
        Self { dest, view: None }
    }
}

impl Sink for ByteSink<'_> {
    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        *self.dest = value.to_vec();
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn set_text(&mut self, value: &str) -> Result<()> {
        *self.dest = value.as_bytes().to_vec();
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        self.view.clone().ok_or(Error::SinkUnset)
    }

    fn set_view(&mut self, view: ByteView) -> Result<()> {
        *self.dest = view.to_vec();
        self.view = Some(view);
        Ok(())
    }
}

// =============================================================================
// Truncating byte sink
// =============================================================================

/// Sink that copies at most the destination's current length.
///
/// If the value is shorter than the destination, the destination is shrunk
/// to fit; if it is longer, the excess is silently dropped. The retained
/// view always holds the complete value.
pub struct TruncatingByteSink<'a> {
    dest: &'a mut Vec<u8>,
    view: Option<ByteView>,
}

impl<'a> TruncatingByteSink<'a> {
    /// Create a sink writing into `dest`, bounded by `dest.len()`
    pub fn new(dest: &'a mut Vec<u8>) -> Self {
        Self { dest, view: None }
    }

    fn copy_truncated(&mut self, value: &[u8]) {
        let n = value.len().min(self.dest.len());
        self.dest[..n].copy_from_slice(&value[..n]);
        if n < self.dest.len() {
            self.dest.truncate(n);
        }
    }
}

impl Sink for TruncatingByteSink<'_> {
    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.copy_truncated(value);
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn set_text(&mut self, value: &str) -> Result<()> {
        self.copy_truncated(value.as_bytes());
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        self.view.clone().ok_or(Error::SinkUnset)
    }
}

// =============================================================================
// View sink
// =============================================================================

/// Sink that captures the view directly, without copying.
///
/// Because [`ByteView`] storage is reference-counted and immutable, the
/// captured view stays valid for as long as the caller keeps it.
pub struct ViewSink<'a> {
    dest: &'a mut ByteView,
    set: bool,
}

impl<'a> ViewSink<'a> {
    /// Create a sink capturing into `dest`
    pub fn new(dest: &'a mut ByteView) -> Self {
        Self { dest, set: false }
    }
}

impl Sink for ViewSink<'_> {
    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        *self.dest = ByteView::from(value);
        self.set = true;
        Ok(())
    }

    fn set_text(&mut self, value: &str) -> Result<()> {
        *self.dest = ByteView::from(value);
        self.set = true;
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        if self.set {
            Ok(self.dest.clone())
        } else {
            Err(Error::SinkUnset)
        }
    }

    fn set_view(&mut self, view: ByteView) -> Result<()> {
        *self.dest = view;
        self.set = true;
        Ok(())
    }
}

// =============================================================================
// String sink
// =============================================================================

/// Sink that populates the caller's `String`.
///
/// Byte values must be valid UTF-8.
pub struct StringSink<'a> {
    dest: &'a mut String,
    view: Option<ByteView>,
}

impl<'a> StringSink<'a> {
    /// Create a sink writing into `dest`
    pub fn new(dest: &'a mut String) -> Self {
        Self { dest, view: None }
    }
}

impl Sink for StringSink<'_> {
    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(value)?;
        self.set_text(text)
    }

    fn set_text(&mut self, value: &str) -> Result<()> {
        *self.dest = value.to_owned();
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        self.view.clone().ok_or(Error::SinkUnset)
    }
}

// =============================================================================
// Proto sink
// =============================================================================

/// Sink that decodes the value into the caller's protobuf message.
///
/// The retained view holds the encoded form.
pub struct ProtoSink<'a, M> {
    dest: &'a mut M,
    view: Option<ByteView>,
}

impl<'a, M: Message + Default> ProtoSink<'a, M> {
    /// Create a sink decoding into `dest`
    pub fn new(dest: &'a mut M) -> Self {
        Self { dest, view: None }
    }
}

impl<M: Message + Default> Sink for ProtoSink<'_, M> {
    fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        *self.dest = M::decode(value)?;
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn set_text(&mut self, value: &str) -> Result<()> {
        *self.dest = M::decode(value.as_bytes())?;
        self.view = Some(ByteView::from(value));
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        self.view.clone().ok_or(Error::SinkUnset)
    }
}
