//! LRU engine
//!
//! An ordered map with bounded capacity and an eviction callback. Entries
//! live in a slab of index-linked nodes; a hash index maps each key to its
//! slot. The list front is the most recently used entry, the back is the
//! oldest.
//!
//! The engine is not thread-safe; synchronization is the caller's
//! responsibility (see [`super::CacheTier`]).

use std::collections::HashMap;

use crate::byteview::ByteView;

/// Sentinel slot index for "no node"
const NIL: usize = usize::MAX;

/// Callback invoked once per removed entry with the evicted key and value
pub type EvictionCallback = Box<dyn FnMut(&str, &ByteView) + Send>;

struct Node {
    key: String,
    value: ByteView,
    prev: usize,
    next: usize,
}

/// An LRU cache over string keys and [`ByteView`] values.
///
/// With `max_entries == 0` the cache is unbounded and eviction is driven
/// entirely by the caller (via [`remove_oldest`](LruCache::remove_oldest)).
///
/// # Example
///
/// ```
/// use peercache::cache::LruCache;
/// use peercache::ByteView;
///
/// let mut cache = LruCache::new(2);
/// cache.add("a", ByteView::from("1"));
/// cache.add("b", ByteView::from("2"));
/// cache.add("c", ByteView::from("3")); // evicts "a"
/// assert!(cache.get("a").is_none());
/// assert!(cache.get("c").is_some());
/// ```
pub struct LruCache {
    max_entries: usize,
    on_evict: Option<EvictionCallback>,
    index: HashMap<String, usize>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl LruCache {
    /// Create a cache evicting its oldest entry once more than
    /// `max_entries` entries are present (0 = unbounded)
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            on_evict: None,
            index: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Install a callback invoked exactly once per removed entry, with the
    /// entry's key and value
    pub fn with_eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.on_evict = Some(callback);
        self
    }

    /// Insert or replace `key`.
    ///
    /// The entry becomes the most recently used. Returns the previous value
    /// when the key was already present; replacement does not invoke the
    /// eviction callback.
    pub fn add(&mut self, key: &str, value: ByteView) -> Option<ByteView> {
        if let Some(&slot) = self.index.get(key) {
            let old = std::mem::replace(&mut self.nodes[slot].value, value);
            self.move_to_front(slot);
            return Some(old);
        }

        let slot = self.alloc_node(key.to_owned(), value);
        self.push_front(slot);
        self.index.insert(key.to_owned(), slot);

        if self.max_entries != 0 && self.index.len() > self.max_entries {
            self.remove_oldest();
        }
        None
    }

    /// Look up `key`, marking the entry as most recently used on a hit
    pub fn get(&mut self, key: &str) -> Option<&ByteView> {
        let slot = *self.index.get(key)?;
        self.move_to_front(slot);
        Some(&self.nodes[slot].value)
    }

    /// Remove `key` if present, invoking the eviction callback
    pub fn remove(&mut self, key: &str) {
        if let Some(&slot) = self.index.get(key) {
            self.remove_slot(slot);
        }
    }

    /// Remove the oldest entry, invoking the eviction callback
    pub fn remove_oldest(&mut self) {
        if self.tail != NIL {
            self.remove_slot(self.tail);
        }
    }

    /// Number of entries currently cached
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remove every entry, invoking the eviction callback for each
    pub fn clear(&mut self) {
        while self.tail != NIL {
            self.remove_slot(self.tail);
        }
    }

    fn alloc_node(&mut self, key: String, value: ByteView) -> usize {
        let node = Node {
            key,
            value,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        self.unlink(slot);
        let key = std::mem::take(&mut self.nodes[slot].key);
        let value = std::mem::take(&mut self.nodes[slot].value);
        self.index.remove(&key);
        self.free.push(slot);
        if let Some(callback) = self.on_evict.as_mut() {
            callback(&key, &value);
        }
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn unlink(&mut self, slot: usize) {
        let prev = self.nodes[slot].prev;
        let next = self.nodes[slot].next;
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = NIL;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    #[cfg(test)]
    fn oldest_key(&self) -> Option<&str> {
        if self.tail == NIL {
            None
        } else {
            Some(&self.nodes[self.tail].key)
        }
    }

    #[cfg(test)]
    fn newest_key(&self) -> Option<&str> {
        if self.head == NIL {
            None
        } else {
            Some(&self.nodes[self.head].key)
        }
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_entries", &self.max_entries)
            .field("len", &self.index.len())
            .finish()
    }
}
