//! Consistent-hash ring
//!
//! Maps keys to peer identifiers through a ring of virtual nodes. Each peer
//! occupies `replicas` positions on the ring, which keeps ownership shares
//! close to uniform; a key is owned by the peer at the first ring position
//! at or after the key's hash, wrapping around at the top.
//!
//! The ring is rebuilt from scratch on any membership change; there is no
//! incremental add or remove.

use std::collections::HashMap;

/// Default number of virtual nodes per peer
pub const DEFAULT_REPLICAS: usize = 50;

/// Hash over byte strings to a 32-bit ring position
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// A consistent-hash ring with virtual nodes.
///
/// # Example
///
/// ```
/// use peercache::ring::Ring;
///
/// let mut ring = Ring::new(50);
/// ring.add_peers(["http://10.0.0.1:8000", "http://10.0.0.2:8000"]);
/// let owner = ring.get("user42").unwrap();
/// assert!(owner.starts_with("http://10.0.0."));
/// ```
pub struct Ring {
    replicas: usize,
    hash: HashFn,
    /// Virtual-node hashes, ascending
    hashes: Vec<u32>,
    /// Virtual-node hash -> peer identifier; on hash collision across
    /// peers the last writer wins
    owners: HashMap<u32, String>,
}

impl Ring {
    /// Create an empty ring using CRC32/IEEE as the hash function.
    ///
    /// # Panics
    ///
    /// Panics if `replicas` is zero.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Box::new(crc32fast::hash))
    }

    /// Create an empty ring with a custom hash function.
    ///
    /// # Panics
    ///
    /// Panics if `replicas` is zero.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        assert!(replicas >= 1, "ring requires at least one replica per peer");
        Self {
            replicas,
            hash,
            hashes: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Add peers to the ring.
    ///
    /// For each peer, `replicas` virtual nodes are hashed from
    /// `<decimal index><peer id>` and inserted; the hash sequence is
    /// re-sorted after the batch.
    pub fn add_peers<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();
            for i in 0..self.replicas {
                let virtual_key = format!("{i}{peer}");
                let hash = (self.hash)(virtual_key.as_bytes());
                self.hashes.push(hash);
                self.owners.insert(hash, peer.clone());
            }
        }
        self.hashes.sort_unstable();
    }

    /// Whether the ring has no peers
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// The peer owning `key`, or `None` on an empty ring.
    ///
    /// Binary-searches for the first virtual node at or after the key's
    /// hash, wrapping to the ring start when the hash is beyond the last
    /// node.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let mut idx = self.hashes.partition_point(|&h| h < hash);
        if idx == self.hashes.len() {
            idx = 0;
        }
        self.owners.get(&self.hashes[idx]).map(String::as_str)
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.hashes.len())
            .finish()
    }
}
