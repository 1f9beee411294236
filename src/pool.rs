//! String Interning Pool
//!
//! Append-only storage with deduplication for element names, attribute
//! names, sheet names, and namespace aliases. Interning is idempotent and
//! a handle's bytes are never invalidated for the life of the pool.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};

/// Handle to an interned string. Compares equal iff the contents are equal.
pub type StrId = u32;

/// 32-bit FNV-1a over a byte slice.
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Hasher wrapping [`fnv1a`] so the index map hashes by content the same
/// way standalone hashing does.
pub struct FnvHasher(u32);

impl Default for FnvHasher {
    fn default() -> Self {
        FnvHasher(0x811c_9dc5)
    }
}

impl Hasher for FnvHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        let mut hash = self.0;
        for &b in bytes {
            hash ^= b as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        self.0 = hash;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0 as u64
    }
}

type FnvBuildHasher = BuildHasherDefault<FnvHasher>;

/// String interning pool
#[derive(Debug)]
pub struct StringPool {
    /// All strings stored contiguously
    data: Vec<u8>,
    /// Map from string content to its handle
    index: HashMap<Vec<u8>, StrId, FnvBuildHasher>,
    /// Entries: (offset, length) pairs
    entries: Vec<(u32, u32)>,
}

impl Default for StringPool {
    fn default() -> Self {
        StringPool::new()
    }
}

impl StringPool {
    /// Create a new empty string pool
    pub fn new() -> Self {
        let mut pool = StringPool {
            data: Vec::with_capacity(4096),
            index: HashMap::default(),
            entries: Vec::with_capacity(256),
        };
        // Entry 0 is reserved for the empty string
        pool.entries.push((0, 0));
        pool
    }

    /// Intern a string, returning its handle.
    ///
    /// If the string already exists, returns the existing handle.
    pub fn intern(&mut self, s: &[u8]) -> StrId {
        if s.is_empty() {
            return 0;
        }

        if let Some(&id) = self.index.get(s) {
            return id;
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s);

        let id = self.entries.len() as StrId;
        self.entries.push((offset, s.len() as u32));
        self.index.insert(s.to_vec(), id);

        id
    }

    /// Get a string by handle
    pub fn get(&self, id: StrId) -> &[u8] {
        let (offset, len) = self.entries[id as usize];
        &self.data[offset as usize..offset as usize + len as usize]
    }

    /// Get a string by handle as UTF-8
    pub fn get_str(&self, id: StrId) -> &str {
        std::str::from_utf8(self.get(id)).unwrap_or("")
    }

    /// Number of unique strings stored (including the reserved empty entry)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}
