//! Hash-bucket table used by the builder to intern written bytes.
//!
//! Each bucket holds up to [`BUCKET_ENTRIES`] `(hash, offset, len)` entries;
//! a full bucket chains to a fresh one. Hashes are the first four bytes of a
//! BLAKE3 digest over the bytes being written.

/// Entries per bucket before chaining.
pub(crate) const BUCKET_ENTRIES: usize = 40;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    hash: u32,
    offset: u32,
    len: u32,
}

#[derive(Debug, Clone)]
struct Bucket {
    entries: [Entry; BUCKET_ENTRIES],
    used: usize,
}

impl Bucket {
    fn new() -> Self {
        Self {
            entries: [Entry::default(); BUCKET_ENTRIES],
            used: 0,
        }
    }

    fn live(&self) -> &[Entry] {
        &self.entries[..self.used]
    }
}

/// Counters reported by [`DedupTable::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Distinct byte runs recorded.
    pub entries: usize,
    /// Writes satisfied by an existing run.
    pub hits: usize,
    /// Bytes not written thanks to hits.
    pub bytes_saved: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct DedupTable {
    chains: Vec<Vec<Bucket>>,
    stats: DedupStats,
}

impl DedupTable {
    pub(crate) fn new(num_buckets: usize) -> Self {
        Self {
            chains: vec![Vec::new(); num_buckets.max(1)],
            stats: DedupStats::default(),
        }
    }

    /// Content hash of the concatenation of `parts`.
    pub(crate) fn hash(parts: &[&[u8]]) -> u32 {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();
        let b = digest.as_bytes();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn chain(&self, hash: u32) -> usize {
        hash as usize % self.chains.len()
    }

    /// Offset of an earlier run with this hash and length that `same`
    /// confirms byte-for-byte and that satisfies `align`.
    pub(crate) fn find(
        &mut self,
        hash: u32,
        len: u32,
        align: usize,
        mut same: impl FnMut(u32) -> bool,
    ) -> Option<u32> {
        let chain = self.chain(hash);
        let found = self.chains[chain]
            .iter()
            .flat_map(Bucket::live)
            .filter(|e| e.hash == hash && e.len == len)
            .filter(|e| e.offset as usize % align.max(1) == 0)
            .find(|e| same(e.offset))
            .map(|e| e.offset);
        if found.is_some() {
            self.stats.hits += 1;
            self.stats.bytes_saved += len as usize;
        }
        found
    }

    pub(crate) fn insert(&mut self, hash: u32, offset: u32, len: u32) {
        let chain = self.chain(hash);
        let buckets = &mut self.chains[chain];
        if buckets.last().is_none_or(|b| b.used == BUCKET_ENTRIES) {
            buckets.push(Bucket::new());
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.entries[bucket.used] = Entry { hash, offset, len };
            bucket.used += 1;
        }
        self.stats.entries += 1;
    }

    pub(crate) fn clear(&mut self) {
        for chain in &mut self.chains {
            chain.clear();
        }
        self.stats = DedupStats::default();
    }

    pub(crate) fn stats(&self) -> DedupStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_concatenation() {
        assert_eq!(
            DedupTable::hash(&[b"ab", b"cd"]),
            DedupTable::hash(&[b"abcd"])
        );
        assert_ne!(DedupTable::hash(&[b"abcd"]), DedupTable::hash(&[b"abce"]));
    }

    #[test]
    fn finds_only_confirmed_entries() {
        let mut t = DedupTable::new(4);
        t.insert(7, 16, 3);
        assert_eq!(t.find(7, 3, 1, |_| true), Some(16));
        assert_eq!(t.find(7, 4, 1, |_| true), None);
        assert_eq!(t.find(7, 3, 1, |_| false), None);
        assert_eq!(t.stats().hits, 1);
        assert_eq!(t.stats().bytes_saved, 3);
    }

    #[test]
    fn respects_alignment() {
        let mut t = DedupTable::new(1);
        t.insert(1, 6, 4);
        assert_eq!(t.find(1, 4, 2, |_| true), Some(6));
        assert_eq!(t.find(1, 4, 4, |_| true), None);
    }

    #[test]
    fn overflowing_bucket_chains() {
        let mut t = DedupTable::new(1);
        for i in 0..(BUCKET_ENTRIES as u32 * 2 + 3) {
            t.insert(i, i * 4, 4);
        }
        assert_eq!(t.chains[0].len(), 3);
        let probe = BUCKET_ENTRIES as u32 + 1;
        assert_eq!(t.find(probe, 4, 4, |_| true), Some(probe * 4));
        assert_eq!(t.stats().entries, BUCKET_ENTRIES * 2 + 3);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut t = DedupTable::new(2);
        t.insert(1, 0, 1);
        t.clear();
        assert_eq!(t.find(1, 1, 1, |_| true), None);
        assert_eq!(t.stats(), DedupStats::default());
    }
}
