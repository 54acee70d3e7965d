//! Fingerprint filter behind `Db::may_exist`.
//!
//! Each live key contributes one CRC32C fingerprint truncated to
//! `filter_bits` bits. A probe hits when some live key shares the
//! fingerprint: false positives happen on collisions, false negatives never.

use hashbrown::HashMap;

/// Counting set of key fingerprints.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    counts: HashMap<u32, u32>,
    mask: u32,
}

impl KeyFilter {
    pub fn new(bits: u8) -> Self {
        let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
        Self { counts: HashMap::new(), mask }
    }

    fn fingerprint(&self, key: &[u8]) -> u32 {
        crc32c::crc32c(key) & self.mask
    }

    /// Record a key that became live.
    pub fn insert(&mut self, key: &[u8]) {
        let fp = self.fingerprint(key);
        *self.counts.entry(fp).or_insert(0) += 1;
    }

    /// Forget a key that was live.
    pub fn remove(&mut self, key: &[u8]) {
        let fp = self.fingerprint(key);
        if let Some(count) = self.counts.get_mut(&fp) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&fp);
            }
        }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.counts.contains_key(&self.fingerprint(key))
    }
}
