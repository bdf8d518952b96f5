//! Observational size counters for written and read records.

/// Counters describing the entries a record occupies in the store.
///
/// Populated by every save and read operation and consumed by the
/// minimal-overwrite logic of the writer, which uses the previous save's
/// counters to decide how much of the old record needs clearing.
///
/// The byte counters describe **durable** bytes: the 4-byte offset tail
/// of an incomplete version value is consumed by the store at commit and
/// is therefore excluded from `value_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredSizes {
    /// Number of entries the record occupies.
    pub key_count: u32,
    /// Total size of all keys in bytes.
    pub key_size: u64,
    /// Total size of all values in bytes.
    pub value_size: u64,
    /// `true` if the payload is chunked across split entries.
    pub split: bool,
    /// `true` if a version entry accompanies the record.
    pub versioned_inline: bool,
}

impl StoredSizes {
    /// Resets the counters to describe a single entry.
    pub fn set_entry(&mut self, key: &[u8], value: &[u8]) {
        self.key_count = 1;
        self.key_size = key.len() as u64;
        self.value_size = value.len() as u64;
    }

    /// Adds one entry to the counters.
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) {
        self.key_count += 1;
        self.key_size += key.len() as u64;
        self.value_size += value.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_resets_add_accumulates() {
        let mut sizes = StoredSizes::default();
        sizes.add_entry(b"key", b"value");
        sizes.set_entry(b"k", b"v");
        assert_eq!(sizes.key_count, 1);
        assert_eq!(sizes.key_size, 1);
        assert_eq!(sizes.value_size, 1);
        sizes.add_entry(b"kk", b"vv");
        assert_eq!(sizes.key_count, 2);
        assert_eq!(sizes.key_size, 3);
        assert_eq!(sizes.value_size, 3);
    }
}
