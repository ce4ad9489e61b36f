//! Write-side string interning for the string storage blob.
//!
//! Strings are deduplicated while sequences are written and only laid out at
//! close: sorted lexicographically and concatenated with NUL terminators.
//! The sort is what makes binary search by key *offset* equivalent to binary
//! search by key *string* in the finished file.

use std::collections::BTreeMap;
use thiserror::Error;

/// Stable id handed out by [`StringTable::intern`], starting at 1.
pub type StringId = u32;

#[derive(Error, Debug)]
pub enum Error {
    /// The concatenated blob must be addressable with `u32` offsets.
    #[error("string storage capacity exceeded: {0} bytes")]
    CapacityExceeded(u64),
}

/// Deduplicating collector of all metadata keys and values of one file.
#[derive(Debug, Default)]
pub struct StringTable {
    ids: BTreeMap<String, StringId>,
}

impl StringTable {
    pub fn new() -> Self {
        StringTable::default()
    }

    /// Returns the id for `s`, interning it on first sight.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.ids.len() as StringId + 1;
        self.ids.insert(s.to_owned(), id);
        id
    }

    /// Lays out the blob and resolves every id to its byte offset.
    pub fn finalize(self) -> Result<FinalizedStrings, Error> {
        let mut blob = Vec::new();
        let mut offsets = vec![0u32; self.ids.len()];
        let mut offset = 0u64;
        // BTreeMap iteration delivers the strings in lexicographic order.
        for (string, id) in &self.ids {
            let len = string.len() as u64 + 1;
            if offset + len > u64::from(u32::MAX) {
                return Err(Error::CapacityExceeded(offset + len));
            }
            offsets[(id - 1) as usize] = offset as u32;
            blob.extend_from_slice(string.as_bytes());
            blob.push(0);
            offset += len;
        }
        Ok(FinalizedStrings { blob, offsets })
    }
}

/// The laid-out blob plus the id → offset map used to emit metadata entries.
#[derive(Debug)]
pub struct FinalizedStrings {
    blob: Vec<u8>,
    offsets: Vec<u32>,
}

impl FinalizedStrings {
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Byte offset of an interned string. Ids come from the same table, so an
    /// unknown id is a caller bug and panics.
    pub fn offset(&self, id: StringId) -> u32 {
        self.offsets[(id - 1) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicates_share_an_id() {
        let mut table = StringTable::new();
        let a = table.intern("seqio.name");
        let b = table.intern("seq1");
        let c = table.intern("seqio.name");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn blob_is_sorted_and_nul_separated() -> color_eyre::Result<()> {
        let mut table = StringTable::new();
        let z = table.intern("z");
        let a = table.intern("a");
        let m = table.intern("m");
        let strings = table.finalize()?;

        assert_eq!(strings.blob(), b"a\0m\0z\0");
        assert_eq!(strings.offset(a), 0);
        assert_eq!(strings.offset(m), 2);
        assert_eq!(strings.offset(z), 4);
        Ok(())
    }

    #[test]
    fn offsets_order_matches_string_order() -> color_eyre::Result<()> {
        let mut table = StringTable::new();
        let pairs: Vec<(String, StringId)> = ["pear", "apple", "quince", "apple", "fig"]
            .iter()
            .map(|&s| (s.to_string(), table.intern(s)))
            .collect();
        let strings = table.finalize()?;
        for (left, lid) in &pairs {
            for (right, rid) in &pairs {
                assert_eq!(left < right, strings.offset(*lid) < strings.offset(*rid), "{left} vs {right}");
            }
        }
        Ok(())
    }
}
