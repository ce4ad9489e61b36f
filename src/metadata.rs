//! Key/value metadata attached to a file or to a sequence.
//!
//! On disk a metadata table is an array of `(key, value)` string-storage
//! offsets sorted by key offset. Because string storage itself is sorted
//! lexicographically, that array is also sorted by key string, and lookup is
//! a binary search that dereferences offsets into the blob.

use crate::layout::{MetadataEntry, MetadataRef};
use crate::string_table::{FinalizedStrings, StringId, StringTable};
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use std::{io, str};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("metadata index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: u32, len: u32 },
    #[error("string offset {0} outside string storage")]
    StringOffset(u32),
    #[error("metadata string is not valid UTF-8")]
    InvalidUtf8(#[from] str::Utf8Error),
}

/// Read-only view over one metadata table inside a mapped PNA region.
#[derive(Debug, Clone, Copy)]
pub struct PnaMetadata<'a> {
    entries: &'a [u8],
    count: u32,
    strings: &'a [u8],
}

impl<'a> PnaMetadata<'a> {
    /// `entries` must hold `count` packed [`MetadataEntry`] records and
    /// `strings` the file's string storage blob.
    pub(crate) fn new(entries: &'a [u8], count: u32, strings: &'a [u8]) -> Self {
        PnaMetadata { entries, count, strings }
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The pair at `index`; pairs are ordered alphabetically by key.
    pub fn pair(&self, index: u32) -> Result<(&'a str, &'a str)> {
        if index >= self.count {
            return Err(Error::IndexOutOfBounds { index, len: self.count });
        }
        let entry = self.entry(index as usize);
        let key = str::from_utf8(self.cstr(entry.key)?)?;
        let value = str::from_utf8(self.cstr(entry.value)?)?;
        Ok((key, value))
    }

    /// Binary search by key string.
    pub fn get(&self, key: &str) -> Result<Option<&'a str>> {
        let mut low = 0usize;
        let mut high = self.count as usize;
        while low < high {
            let mid = usize::midpoint(low, high);
            let entry = self.entry(mid);
            match key.as_bytes().cmp(self.cstr(entry.key)?) {
                std::cmp::Ordering::Less => high = mid,
                std::cmp::Ordering::Greater => low = mid + 1,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(str::from_utf8(self.cstr(entry.value)?)?));
                }
            }
        }
        Ok(None)
    }

    /// All pairs copied into an owned dictionary.
    pub fn to_dict(&self) -> Result<Dict> {
        let mut dict = Dict::new();
        for index in 0..self.count {
            let (key, value) = self.pair(index)?;
            dict.set(key, value);
        }
        Ok(dict)
    }

    fn entry(&self, index: usize) -> MetadataEntry {
        let offset = index * MetadataEntry::BYTES;
        let bytes: &[u8; MetadataEntry::BYTES] =
            self.entries[offset..offset + MetadataEntry::BYTES].try_into().unwrap();
        MetadataEntry::from_bytes(bytes)
    }

    /// The NUL-terminated string starting at `offset` in the blob.
    fn cstr(&self, offset: u32) -> Result<&'a [u8]> {
        let rest = self.strings.get(offset as usize..).ok_or(Error::StringOffset(offset))?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        Ok(&rest[..end])
    }
}

/// Write-side collector for one metadata table. Keys and values are interned
/// immediately; offsets are only known once the string table is finalized.
#[derive(Debug, Default)]
pub struct MetadataWriter {
    entries: BTreeMap<StringId, StringId>,
}

impl MetadataWriter {
    pub fn new() -> Self {
        MetadataWriter::default()
    }

    /// Records `key` → `value`. A repeated key overwrites the earlier value.
    pub fn add(&mut self, strings: &mut StringTable, key: &str, value: &str) {
        self.entries.insert(strings.intern(key), strings.intern(value));
    }

    /// Resolves ids to final offsets, sorts by key offset and emits the
    /// entry array at the current file position.
    pub fn write<W: Write + Seek>(
        &self, out: &mut W, strings: &FinalizedStrings,
    ) -> io::Result<MetadataRef> {
        let entries_filepos = out.stream_position()?;
        let mut entries: Vec<MetadataEntry> = self
            .entries
            .iter()
            .map(|(&key, &value)| MetadataEntry { key: strings.offset(key), value: strings.offset(value) })
            .collect();
        // Offset order equals alphabetic key order in the sorted blob.
        entries.sort_unstable_by_key(|entry| entry.key);

        let mut buf = Vec::with_capacity(entries.len() * MetadataEntry::BYTES);
        for entry in &entries {
            buf.extend_from_slice(&entry.to_bytes());
        }
        out.write_all(&buf)?;
        Ok(MetadataRef { entries_filepos, entries_count: entries.len() as u32 })
    }
}

/// Owned string-keyed dictionary used to pass metadata in and out of the
/// format-agnostic API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    entries: BTreeMap<String, String>,
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Dict { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
