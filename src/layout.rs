//! On-disk records of the PNA format.
//!
//! All integers are little-endian and all records are tightly packed, so the
//! encoded sizes below are exact and independent of the host ABI.
//!
//! File layout:
//! ```text
//! [Header]                          (72 bytes, rewritten on close)
//! [packed bases + fragment arrays]  (per sequence, in stream order)
//! [string storage]                  (NUL-separated, lexicographically sorted)
//! [per-sequence metadata arrays]    (MetadataEntry[], sorted by key offset)
//! [file metadata array]
//! [SequenceDescriptor array]        (52 bytes each, at sequences_filepos)
//! ```

/// Magic constant at offset 0 of every PNA file.
pub const PNA_SIGNATURE: u64 = u64::from_le_bytes(*b"seqioPNA");

/// Current version of the on-disk layout.
pub const PNA_VERSION: u64 = 1;

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Location of a metadata entry array: `{entries_filepos: u64, entries_count: u32}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataRef {
    pub entries_filepos: u64,
    pub entries_count: u32,
}

impl MetadataRef {
    pub const BYTES: usize = 12;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.entries_filepos.to_le_bytes());
        buf[8..12].copy_from_slice(&self.entries_count.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        MetadataRef { entries_filepos: u64_at(buf, 0), entries_count: u32_at(buf, 8) }
    }
}

/// Location of the string storage blob: `{filepos: u64, length: u32}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringStorageRef {
    pub filepos: u64,
    pub length: u32,
}

impl StringStorageRef {
    pub const BYTES: usize = 12;
}

/// Fixed-size record at file offset 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub signature: u64,
    pub version: u64,
    pub sequences_filepos: u64,
    pub sequences_count: u64,
    /// Largest `seqfragments_count` over all sequences, a buffer-sizing hint.
    pub max_seqfragments_count: u64,
    /// Largest `packed_bases_length` over all sequences, a buffer-sizing hint.
    pub max_packed_bases_length: u64,
    pub file_metadata: MetadataRef,
    pub string_storage: StringStorageRef,
}

impl Header {
    pub const BYTES: usize = 72;

    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut buf = [0u8; Self::BYTES];
        buf[0..8].copy_from_slice(&self.signature.to_le_bytes());
        buf[8..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.sequences_filepos.to_le_bytes());
        buf[24..32].copy_from_slice(&self.sequences_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.max_seqfragments_count.to_le_bytes());
        buf[40..48].copy_from_slice(&self.max_packed_bases_length.to_le_bytes());
        self.file_metadata.encode_into(&mut buf[48..60]);
        buf[60..68].copy_from_slice(&self.string_storage.filepos.to_le_bytes());
        buf[68..72].copy_from_slice(&self.string_storage.length.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::BYTES]) -> Self {
        Header {
            signature: u64_at(buf, 0),
            version: u64_at(buf, 8),
            sequences_filepos: u64_at(buf, 16),
            sequences_count: u64_at(buf, 24),
            max_seqfragments_count: u64_at(buf, 32),
            max_packed_bases_length: u64_at(buf, 40),
            file_metadata: MetadataRef::decode(&buf[48..60]),
            string_storage: StringStorageRef { filepos: u64_at(buf, 60), length: u32_at(buf, 68) },
        }
    }
}

/// One per sequence, stored contiguously at `Header::sequences_filepos`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceDescriptor {
    /// Logical length including implicit Ns.
    pub bases_count: u64,
    pub packed_bases_filepos: u64,
    pub packed_bases_length: u64,
    pub seqfragments_filepos: u64,
    pub seqfragments_count: u64,
    pub metadata: MetadataRef,
}

impl SequenceDescriptor {
    pub const BYTES: usize = 52;

    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut buf = [0u8; Self::BYTES];
        buf[0..8].copy_from_slice(&self.bases_count.to_le_bytes());
        buf[8..16].copy_from_slice(&self.packed_bases_filepos.to_le_bytes());
        buf[16..24].copy_from_slice(&self.packed_bases_length.to_le_bytes());
        buf[24..32].copy_from_slice(&self.seqfragments_filepos.to_le_bytes());
        buf[32..40].copy_from_slice(&self.seqfragments_count.to_le_bytes());
        self.metadata.encode_into(&mut buf[40..52]);
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::BYTES]) -> Self {
        SequenceDescriptor {
            bases_count: u64_at(buf, 0),
            packed_bases_filepos: u64_at(buf, 8),
            packed_bases_length: u64_at(buf, 16),
            seqfragments_filepos: u64_at(buf, 24),
            seqfragments_count: u64_at(buf, 32),
            metadata: MetadataRef::decode(&buf[40..52]),
        }
    }
}

/// One maximal run of A/C/G/T bases. The gaps between fragments are implicit
/// runs of `N` and occupy no packed bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Seqfragment {
    /// Logical base offset where the run starts.
    pub sequence_offset: u64,
    /// Byte offset within the sequence's packed blob holding the run's first base.
    pub packed_bases_offset: u64,
    pub bases_count: u32,
    /// Bit position (0, 2, 4 or 6) of the first base inside that byte.
    pub shift: u8,
}

impl Seqfragment {
    pub const BYTES: usize = 21;

    /// Logical base offset one past the run's last base.
    pub fn end(&self) -> u64 {
        self.sequence_offset + u64::from(self.bases_count)
    }

    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut buf = [0u8; Self::BYTES];
        buf[0..8].copy_from_slice(&self.sequence_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.packed_bases_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.bases_count.to_le_bytes());
        buf[20] = self.shift;
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::BYTES]) -> Self {
        Seqfragment {
            sequence_offset: u64_at(buf, 0),
            packed_bases_offset: u64_at(buf, 8),
            bases_count: u32_at(buf, 16),
            shift: buf[20],
        }
    }
}

/// A key/value pair; both fields are byte offsets into the string storage blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: u32,
    pub value: u32,
}

impl MetadataEntry {
    pub const BYTES: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut buf = [0u8; Self::BYTES];
        buf[0..4].copy_from_slice(&self.key.to_le_bytes());
        buf[4..8].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::BYTES]) -> Self {
        MetadataEntry { key: u32_at(buf, 0), value: u32_at(buf, 4) }
    }
}
