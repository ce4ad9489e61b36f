//! Reading PNA files.
//!
//! [`PnaReader`] validates the header, maps the metadata region and hands out
//! [`PnaSequenceReader`]s. A sequence reader borrows a private file handle
//! from the reader's pool, so distinct sequence readers can run on distinct
//! threads against the same file.

use crate::fd_pool::{FdGuard, FdPool};
use crate::fragments::FragmentIndex;
use crate::layout::{
    Header, MetadataRef, PNA_SIGNATURE, PNA_VERSION, SequenceDescriptor, Seqfragment,
};
use crate::metadata::{self, PnaMetadata};
use crate::packer::{BASE_CHARS, PACKED_LOOKUP};
use bytesize::ByteSize;
use log::debug;
use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Capacity of the packed read cache of one sequence reader.
pub const READBUF_CAPACITY: usize = 4 * 1024;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] io::Error),
    #[error("PNA file signature not found")]
    Signature,
    #[error("unsupported PNA version {0}")]
    UnsupportedVersion(u64),
    #[error("sequence index out of bounds: {index} >= {count}")]
    IndexOutOfBounds { index: u64, count: u64 },
    #[error("file region {filepos}+{len} outside mapped range")]
    RegionOutOfBounds { filepos: u64, len: u64 },
    #[error("attempting to read a base byte when none remain")]
    PackedExhausted,
    #[error("packed read buffer too small: {cap} < {required}")]
    BufferTooSmall { cap: u64, required: u64 },
    #[error("sequence reader is closed")]
    Closed,
    #[error("metadata error")]
    Metadata(#[from] metadata::Error),
}

/// Flags for [`PnaReader::open_sequence`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceFlags {
    /// Elide implicit `N` bases from read output instead of emitting `'N'`.
    pub ignore_n: bool,
}

impl SequenceFlags {
    pub const IGNORE_N: SequenceFlags = SequenceFlags { ignore_n: true };
}

/// Shared state of one open PNA file: header, handle pool and the mapped
/// region covering string storage through the descriptor array.
struct PnaFile {
    path: PathBuf,
    pool: FdPool,
    header: Header,
    /// Mapped from file offset 0 so raw file positions index the slice
    /// directly; pages before the string storage are never touched.
    map: Mmap,
}

impl fmt::Debug for PnaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} sequences, {} mapped",
            self.path.display(),
            self.header.sequences_count,
            ByteSize(self.map.len() as u64)
        )
    }
}

impl PnaFile {
    fn region(&self, filepos: u64, len: u64) -> Result<&[u8]> {
        let end = filepos.checked_add(len).ok_or(Error::RegionOutOfBounds { filepos, len })?;
        self.map
            .get(filepos as usize..end as usize)
            .ok_or(Error::RegionOutOfBounds { filepos, len })
    }

    fn strings(&self) -> Result<&[u8]> {
        let storage = self.header.string_storage;
        self.region(storage.filepos, u64::from(storage.length))
    }

    fn metadata_view(&self, metadata: MetadataRef) -> Result<PnaMetadata<'_>> {
        let len = u64::from(metadata.entries_count) * crate::layout::MetadataEntry::BYTES as u64;
        let entries = self.region(metadata.entries_filepos, len)?;
        Ok(PnaMetadata::new(entries, metadata.entries_count, self.strings()?))
    }

    fn descriptor(&self, index: u64) -> Result<SequenceDescriptor> {
        if index >= self.header.sequences_count {
            return Err(Error::IndexOutOfBounds { index, count: self.header.sequences_count });
        }
        let filepos = self.header.sequences_filepos + index * SequenceDescriptor::BYTES as u64;
        let bytes = self.region(filepos, SequenceDescriptor::BYTES as u64)?;
        Ok(SequenceDescriptor::from_bytes(bytes.try_into().unwrap()))
    }
}

/// An open PNA file. Cheap to share; all operations are read-only.
#[derive(Debug)]
pub struct PnaReader {
    file: Arc<PnaFile>,
}

impl PnaReader {
    /// Opens `path`, validates signature and version and maps the region
    /// from string storage through the end of the descriptor array.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pool = FdPool::new(&path);
        let mut guard = pool.acquire()?;
        let file = guard.file().ok_or(Error::Closed)?;

        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; Header::BYTES];
        file.read_exact(&mut buf)?;
        let header = Header::from_bytes(&buf);
        if header.signature != PNA_SIGNATURE {
            return Err(Error::Signature);
        }
        if header.version != PNA_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }

        let end = header.sequences_filepos
            + header.sequences_count * SequenceDescriptor::BYTES as u64;
        // Safety: a PNA file is immutable once its writer has closed it; the
        // mapping is read-only and never observes concurrent modification.
        let map = unsafe { MmapOptions::new().len(end as usize).map(&*file)? };

        debug!(
            "opened PNA {} with {} sequences, {} mapped",
            path.display(),
            header.sequences_count,
            ByteSize(map.len() as u64)
        );
        Ok(PnaReader { file: Arc::new(PnaFile { path, pool, header, map }) })
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn sequence_count(&self) -> u64 {
        self.file.header.sequences_count
    }

    /// Largest fragment count over all sequences, for buffer sizing.
    pub fn max_seqfragments(&self) -> u64 {
        self.file.header.max_seqfragments_count
    }

    /// Largest packed blob length over all sequences, for buffer sizing.
    pub fn max_packed_bases_length(&self) -> u64 {
        self.file.header.max_packed_bases_length
    }

    /// File-level metadata view.
    pub fn metadata(&self) -> Result<PnaMetadata<'_>> {
        self.file.metadata_view(self.file.header.file_metadata)
    }

    /// Metadata view of the sequence at `index`.
    pub fn sequence_metadata(&self, index: u64) -> Result<PnaMetadata<'_>> {
        let descriptor = self.file.descriptor(index)?;
        self.file.metadata_view(descriptor.metadata)
    }

    /// Opens the sequence at `index` with a private file handle.
    pub fn open_sequence(&self, index: u64, flags: SequenceFlags) -> Result<PnaSequenceReader> {
        let descriptor = self.file.descriptor(index)?;
        let mut guard = self.file.pool.acquire()?;

        let mut fragments = Vec::with_capacity(descriptor.seqfragments_count as usize);
        {
            let file = guard.file().ok_or(Error::Closed)?;
            file.seek(SeekFrom::Start(descriptor.seqfragments_filepos))?;
            let mut raw = vec![0u8; descriptor.seqfragments_count as usize * Seqfragment::BYTES];
            file.read_exact(&mut raw)?;
            for chunk in raw.chunks_exact(Seqfragment::BYTES) {
                fragments.push(Seqfragment::from_bytes(chunk.try_into().unwrap()));
            }
        }

        Ok(PnaSequenceReader {
            file: Arc::clone(&self.file),
            guard,
            descriptor,
            fragments: FragmentIndex::new(fragments),
            next: 0,
            shift: 0,
            seq_offset: 0,
            ignore_n: flags.ignore_n,
            cache: PackedCache::new(),
        })
    }
}

struct PackedCache {
    buf: Box<[u8]>,
    len: usize,
    index: usize,
    /// Offset within the packed blob of the first cached byte.
    bases_offset: u64,
    curr: u8,
}

impl PackedCache {
    fn new() -> Self {
        PackedCache {
            buf: vec![0u8; READBUF_CAPACITY].into_boxed_slice(),
            len: 0,
            index: 0,
            bases_offset: 0,
            curr: 0,
        }
    }

    fn reset(&mut self, bases_offset: u64) {
        self.len = 0;
        self.index = 0;
        self.bases_offset = bases_offset;
    }
}

impl fmt::Debug for PackedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache at +{} ({}/{} consumed)", self.bases_offset, self.index, self.len)
    }
}

/// Random-access, optionally N-eliding byte stream over one packed sequence.
///
/// Bases are delivered in logical order; [`seek`](Self::seek) is the only way
/// to reposition. The reader owns a snapshot of the sequence's fragment array
/// and a borrowed file handle that returns to the pool on drop or
/// [`close`](Self::close).
#[derive(Debug)]
pub struct PnaSequenceReader {
    file: Arc<PnaFile>,
    guard: FdGuard,
    descriptor: SequenceDescriptor,
    fragments: FragmentIndex,
    /// Index of the next fragment to deliver; `fragments.len()` when only
    /// trailing `N`s remain.
    next: usize,
    shift: u8,
    seq_offset: u64,
    ignore_n: bool,
    cache: PackedCache,
}

impl PnaSequenceReader {
    /// Logical length in bases, implicit `N`s included.
    pub fn size(&self) -> u64 {
        self.descriptor.bases_count
    }

    /// Number of A/C/G/T runs in this sequence.
    pub fn fragment_count(&self) -> u64 {
        self.descriptor.seqfragments_count
    }

    /// The sequence's fragment array; gaps between fragments are implicit
    /// `N` runs.
    pub fn fragments(&self) -> &[Seqfragment] {
        self.fragments.as_slice()
    }

    /// Metadata view of this sequence.
    pub fn metadata(&self) -> Result<PnaMetadata<'_>> {
        self.file.metadata_view(self.descriptor.metadata)
    }

    /// Returns the file handle to the pool early. Idempotent; subsequent
    /// reads fail with [`Error::Closed`].
    pub fn close(&mut self) {
        self.guard.release();
    }

    /// Repositions the logical read offset, recomputing the packed byte
    /// position and bit shift from the fragment index.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if self.fragments.is_empty() {
            self.seq_offset = offset;
            return Ok(());
        }

        self.next = self.fragments.find_next(offset);
        match self.fragments.get(self.next).copied() {
            Some(fragment) => {
                let mut packed_bases_offset = fragment.packed_bases_offset;
                if offset < fragment.sequence_offset {
                    // Inside the N gap before the fragment: adopt its shift.
                    self.shift = fragment.shift;
                } else {
                    let mut rel = offset - fragment.sequence_offset;
                    self.shift = ((u64::from(fragment.shift / 2) + rel) % 4) as u8 * 2;
                    // Bases in the fragment's first, partially used byte.
                    let nfirstbyte = u64::from((4 - fragment.shift / 2) % 4);
                    if rel >= nfirstbyte {
                        if nfirstbyte > 0 {
                            rel -= nfirstbyte;
                            packed_bases_offset += 1;
                        }
                        packed_bases_offset += rel / 4;
                    }
                }
                self.cache.reset(packed_bases_offset);
                if self.shift != 0 {
                    // Prefetch the byte holding the first base; the unpack
                    // path only pulls a byte when the shift wraps to 0.
                    self.next_byte()?;
                }
            }
            None => {
                // Only trailing Ns remain; position past the packed bytes.
                self.cache.reset(self.descriptor.packed_bases_length);
            }
        }
        self.seq_offset = offset;
        Ok(())
    }

    /// Reads up to `buf.len()` bases, returning the number of bytes written.
    ///
    /// With `ignore_n`, elided `N`s extend the logical window so the caller
    /// still receives `buf.len()` non-N bases when that many remain; the
    /// return value is then short only at end of sequence.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0usize;
        let remaining = self.descriptor.bases_count.saturating_sub(self.seq_offset);
        let mut end = self.seq_offset + (buf.len() as u64).min(remaining);

        while self.seq_offset < end {
            let ncount = match self.fragments.get(self.next) {
                None => end - self.seq_offset,
                Some(f) if self.seq_offset < f.sequence_offset => {
                    (end - self.seq_offset).min(f.sequence_offset - self.seq_offset)
                }
                Some(_) => 0,
            };
            if ncount > 0 {
                if self.ignore_n {
                    end = (end + ncount).min(self.descriptor.bases_count);
                } else {
                    buf[written..written + ncount as usize].fill(b'N');
                    written += ncount as usize;
                }
                self.seq_offset += ncount;
            }

            while let Some(fragment) = self.fragments.get(self.next).copied() {
                if self.seq_offset < fragment.sequence_offset || self.seq_offset >= end {
                    break;
                }
                let mut count = (u64::from(fragment.bases_count)
                    - (self.seq_offset - fragment.sequence_offset))
                    .min(end - self.seq_offset);
                self.seq_offset += count;

                // Head: single bases until the packed byte is aligned.
                let head = count.min(u64::from((4 - self.shift / 2) % 4));
                for _ in 0..head {
                    buf[written] = self.unpack_one()?;
                    written += 1;
                }
                count -= head;

                // Middle: one packed byte decodes to four bases.
                for _ in 0..count / 4 {
                    self.next_byte()?;
                    buf[written..written + 4]
                        .copy_from_slice(&PACKED_LOOKUP[usize::from(self.cache.curr)]);
                    written += 4;
                }

                // Tail: the remaining partial byte.
                for _ in 0..count % 4 {
                    buf[written] = self.unpack_one()?;
                    written += 1;
                }

                if self.seq_offset == fragment.end() {
                    self.next += 1;
                }
            }
        }
        Ok(written)
    }

    /// Bulk copy of the raw packed bytes plus the fragment slice, for callers
    /// that decode themselves. Fails if `buf` is smaller than the blob.
    pub fn packed_read<'a>(&'a mut self, buf: &'a mut [u8]) -> Result<PackedRead<'a>> {
        let length = self.descriptor.packed_bases_length;
        if (buf.len() as u64) < length {
            return Err(Error::BufferTooSmall { cap: buf.len() as u64, required: length });
        }
        let packed_bases_count = match self.fragments.as_slice().last() {
            Some(last) => {
                last.packed_bases_offset * 4
                    + u64::from(last.shift / 2)
                    + u64::from(last.bases_count)
            }
            None => 0,
        };
        let file = self.guard.file().ok_or(Error::Closed)?;
        file.seek(SeekFrom::Start(self.descriptor.packed_bases_filepos))?;
        file.read_exact(&mut buf[..length as usize])?;
        Ok(PackedRead {
            bases_count: self.descriptor.bases_count,
            fragments: self.fragments.as_slice(),
            packed_bases: &buf[..length as usize],
            packed_bases_count,
        })
    }

    fn unpack_one(&mut self) -> Result<u8> {
        if self.shift == 0 {
            self.next_byte()?;
        }
        let base = BASE_CHARS[usize::from((self.cache.curr >> self.shift) & 0x3)];
        self.shift += 2;
        if self.shift == 8 {
            self.shift = 0;
        }
        Ok(base)
    }

    fn next_byte(&mut self) -> Result<()> {
        if self.cache.index == self.cache.len {
            let consumed = self.cache.bases_offset + self.cache.len as u64;
            if consumed >= self.descriptor.packed_bases_length {
                return Err(Error::PackedExhausted);
            }
            let len =
                READBUF_CAPACITY.min((self.descriptor.packed_bases_length - consumed) as usize);
            let filepos = self.descriptor.packed_bases_filepos + consumed;
            let file = self.guard.file().ok_or(Error::Closed)?;
            file.seek(SeekFrom::Start(filepos))?;
            file.read_exact(&mut self.cache.buf[..len])?;
            self.cache.bases_offset = consumed;
            self.cache.len = len;
            self.cache.index = 0;
        }
        self.cache.curr = self.cache.buf[self.cache.index];
        self.cache.index += 1;
        Ok(())
    }
}

/// Result of [`PnaSequenceReader::packed_read`].
#[derive(Debug)]
pub struct PackedRead<'a> {
    /// Logical length in bases, implicit `N`s included.
    pub bases_count: u64,
    pub fragments: &'a [Seqfragment],
    pub packed_bases: &'a [u8],
    /// Bases actually held by the packed bytes (implicit `N`s excluded).
    pub packed_bases_count: u64,
}
