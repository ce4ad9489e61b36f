//! Writing PNA files.
//!
//! A [`PnaWriter`] reserves the header at offset 0 and then appends, never
//! seeking backwards until the final header rewrite. Packed bases and
//! fragment arrays land in stream order while sequences are written; string
//! storage, metadata arrays and the descriptor array follow at close, in
//! exactly that order, because each section's file position feeds the next.

use crate::layout::{
    Header, PNA_SIGNATURE, PNA_VERSION, SequenceDescriptor, Seqfragment, StringStorageRef,
};
use crate::metadata::MetadataWriter;
use crate::packer::{BASE_CODES, CODE_N};
use crate::string_table::{self, StringTable};
use log::warn;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Capacity of the packed write cache of one sequence writer.
pub const WRITEBUF_CAPACITY: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] io::Error),
    #[error("writer is closed")]
    FileClosed,
    #[error("no active sequence")]
    SequenceClosed,
    #[error("string storage error")]
    Strings(#[from] string_table::Error),
}

/// Per-sequence encoding state: the 2-bit accumulator, the fragment being
/// grown and the packed write cache.
#[derive(Debug)]
struct SequenceEncoder {
    descriptor: SequenceDescriptor,
    metadata: MetadataWriter,
    seq_offset: u64,
    packed_byte: u8,
    shift: u8,
    fragment: Option<Seqfragment>,
    fragments: Vec<Seqfragment>,
    cache: Vec<u8>,
    /// Packed bytes already written behind the cache.
    flushed: u64,
}

impl SequenceEncoder {
    fn new(packed_bases_filepos: u64) -> Self {
        SequenceEncoder {
            descriptor: SequenceDescriptor { packed_bases_filepos, ..Default::default() },
            metadata: MetadataWriter::new(),
            seq_offset: 0,
            packed_byte: 0,
            shift: 0,
            fragment: None,
            fragments: Vec::new(),
            cache: Vec::with_capacity(WRITEBUF_CAPACITY),
            flushed: 0,
        }
    }

    fn start_fragment(&mut self) {
        self.fragment = Some(Seqfragment {
            sequence_offset: self.seq_offset,
            packed_bases_offset: self.flushed + self.cache.len() as u64,
            bases_count: 1,
            shift: self.shift,
        });
    }

    fn write<W: Write>(&mut self, out: &mut W, buf: &[u8]) -> io::Result<()> {
        for &byte in buf {
            let code = BASE_CODES[usize::from(byte)];
            if code != CODE_N {
                match self.fragment {
                    None => self.start_fragment(),
                    Some(ref mut fragment) if fragment.bases_count < u32::MAX => {
                        fragment.bases_count += 1;
                    }
                    Some(fragment) => {
                        // Fragment length field is saturated; split.
                        self.fragments.push(fragment);
                        self.start_fragment();
                    }
                }
                self.packed_byte |= code << self.shift;
                self.shift += 2;
                if self.shift == 8 {
                    self.push_packed_byte(out)?;
                    self.shift = 0;
                    self.packed_byte = 0;
                }
            } else if let Some(fragment) = self.fragment.take() {
                // Packed state continues across Ns: the next fragment picks
                // up at the current shift.
                self.fragments.push(fragment);
            }
            self.seq_offset += 1;
        }
        Ok(())
    }

    /// Flushes the accumulator and cache, finalizes the descriptor and emits
    /// the fragment array right behind the packed bytes.
    fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.shift != 0 {
            // Partial final byte; unused high bits stay zero.
            self.push_packed_byte(out)?;
        }
        self.flush_cache(out)?;

        self.descriptor.bases_count = self.seq_offset;
        self.descriptor.packed_bases_length = self.flushed;

        if let Some(mut fragment) = self.fragment.take() {
            fragment.bases_count = (self.seq_offset - fragment.sequence_offset) as u32;
            self.fragments.push(fragment);
        }

        self.descriptor.seqfragments_filepos = self.descriptor.packed_bases_filepos + self.flushed;
        self.descriptor.seqfragments_count = self.fragments.len() as u64;

        let mut buf = Vec::with_capacity(self.fragments.len() * Seqfragment::BYTES);
        for fragment in &self.fragments {
            buf.extend_from_slice(&fragment.to_bytes());
        }
        out.write_all(&buf)?;
        Ok(())
    }

    fn push_packed_byte<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.cache.len() == WRITEBUF_CAPACITY {
            self.flush_cache(out)?;
        }
        self.cache.push(self.packed_byte);
        Ok(())
    }

    fn flush_cache<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.cache.is_empty() {
            out.write_all(&self.cache)?;
            self.flushed += self.cache.len() as u64;
            self.cache.clear();
        }
        Ok(())
    }
}

/// Writes one PNA file. One writer per output file; at most one active
/// sequence at a time (creating a new sequence closes the previous one).
#[derive(Debug)]
pub struct PnaWriter {
    file: Option<File>,
    path: PathBuf,
    header: Header,
    sequences: Vec<(SequenceDescriptor, MetadataWriter)>,
    strings: StringTable,
    file_metadata: MetadataWriter,
    active: Option<SequenceEncoder>,
}

impl PnaWriter {
    /// Creates `path` and reserves room for the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create(&path)?;
        file.seek(SeekFrom::Start(Header::BYTES as u64))?;
        let header = Header {
            signature: PNA_SIGNATURE,
            version: PNA_VERSION,
            sequences_filepos: Header::BYTES as u64,
            ..Default::default()
        };
        Ok(PnaWriter {
            file: Some(file),
            path,
            header,
            sequences: Vec::new(),
            strings: StringTable::new(),
            file_metadata: MetadataWriter::new(),
            active: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a file-level key/value pair.
    pub fn add_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::FileClosed);
        }
        self.file_metadata.add(&mut self.strings, key, value);
        Ok(())
    }

    /// Starts a new sequence, closing any prior active one.
    pub fn create_sequence(&mut self) -> Result<PnaSequenceWriter<'_>> {
        self.close_sequence()?;
        let file = self.file.as_mut().ok_or(Error::FileClosed)?;
        let packed_bases_filepos = file.stream_position()?;
        self.active = Some(SequenceEncoder::new(packed_bases_filepos));
        Ok(PnaSequenceWriter { writer: self })
    }

    /// Appends bases to the active sequence.
    pub fn write_bases(&mut self, buf: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::FileClosed)?;
        let encoder = self.active.as_mut().ok_or(Error::SequenceClosed)?;
        encoder.write(file, buf)?;
        Ok(())
    }

    /// Adds a key/value pair to the active sequence's metadata.
    pub fn add_sequence_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        let encoder = self.active.as_mut().ok_or(Error::SequenceClosed)?;
        encoder.metadata.add(&mut self.strings, key, value);
        Ok(())
    }

    fn close_sequence(&mut self) -> Result<()> {
        if let Some(mut encoder) = self.active.take() {
            let file = self.file.as_mut().ok_or(Error::FileClosed)?;
            encoder.finish(file)?;
            self.sequences.push((encoder.descriptor, encoder.metadata));
        }
        Ok(())
    }

    /// Closes the active sequence, writes string storage, the metadata
    /// arrays and the descriptor array, then rewrites the header. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.close_sequence()?;
        let file = self.file.as_mut().ok_or(Error::FileClosed)?;

        let strings = std::mem::take(&mut self.strings).finalize()?;
        let filepos = file.stream_position()?;
        file.write_all(strings.blob())?;
        self.header.string_storage =
            StringStorageRef { filepos, length: strings.blob().len() as u32 };

        for (descriptor, metadata) in &mut self.sequences {
            descriptor.metadata = metadata.write(file, &strings)?;
        }
        self.header.file_metadata = self.file_metadata.write(file, &strings)?;

        self.header.sequences_filepos = file.stream_position()?;
        self.header.sequences_count = self.sequences.len() as u64;
        let mut buf = Vec::with_capacity(self.sequences.len() * SequenceDescriptor::BYTES);
        for (descriptor, _) in &self.sequences {
            self.header.max_seqfragments_count =
                self.header.max_seqfragments_count.max(descriptor.seqfragments_count);
            self.header.max_packed_bases_length =
                self.header.max_packed_bases_length.max(descriptor.packed_bases_length);
            buf.extend_from_slice(&descriptor.to_bytes());
        }
        file.write_all(&buf)?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.header.to_bytes())?;
        self.file = None;
        Ok(())
    }
}

impl Drop for PnaWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                warn!("failed closing PNA writer for {}: {e}", self.path.display());
            }
        }
    }
}

/// Handle for the active sequence of a [`PnaWriter`].
#[derive(Debug)]
pub struct PnaSequenceWriter<'a> {
    writer: &'a mut PnaWriter,
}

impl PnaSequenceWriter<'_> {
    /// Appends bases. Bytes in `{A,a,C,c,G,g,T,t}` are packed; anything else
    /// is an `N` and only closes the current fragment.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_bases(buf)
    }

    /// Adds a key/value pair to this sequence's metadata.
    pub fn add_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.writer.add_sequence_metadata(key, value)
    }

    /// Logical bases written so far, Ns included.
    pub fn base_count(&self) -> Result<u64> {
        self.writer.active.as_ref().map(|e| e.seq_offset).ok_or(Error::SequenceClosed)
    }

    /// On-disk footprint so far: descriptor, finalized fragments and flushed
    /// packed bytes.
    pub fn byte_count(&self) -> Result<u64> {
        let encoder = self.writer.active.as_ref().ok_or(Error::SequenceClosed)?;
        Ok(SequenceDescriptor::BYTES as u64
            + (encoder.fragments.len() * Seqfragment::BYTES) as u64
            + encoder.flushed)
    }

    /// Finalizes this sequence. Further writes fail with
    /// [`Error::SequenceClosed`].
    pub fn close(&mut self) -> Result<()> {
        self.writer.close_sequence()
    }
}
