//! Format dispatch and the format-agnostic sequence API.
//!
//! Callers name a path and, optionally, a format; `Deduce` sniffs the PNA
//! signature for reading and the file extension for writing. The returned
//! iterator, sequence and writer values behave identically for every format.

use crate::fasta::{BaseTransform, FastaSequence, FastaSequenceIterator, FastaWriter};
use crate::layout::{Header, PNA_SIGNATURE};
use crate::metadata::{self, Dict};
use crate::reader::{self, PnaReader, PnaSequenceReader, SequenceFlags};
use crate::writer::{self, PnaWriter};
use crate::{KEY_COMMENT, KEY_NAME};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of every error this crate can produce, the way a
/// C-style façade would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    InvalidParameter,
    InvalidState,
    FileNotFound,
    Io,
    KeyNotFound,
    OutOfMemory,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] io::Error),
    #[error("failed reading PNA data")]
    Reader(#[from] reader::Error),
    #[error("failed writing PNA data")]
    Writer(#[from] writer::Error),
    #[error("metadata error")]
    Metadata(#[from] metadata::Error),
    #[error("cannot deduce file format of {}", .0.display())]
    UnknownFormat(PathBuf),
    #[error("no active sequence")]
    NoActiveSequence,
    #[error("metadata key not found: {0}")]
    KeyNotFound(String),
    #[error("out of memory growing read buffer")]
    OutOfMemory,
}

impl Error {
    /// The [`Status`] this error maps onto.
    pub fn status(&self) -> Status {
        match self {
            Error::Io(e) if e.kind() == io::ErrorKind::NotFound => Status::FileNotFound,
            Error::Io(_) => Status::Io,
            Error::Reader(reader::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Status::FileNotFound
            }
            Error::Reader(
                reader::Error::IndexOutOfBounds { .. } | reader::Error::BufferTooSmall { .. },
            ) => Status::InvalidParameter,
            Error::Reader(reader::Error::Closed) => Status::InvalidState,
            Error::Reader(_) => Status::Io,
            Error::Writer(writer::Error::FileClosed | writer::Error::SequenceClosed) => {
                Status::InvalidState
            }
            Error::Writer(_) => Status::Io,
            Error::Metadata(metadata::Error::IndexOutOfBounds { .. }) => Status::InvalidParameter,
            Error::Metadata(_) => Status::Io,
            Error::UnknownFormat(_) => Status::InvalidParameter,
            Error::NoActiveSequence => Status::InvalidState,
            Error::KeyNotFound(_) => Status::KeyNotFound,
            Error::OutOfMemory => Status::OutOfMemory,
        }
    }
}

/// Supported file formats. `Deduce` sniffs content on read and extension on
/// write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileFormat {
    #[default]
    Deduce,
    Fasta,
    FastaGzip,
    Pna,
}

/// Options for [`create_sequence_iterator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceOptions {
    pub file_format: FileFormat,
    pub base_transform: BaseTransform,
}

/// Options for [`create_writer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterOptions {
    pub file_format: FileFormat,
}

/// True if the file at `path` starts with a valid PNA header.
pub fn is_pna_file_content(path: impl AsRef<Path>) -> bool {
    let Ok(mut file) = File::open(path.as_ref()) else {
        return false;
    };
    let mut buf = [0u8; Header::BYTES];
    if file.read_exact(&mut buf).is_err() {
        return false;
    }
    Header::from_bytes(&buf).signature == PNA_SIGNATURE
}

/// True if `path` carries the `.pna` extension.
pub fn is_pna_file_name(path: impl AsRef<Path>) -> bool {
    path.as_ref().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pna"))
}

const FASTA_EXTENSIONS: [&str; 7] = ["fasta", "fa", "fna", "ffn", "faa", "frn", "mfa"];

fn deduce_writer_format(path: &Path) -> Option<FileFormat> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".pna") {
        return Some(FileFormat::Pna);
    }
    for extension in FASTA_EXTENSIONS {
        if name.ends_with(&format!(".{extension}")) {
            return Some(FileFormat::Fasta);
        }
        if name.ends_with(&format!(".{extension}.gz")) {
            return Some(FileFormat::FastaGzip);
        }
    }
    None
}

/// Opens `path` for reading and returns an iterator over its sequences.
pub fn create_sequence_iterator(
    path: impl AsRef<Path>, options: SequenceOptions,
) -> Result<SequenceIterator> {
    let path = path.as_ref();
    let format = match options.file_format {
        FileFormat::Deduce => {
            if is_pna_file_content(path) { FileFormat::Pna } else { FileFormat::Fasta }
        }
        other => other,
    };
    let inner = match format {
        FileFormat::Pna => IterInner::Pna { reader: PnaReader::open(path)?, index: 0 },
        // Plain and gzipped FASTA share one reader; the byte source sniffs
        // the gzip magic itself.
        _ => IterInner::Fasta(FastaSequenceIterator::open(path, options.base_transform)?),
    };
    Ok(SequenceIterator { inner })
}

/// Produces [`Sequence`] handles for one input file.
#[derive(Debug)]
pub struct SequenceIterator {
    inner: IterInner,
}

#[derive(Debug)]
enum IterInner {
    Fasta(FastaSequenceIterator),
    Pna { reader: PnaReader, index: u64 },
}

impl SequenceIterator {
    /// The next sequence, or `None` once the file is exhausted.
    pub fn next_sequence(&mut self) -> Result<Option<Sequence>> {
        match &mut self.inner {
            IterInner::Fasta(iterator) => {
                let Some(sequence) = iterator.next_sequence()? else {
                    return Ok(None);
                };
                let metadata = sequence.metadata().clone();
                Ok(Some(Sequence { metadata, inner: SeqInner::Fasta(sequence) }))
            }
            IterInner::Pna { reader, index } => {
                if *index >= reader.sequence_count() {
                    return Ok(None);
                }
                let metadata = reader.sequence_metadata(*index)?.to_dict()?;
                let sequence = reader.open_sequence(*index, SequenceFlags::default())?;
                *index += 1;
                Ok(Some(Sequence { metadata, inner: SeqInner::Pna(sequence) }))
            }
        }
    }
}

/// One sequence of any format: metadata plus a byte-read operation.
#[derive(Debug)]
pub struct Sequence {
    metadata: Dict,
    inner: SeqInner,
}

#[derive(Debug)]
enum SeqInner {
    Fasta(FastaSequence),
    Pna(PnaSequenceReader),
}

impl Sequence {
    pub fn metadata(&self) -> &Dict {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        self.metadata.get(KEY_NAME).unwrap_or("")
    }

    pub fn comment(&self) -> &str {
        self.metadata.get(KEY_COMMENT).unwrap_or("")
    }

    /// A metadata value, failing with [`Status::KeyNotFound`] when absent.
    pub fn metadata_value(&self, key: &str) -> Result<&str> {
        self.metadata.get(key).ok_or_else(|| Error::KeyNotFound(key.to_owned()))
    }

    /// Reads up to `buf.len()` bases; returns 0 at the end of the sequence.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.inner {
            SeqInner::Fasta(sequence) => Ok(sequence.read(buf)?),
            SeqInner::Pna(sequence) => Ok(sequence.read(buf)?),
        }
    }

    /// Reads the remainder of the sequence, growing the buffer by doubling.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            if buf.len() == buf.capacity() {
                let grow = buf.capacity().max(4096);
                buf.try_reserve(grow).map_err(|_| Error::OutOfMemory)?;
            }
            let old = buf.len();
            let cap = buf.capacity();
            buf.resize(cap, 0);
            let n = self.read(&mut buf[old..])?;
            buf.truncate(old + n);
            if n == 0 {
                break;
            }
        }
        Ok(buf)
    }
}

/// Opens `path` for writing sequences in the requested format.
pub fn create_writer(path: impl AsRef<Path>, options: WriterOptions) -> Result<SequenceWriter> {
    let path = path.as_ref();
    let format = match options.file_format {
        FileFormat::Deduce => deduce_writer_format(path)
            .ok_or_else(|| Error::UnknownFormat(path.to_path_buf()))?,
        other => other,
    };
    let inner = match format {
        FileFormat::Pna => WriterInner::Pna(PnaWriter::create(path)?),
        FileFormat::FastaGzip => WriterInner::Fasta(FastaWriter::create(path, true)?),
        _ => WriterInner::Fasta(FastaWriter::create(path, false)?),
    };
    Ok(SequenceWriter { inner })
}

/// Writes sequences to one output file, one active sequence at a time.
#[derive(Debug)]
pub struct SequenceWriter {
    inner: WriterInner,
}

#[derive(Debug)]
enum WriterInner {
    Fasta(FastaWriter),
    Pna(PnaWriter),
}

impl SequenceWriter {
    /// Starts a new sequence carrying `metadata`, closing any prior one.
    /// The `seqio.name` and `seqio.comment` keys feed the FASTA header line.
    pub fn create_sequence(&mut self, metadata: &Dict) -> Result<()> {
        match &mut self.inner {
            WriterInner::Fasta(writer) => {
                let name = metadata.get(KEY_NAME).unwrap_or("");
                let comment = metadata.get(KEY_COMMENT).unwrap_or("");
                writer.begin_sequence(name, comment)?;
            }
            WriterInner::Pna(writer) => {
                writer.create_sequence()?;
                for (key, value) in metadata.iter() {
                    writer.add_sequence_metadata(key, value)?;
                }
            }
        }
        Ok(())
    }

    /// Appends bases to the active sequence.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.inner {
            WriterInner::Fasta(writer) => {
                if !writer.in_sequence() {
                    return Err(Error::NoActiveSequence);
                }
                writer.write(buf)?;
            }
            WriterInner::Pna(writer) => writer.write_bases(buf)?,
        }
        Ok(())
    }

    /// Finalizes the file. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match &mut self.inner {
            WriterInner::Fasta(writer) => writer.close()?,
            WriterInner::Pna(writer) => writer.close()?,
        }
        Ok(())
    }
}
