//! Sequence I/O for FASTA and PNA files.
//!
//! PNA (Packed Nucleotide Archive) is a binary, random-access representation
//! of biological sequences: A/C/G/T bases are stored two bits each, runs of
//! anything else become implicit `N` regions that occupy no space, and
//! arbitrary key/value metadata attaches to the file and to every sequence.
//! FASTA files, plain or gzip-compressed, read and write through the same
//! format-agnostic interface, so converting between the representations is a
//! read loop.
//!
//! Readers are random access: [`PnaSequenceReader::seek`] repositions to any
//! base offset using the file's fragment index, and one [`PnaReader`] safely
//! serves sequence readers on multiple threads through a pool of file
//! handles.
//!
//! # Example
//! ```
//! use pna::{
//!     Dict, FileFormat, KEY_NAME, SequenceOptions, WriterOptions, create_sequence_iterator,
//!     create_writer,
//! };
//!
//! # fn main() -> pna::Result<()> {
//! let path = std::env::temp_dir().join(format!("pna-example-{}.pna", std::process::id()));
//! let mut writer = create_writer(&path, WriterOptions { file_format: FileFormat::Pna })?;
//! let mut metadata = Dict::new();
//! metadata.set(KEY_NAME, "chr1");
//! writer.create_sequence(&metadata)?;
//! writer.write(b"ACGTNNNACGT")?;
//! writer.close()?;
//!
//! let mut sequences = create_sequence_iterator(&path, SequenceOptions::default())?;
//! let mut sequence = sequences.next_sequence()?.expect("file holds one sequence");
//! assert_eq!(sequence.name(), "chr1");
//! assert_eq!(sequence.read_all()?, b"ACGTNNNACGT");
//! # std::fs::remove_file(&path).ok();
//! # Ok(())
//! # }
//! ```

pub mod fasta;
pub mod fd_pool;
pub mod format;
pub mod fragments;
pub mod layout;
pub mod metadata;
pub mod packer;
pub mod reader;
pub mod string_table;
pub mod writer;

pub use fasta::{BaseTransform, FastaSequence, FastaSequenceIterator, FastaWriter};
pub use format::{
    Error, FileFormat, Result, Sequence, SequenceIterator, SequenceOptions, SequenceWriter,
    Status, WriterOptions, create_sequence_iterator, create_writer, is_pna_file_content,
    is_pna_file_name,
};
pub use metadata::{Dict, PnaMetadata};
pub use reader::{PnaReader, PnaSequenceReader, SequenceFlags};
pub use writer::{PnaSequenceWriter, PnaWriter};

/// Standard metadata key of a sequence's name, valid for any file format.
pub const KEY_NAME: &str = "seqio.name";

/// Standard metadata key of a sequence's FASTA-style comment.
pub const KEY_COMMENT: &str = "seqio.comment";
