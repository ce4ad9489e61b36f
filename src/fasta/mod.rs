//! FASTA reading and writing.
//!
//! The reader is a line-column state machine: every input byte resolves to a
//! precomputed action that depends only on whether the byte sits in the
//! first column of a line. Sequences read lazily through substreams of one
//! shared file handle, so they stay valid in any order and after the
//! iterator itself is gone.

mod stream;

use crate::metadata::Dict;
use crate::{KEY_COMMENT, KEY_NAME};
use flate2::Compression;
use flate2::write::GzEncoder;
use log::warn;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use stream::{ByteSource, RawStream};

/// Column width of written sequence lines.
pub const LINE_WIDTH: usize = 80;

/// Transformation applied to bases before they reach the caller's buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BaseTransform {
    /// Deliver bases exactly as they appear in the file.
    #[default]
    None,
    /// Uppercase everything and turn anything outside `GATC` into `N`.
    CapsGatcn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ignore,
    Newline,
    Append,
    Header,
}

/// Per-byte action tables of the sequence parser.
///
/// A `>` in the first column starts a header; anywhere else it is treated as
/// ordinary sequence data, although some FASTA dialects forbid it.
#[derive(Debug)]
struct CharInterpreter {
    bases: [u8; 256],
    first_col: [Action; 256],
    other_col: [Action; 256],
}

impl CharInterpreter {
    fn new(transform: BaseTransform) -> Self {
        let mut bases = [0u8; 256];
        let mut first_col = [Action::Ignore; 256];
        let mut other_col = [Action::Ignore; 256];
        for c in 0..=255u8 {
            let mut base = c;
            let (first, other) = if c == b'\n' || c == b'\r' {
                (Action::Newline, Action::Newline)
            } else if !c.is_ascii_graphic() {
                (Action::Ignore, Action::Ignore)
            } else if c == b'>' {
                (Action::Header, Action::Append)
            } else {
                if transform == BaseTransform::CapsGatcn {
                    base = c.to_ascii_uppercase();
                    if !matches!(base, b'G' | b'A' | b'T' | b'C') {
                        base = b'N';
                    }
                }
                (Action::Append, Action::Append)
            };
            bases[c as usize] = base;
            first_col[c as usize] = first;
            other_col[c as usize] = other;
        }
        CharInterpreter { bases, first_col, other_col }
    }

    fn base(&self, c: u8) -> u8 {
        self.bases[c as usize]
    }

    fn action(&self, c: u8, first_col: bool) -> Action {
        if first_col { self.first_col[c as usize] } else { self.other_col[c as usize] }
    }
}

#[derive(Debug)]
struct Parse {
    first_col: bool,
    eos: bool,
    eos_offset: u64,
}

/// Parsing state of one sequence: its substream and line-column position.
#[derive(Debug)]
struct SequenceCore {
    stream: RawStream,
    interpreter: Arc<CharInterpreter>,
    parse: Parse,
}

impl SequenceCore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.parse.eos {
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            let Some(c) = self.stream.next_char()? else {
                self.parse.eos = true;
                self.parse.eos_offset = self.stream.tell_abs();
                break;
            };
            match self.interpreter.action(c, self.parse.first_col) {
                Action::Ignore => self.parse.first_col = false,
                Action::Newline => self.parse.first_col = true,
                Action::Append => {
                    self.parse.first_col = false;
                    buf[n] = self.interpreter.base(c);
                    n += 1;
                }
                Action::Header => {
                    // The sequence ends where the next header begins.
                    self.parse.eos = true;
                    self.parse.eos_offset = self.stream.tell_abs() - 1;
                    break;
                }
            }
        }
        Ok(n)
    }

    /// Absolute offset one past this sequence's data, scanning ahead without
    /// disturbing the read position.
    fn tell_end(&mut self) -> io::Result<u64> {
        if !self.parse.eos {
            let offset = self.stream.tell_abs();
            let mut buf = [0u8; 1024];
            while !self.parse.eos {
                self.read(&mut buf)?;
            }
            self.parse.eos = false;
            self.stream.seek_abs(offset);
        }
        Ok(self.parse.eos_offset)
    }
}

/// Cursor shared between the iterator and its most recent sequence.
///
/// The iterator advances from `eos_offset`; whichever side learns a
/// sequence's end first records it here. The iterator clears `iter_alive` on
/// drop, turning later sequence drops into no-ops.
#[derive(Debug)]
struct IterLink {
    iter_alive: bool,
    eos_offset: u64,
    /// Id of the sequence the iterator has not yet skipped past; 0 if none.
    curr_id: u64,
}

/// One FASTA record. Metadata is parsed eagerly, bases lazily.
#[derive(Debug)]
pub struct FastaSequence {
    name: String,
    comment: String,
    metadata: Dict,
    core: Arc<Mutex<SequenceCore>>,
    link: Arc<Mutex<IterLink>>,
    id: u64,
}

impl FastaSequence {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The standard `seqio.name` / `seqio.comment` pairs.
    pub fn metadata(&self) -> &Dict {
        &self.metadata
    }

    /// Reads transformed bases, returning 0 at the end of the record.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.core.lock().unwrap().read(buf)
    }
}

impl Drop for FastaSequence {
    fn drop(&mut self) {
        let pending = {
            let link = self.link.lock().unwrap();
            link.iter_alive && link.curr_id == self.id
        };
        if !pending {
            return;
        }
        // The iterator has not skipped past this sequence yet; leave it the
        // end position so it can.
        match self.core.lock().unwrap().tell_end() {
            Ok(end) => {
                let mut link = self.link.lock().unwrap();
                if link.iter_alive && link.curr_id == self.id {
                    link.eos_offset = end;
                    link.curr_id = 0;
                }
            }
            Err(e) => warn!("failed finding end of sequence {:?} on close: {e}", self.name),
        }
    }
}

/// Iterates over the records of a FASTA file, plain or gzip-compressed.
#[derive(Debug)]
pub struct FastaSequenceIterator {
    stream: RawStream,
    interpreter: Arc<CharInterpreter>,
    link: Arc<Mutex<IterLink>>,
    curr: Weak<Mutex<SequenceCore>>,
    next_id: u64,
}

impl FastaSequenceIterator {
    /// Opens `path`, sniffing the gzip magic.
    pub fn open(path: impl AsRef<Path>, transform: BaseTransform) -> io::Result<Self> {
        let source = ByteSource::open(path.as_ref())?;
        Ok(FastaSequenceIterator {
            stream: RawStream::new(Arc::new(Mutex::new(source)), 0),
            interpreter: Arc::new(CharInterpreter::new(transform)),
            link: Arc::new(Mutex::new(IterLink { iter_alive: true, eos_offset: 0, curr_id: 0 })),
            curr: Weak::new(),
            next_id: 1,
        })
    }

    /// Parses the next header and returns its sequence, or `None` at EOF.
    pub fn next_sequence(&mut self) -> io::Result<Option<FastaSequence>> {
        // Settle the end of the still-open previous sequence so we can skip
        // past it without re-reading its bases later.
        if let Some(core) = self.curr.upgrade() {
            let end = core.lock().unwrap().tell_end()?;
            let mut link = self.link.lock().unwrap();
            link.eos_offset = end;
            link.curr_id = 0;
        }
        self.curr = Weak::new();
        let eos_offset = self.link.lock().unwrap().eos_offset;
        self.stream.seek_abs(eos_offset);

        let mut first_col = true;
        let mut found = false;
        while let Some(c) = self.stream.next_char()? {
            if c == b'\n' {
                first_col = true;
            } else if c == b'>' && first_col {
                found = true;
                break;
            } else {
                first_col = false;
            }
        }
        if !found {
            return Ok(None);
        }

        let mut name = Vec::new();
        let terminator = loop {
            match self.stream.next_char()? {
                None => return Ok(None),
                Some(c) if c.is_ascii_whitespace() => break c,
                Some(c) => name.push(c),
            }
        };
        let mut comment = Vec::new();
        if terminator != b'\n' && terminator != b'\r' {
            loop {
                match self.stream.next_char()? {
                    None => return Ok(None),
                    Some(b'\n') => break,
                    Some(b'\r') => {}
                    Some(c) => comment.push(c),
                }
            }
        }

        let name = String::from_utf8_lossy(&name).into_owned();
        let comment = String::from_utf8_lossy(&comment).into_owned();
        let id = self.next_id;
        self.next_id += 1;

        let core = Arc::new(Mutex::new(SequenceCore {
            stream: self.stream.substream(),
            interpreter: Arc::clone(&self.interpreter),
            parse: Parse { first_col: true, eos: false, eos_offset: 0 },
        }));
        self.curr = Arc::downgrade(&core);
        self.link.lock().unwrap().curr_id = id;

        let mut metadata = Dict::new();
        metadata.set(KEY_NAME, name.as_str());
        metadata.set(KEY_COMMENT, comment.as_str());
        Ok(Some(FastaSequence { name, comment, metadata, core, link: Arc::clone(&self.link), id }))
    }
}

impl Drop for FastaSequenceIterator {
    fn drop(&mut self) {
        self.link.lock().unwrap().iter_alive = false;
    }
}

#[derive(Debug)]
enum FastaOut {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Closed,
}

/// Writes FASTA records, wrapping sequence lines at [`LINE_WIDTH`] columns.
#[derive(Debug)]
pub struct FastaWriter {
    out: FastaOut,
    column: usize,
    in_sequence: bool,
    path: PathBuf,
}

impl FastaWriter {
    pub fn create(path: impl AsRef<Path>, gzip: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = BufWriter::new(File::create(&path)?);
        let out = if gzip {
            FastaOut::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            FastaOut::Plain(file)
        };
        Ok(FastaWriter { out, column: 0, in_sequence: false, path })
    }

    /// True once a header line has been written.
    pub fn in_sequence(&self) -> bool {
        self.in_sequence
    }

    /// Emits the `>name comment` header line of the next record.
    pub fn begin_sequence(&mut self, name: &str, comment: &str) -> io::Result<()> {
        if self.column != 0 {
            self.write_raw(b"\n")?;
            self.column = 0;
        }
        self.write_raw(b">")?;
        self.write_raw(name.as_bytes())?;
        if !comment.is_empty() {
            self.write_raw(b" ")?;
            self.write_raw(comment.as_bytes())?;
        }
        self.write_raw(b"\n")?;
        self.in_sequence = true;
        Ok(())
    }

    /// Appends sequence bytes, breaking lines at the column limit.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut rest = buf;
        while !rest.is_empty() {
            let n = (LINE_WIDTH - self.column).min(rest.len());
            let (run, tail) = rest.split_at(n);
            self.write_raw(run)?;
            self.column += n;
            if self.column == LINE_WIDTH {
                self.write_raw(b"\n")?;
                self.column = 0;
            }
            rest = tail;
        }
        Ok(())
    }

    /// Terminates the last line and flushes. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if matches!(self.out, FastaOut::Closed) {
            return Ok(());
        }
        if self.column != 0 {
            self.write_raw(b"\n")?;
            self.column = 0;
        }
        match std::mem::replace(&mut self.out, FastaOut::Closed) {
            FastaOut::Plain(mut out) => out.flush()?,
            FastaOut::Gzip(encoder) => {
                let mut out = encoder.finish()?;
                out.flush()?;
            }
            FastaOut::Closed => {}
        }
        Ok(())
    }

    fn write_raw(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.out {
            FastaOut::Plain(out) => out.write_all(buf),
            FastaOut::Gzip(out) => out.write_all(buf),
            FastaOut::Closed => Err(io::Error::other("FASTA writer is closed")),
        }
    }
}

impl Drop for FastaWriter {
    fn drop(&mut self) {
        if !matches!(self.out, FastaOut::Closed) {
            if let Err(e) = self.close() {
                warn!("failed closing FASTA writer for {}: {e}", self.path.display());
            }
        }
    }
}
