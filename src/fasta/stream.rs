//! Byte source and raw stream underneath the FASTA parser.
//!
//! One file handle is shared by the iterator and every sequence substream;
//! each stream keeps a private cache and states its absolute offset on every
//! refill, so out-of-order reads are just a matter of who refills next.

use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Raw-stream cache capacity.
pub(crate) const STREAM_BUF_CAPACITY: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Positioned reads over a plain or gzip-compressed file.
///
/// Gzip streams cannot seek; moving backwards restarts the decoder from the
/// beginning and moving forwards is a skip-read, which is what zlib's
/// `gzseek` does for read streams.
#[derive(Debug)]
pub(crate) enum ByteSource {
    Plain(File),
    Gzip(GzSource),
}

impl ByteSource {
    /// Opens `path`, sniffing the gzip magic to pick the variant.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 2];
        let mut read = 0;
        while read < magic.len() {
            match file.read(&mut magic[read..])? {
                0 => break,
                n => read += n,
            }
        }
        file.seek(SeekFrom::Start(0))?;
        if read == magic.len() && magic == GZIP_MAGIC {
            Ok(ByteSource::Gzip(GzSource {
                decoder: Some(MultiGzDecoder::new(BufReader::new(file))),
                pos: 0,
            }))
        } else {
            Ok(ByteSource::Plain(file))
        }
    }

    /// Reads at the absolute uncompressed offset, returning 0 at EOF.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Plain(file) => {
                file.seek(SeekFrom::Start(offset))?;
                file.read(buf)
            }
            ByteSource::Gzip(source) => source.read_at(offset, buf),
        }
    }
}

pub(crate) struct GzSource {
    /// `None` only if a restart failed halfway.
    decoder: Option<MultiGzDecoder<BufReader<File>>>,
    /// Uncompressed offset the decoder has reached.
    pos: u64,
}

impl fmt::Debug for GzSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gzip source at uncompressed offset {}", self.pos)
    }
}

impl GzSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset < self.pos {
            self.restart()?;
        }
        let mut scratch = [0u8; 8 * 1024];
        while self.pos < offset {
            let want = scratch.len().min((offset - self.pos) as usize);
            let n = self.decoder()?.read(&mut scratch[..want])?;
            if n == 0 {
                // seek target beyond the end of the stream
                return Ok(0);
            }
            self.pos += n as u64;
        }
        let n = self.decoder()?.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn restart(&mut self) -> io::Result<()> {
        let decoder =
            self.decoder.take().ok_or_else(|| io::Error::other("gzip stream unusable"))?;
        let mut file = decoder.into_inner().into_inner();
        file.seek(SeekFrom::Start(0))?;
        self.decoder = Some(MultiGzDecoder::new(BufReader::new(file)));
        self.pos = 0;
        Ok(())
    }

    fn decoder(&mut self) -> io::Result<&mut MultiGzDecoder<BufReader<File>>> {
        self.decoder.as_mut().ok_or_else(|| io::Error::other("gzip stream unusable"))
    }
}

/// Cached byte stream with an absolute position over a shared [`ByteSource`].
#[derive(Debug)]
pub(crate) struct RawStream {
    source: Arc<Mutex<ByteSource>>,
    cache: Box<[u8]>,
    len: usize,
    index: usize,
    read_offset: u64,
    eof: bool,
}

impl RawStream {
    pub fn new(source: Arc<Mutex<ByteSource>>, start: u64) -> Self {
        RawStream {
            source,
            cache: vec![0u8; STREAM_BUF_CAPACITY].into_boxed_slice(),
            len: 0,
            index: 0,
            read_offset: start,
            eof: false,
        }
    }

    pub fn next_char(&mut self) -> io::Result<Option<u8>> {
        if self.eof {
            return Ok(None);
        }
        if self.index == self.len {
            let read_offset = self.read_offset + self.len as u64;
            let n = self.source.lock().unwrap().read_at(read_offset, &mut self.cache)?;
            if n == 0 {
                self.eof = true;
                return Ok(None);
            }
            self.index = 0;
            self.len = n;
            self.read_offset = read_offset;
        }
        let c = self.cache[self.index];
        self.index += 1;
        Ok(Some(c))
    }

    /// Absolute offset of the next byte [`next_char`](Self::next_char) would
    /// deliver.
    pub fn tell_abs(&self) -> u64 {
        self.read_offset + self.index as u64
    }

    pub fn seek_abs(&mut self, offset: u64) {
        self.read_offset = offset;
        self.len = 0;
        self.index = 0;
        self.eof = false;
    }

    /// A new stream over the same source, starting where this one stands.
    /// The cache snapshot comes along, so no refill is needed until it runs
    /// out.
    pub fn substream(&self) -> RawStream {
        RawStream {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
            len: self.len,
            index: self.index,
            read_offset: self.read_offset,
            eof: self.eof,
        }
    }
}
