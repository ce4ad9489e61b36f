#![allow(dead_code)]

use std::path::Path;

/// Logging bootstrap; safe to call from every test.
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Number of open descriptors of this process referring to `path`.
pub fn open_count(path: &Path) -> usize {
    let target = std::fs::canonicalize(path).unwrap();
    let mut count = 0;
    for entry in std::fs::read_dir("/proc/self/fd").unwrap() {
        let entry = entry.unwrap();
        if let Ok(link) = std::fs::read_link(entry.path()) {
            if link == target {
                count += 1;
            }
        }
    }
    count
}

/// The two-record FASTA fixture used across the read tests.
pub const FASTA_A: &str = ">seq1 comment1.0 comment1.1\naAgGcCtT\n>seq2\nacgtACGT\n";

/// Writes `content` to `name` under `dir`, gzip-compressing when `gzip`.
pub fn write_fixture(
    dir: &Path, name: &str, content: &str, gzip: bool,
) -> color_eyre::Result<std::path::PathBuf> {
    use std::io::Write;
    let path = dir.join(name);
    if gzip {
        let file = std::fs::File::create(&path)?;
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?;
    } else {
        std::fs::write(&path, content)?;
    }
    Ok(path)
}
