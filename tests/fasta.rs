//! FASTA reading end to end: sequential and out-of-order access, both
//! compressed variants, and file-descriptor accounting.

mod common;

use color_eyre::Result;
use common::{FASTA_A, init, open_count, write_fixture};
use pna::{BaseTransform, Sequence, SequenceOptions, create_sequence_iterator};
use pretty_assertions::assert_eq;

fn options(transform: BaseTransform) -> SequenceOptions {
    SequenceOptions { base_transform: transform, ..Default::default() }
}

/// Reads the whole sequence through a deliberately tiny buffer.
fn read_in_chunks(sequence: &mut Sequence, chunk: usize) -> Result<Vec<u8>> {
    let mut bases = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = sequence.read(&mut buf)?;
        if n == 0 {
            break;
        }
        bases.extend_from_slice(&buf[..n]);
    }
    // a drained sequence stays drained
    assert_eq!(sequence.read(&mut buf)?, 0);
    Ok(bases)
}

fn verify_sequence(sequence: &mut Sequence, name: &str, comment: &str, bases: &str) -> Result<()> {
    assert_eq!(sequence.name(), name);
    assert_eq!(sequence.comment(), comment);
    assert_eq!(read_in_chunks(sequence, 2)?, bases.as_bytes());
    Ok(())
}

fn verify_sequential(path: &std::path::Path) -> Result<()> {
    let mut sequences = create_sequence_iterator(path, options(BaseTransform::None))?;
    let mut first = sequences.next_sequence()?.expect("first sequence");
    verify_sequence(&mut first, "seq1", "comment1.0 comment1.1", "aAgGcCtT")?;
    drop(first);
    let mut second = sequences.next_sequence()?.expect("second sequence");
    verify_sequence(&mut second, "seq2", "", "acgtACGT")?;
    drop(second);
    assert!(sequences.next_sequence()?.is_none());
    drop(sequences);
    assert_eq!(open_count(path), 0);
    Ok(())
}

fn verify_out_of_order(path: &std::path::Path) -> Result<()> {
    assert_eq!(open_count(path), 0);
    let mut sequences = create_sequence_iterator(path, options(BaseTransform::None))?;
    let first = sequences.next_sequence()?.expect("first sequence");
    let second = sequences.next_sequence()?.expect("second sequence");
    drop(sequences);

    // read and drop in reverse order; the iterator is already gone
    for (mut sequence, name, comment, bases) in [
        (second, "seq2", "", "acgtACGT"),
        (first, "seq1", "comment1.0 comment1.1", "aAgGcCtT"),
    ] {
        verify_sequence(&mut sequence, name, comment, bases)?;
    }
    assert_eq!(open_count(path), 0);
    Ok(())
}

#[test]
fn plain_sequential() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    verify_sequential(&path)
}

#[test]
fn gzip_sequential() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa.gz", FASTA_A, true)?;
    verify_sequential(&path)
}

#[test]
fn plain_out_of_order() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    verify_out_of_order(&path)
}

#[test]
fn gzip_out_of_order() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa.gz", FASTA_A, true)?;
    verify_out_of_order(&path)
}

#[test]
fn caps_gatcn_transform() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::CapsGatcn))?;
    let mut first = sequences.next_sequence()?.unwrap();
    assert_eq!(first.read_all()?, b"AAGGCCTT");
    let mut second = sequences.next_sequence()?.unwrap();
    assert_eq!(second.read_all()?, b"ACGTACGT");
    Ok(())
}

#[test]
fn skipping_an_unread_sequence() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;

    // never read seq1; the iterator must still find seq2
    let first = sequences.next_sequence()?.unwrap();
    let mut second = sequences.next_sequence()?.unwrap();
    assert_eq!(second.name(), "seq2");
    assert_eq!(second.read_all()?, b"acgtACGT");

    // seq1 is still readable afterwards
    let mut first = first;
    assert_eq!(first.read_all()?, b"aAgGcCtT");
    Ok(())
}

#[test]
fn crlf_line_endings() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let content = ">seq1 a comment\r\nACGT\r\nacgt\r\n>seq2\r\nTTTT\r\n";
    let path = write_fixture(dir.path(), "crlf.fa", content, false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;

    let mut first = sequences.next_sequence()?.unwrap();
    assert_eq!(first.name(), "seq1");
    // the comment must not carry the \r
    assert_eq!(first.comment(), "a comment");
    assert_eq!(first.read_all()?, b"ACGTacgt");

    let mut second = sequences.next_sequence()?.unwrap();
    assert_eq!(second.name(), "seq2");
    assert_eq!(second.read_all()?, b"TTTT");
    Ok(())
}

#[test]
fn gt_outside_first_column_is_sequence_data() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "gt.fa", ">seq1\nAC>GT\n", false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;
    let mut sequence = sequences.next_sequence()?.unwrap();
    assert_eq!(sequence.read_all()?, b"AC>GT");
    assert!(sequences.next_sequence()?.is_none());
    Ok(())
}

#[test]
fn leading_junk_before_first_header_is_skipped() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "junk.fa", "; not a header\n>seq1\nACGT\n", false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;
    let mut sequence = sequences.next_sequence()?.unwrap();
    assert_eq!(sequence.name(), "seq1");
    assert_eq!(sequence.read_all()?, b"ACGT");
    Ok(())
}

#[test]
fn empty_file_yields_no_sequences() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "empty.fa", "", false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;
    assert!(sequences.next_sequence()?.is_none());
    assert!(sequences.next_sequence()?.is_none());
    Ok(())
}

#[test]
fn zero_length_read_leaves_state_alone() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;
    let mut sequence = sequences.next_sequence()?.unwrap();
    assert_eq!(sequence.read(&mut [])?, 0);
    assert_eq!(sequence.read_all()?, b"aAgGcCtT");
    Ok(())
}

#[test]
fn metadata_keys_are_the_standard_pair() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = write_fixture(dir.path(), "a.fa", FASTA_A, false)?;
    let mut sequences = create_sequence_iterator(&path, options(BaseTransform::None))?;
    let sequence = sequences.next_sequence()?.unwrap();
    assert_eq!(sequence.metadata().len(), 2);
    assert_eq!(sequence.metadata_value(pna::KEY_NAME)?, "seq1");
    assert_eq!(sequence.metadata_value(pna::KEY_COMMENT)?, "comment1.0 comment1.1");
    let missing = sequence.metadata_value("seqio.missing").unwrap_err();
    assert_eq!(missing.status(), pna::Status::KeyNotFound);
    Ok(())
}
