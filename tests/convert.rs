//! Conversion through the format-agnostic API: FASTA → PNA → FASTA round
//! trips, writer laws and format deduction.

mod common;

use color_eyre::Result;
use common::{init, write_fixture};
use pna::{
    BaseTransform, Dict, FileFormat, KEY_COMMENT, KEY_NAME, SequenceOptions, WriterOptions,
    create_sequence_iterator, create_writer,
};
use pretty_assertions::assert_eq;
use std::path::Path;

fn options(file_format: FileFormat, base_transform: BaseTransform) -> SequenceOptions {
    SequenceOptions { file_format, base_transform }
}

fn dict(name: &str, comment: &str) -> Dict {
    let mut dict = Dict::new();
    dict.set(KEY_NAME, name);
    dict.set(KEY_COMMENT, comment);
    dict
}

/// Copies every sequence from `input` to `output`.
fn convert(input: &Path, output: &Path, transform: BaseTransform, format: FileFormat) -> Result<()> {
    let mut sequences = create_sequence_iterator(input, options(FileFormat::Deduce, transform))?;
    let mut writer = create_writer(output, WriterOptions { file_format: format })?;
    let mut buf = [0u8; 777];
    while let Some(mut sequence) = sequences.next_sequence()? {
        let metadata = sequence.metadata().clone();
        writer.create_sequence(&metadata)?;
        loop {
            let n = sequence.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n])?;
        }
    }
    writer.close()?;
    Ok(())
}

fn collect(path: &Path, transform: BaseTransform) -> Result<Vec<(String, String, Vec<u8>)>> {
    let mut sequences = create_sequence_iterator(path, options(FileFormat::Deduce, transform))?;
    let mut records = Vec::new();
    while let Some(mut sequence) = sequences.next_sequence()? {
        let name = sequence.name().to_owned();
        let comment = sequence.comment().to_owned();
        records.push((name, comment, sequence.read_all()?));
    }
    Ok(records)
}

#[test]
fn fasta_to_pna_to_fasta_round_trip() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let fasta = write_fixture(
        dir.path(),
        "mixed.fa",
        ">seq1 with Ns\nacgtNnACGT\nnnACgt\n>seq2\ntttTTTaaaAAA\n",
        false,
    )?;
    let pna = dir.path().join("mixed.pna");
    let back = dir.path().join("back.fa");

    // the FASTA-read side normalizes, so PNA sees only GATCN
    convert(&fasta, &pna, BaseTransform::CapsGatcn, FileFormat::Pna)?;
    convert(&pna, &back, BaseTransform::None, FileFormat::Fasta)?;

    let expected = vec![
        ("seq1".to_owned(), "with Ns".to_owned(), b"ACGTNNACGTNNACGT".to_vec()),
        ("seq2".to_owned(), "".to_owned(), b"TTTTTTAAAAAA".to_vec()),
    ];
    assert_eq!(collect(&pna, BaseTransform::None)?, expected);
    assert_eq!(collect(&back, BaseTransform::None)?, expected);
    Ok(())
}

#[test]
fn write_then_read_yields_the_same_triples() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let records: Vec<(&str, &str, &[u8])> = vec![
        ("alpha", "first record", b"ACGTACGTNN"),
        ("beta", "", b"NNNN"),
        ("gamma", "third", b"TTTT"),
    ];

    for format in [FileFormat::Fasta, FileFormat::FastaGzip, FileFormat::Pna] {
        let path = dir.path().join(match format {
            FileFormat::FastaGzip => "triples.fa.gz",
            FileFormat::Pna => "triples.pna",
            _ => "triples.fa",
        });
        let mut writer = create_writer(&path, WriterOptions { file_format: format })?;
        for (name, comment, bases) in &records {
            writer.create_sequence(&dict(name, comment))?;
            writer.write(bases)?;
        }
        writer.close()?;

        let read = collect(&path, BaseTransform::None)?;
        assert_eq!(read.len(), records.len(), "{format:?}");
        for ((name, comment, bases), (read_name, read_comment, read_bases)) in
            records.iter().zip(&read)
        {
            assert_eq!(read_name, name, "{format:?}");
            assert_eq!(read_comment, comment, "{format:?}");
            assert_eq!(read_bases, bases, "{format:?}");
        }
    }
    Ok(())
}

#[test]
fn writer_close_is_idempotent() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    for (name, format) in [("x.fa", FileFormat::Fasta), ("x.pna", FileFormat::Pna)] {
        let path = dir.path().join(name);
        let mut writer = create_writer(&path, WriterOptions { file_format: format })?;
        writer.create_sequence(&dict("seq", ""))?;
        writer.write(b"ACGT")?;
        writer.close()?;
        writer.close()?;
        assert_eq!(collect(&path, BaseTransform::None)?.len(), 1);
    }
    Ok(())
}

#[test]
fn writing_without_a_sequence_is_invalid_state() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    for (name, format) in [("y.fa", FileFormat::Fasta), ("y.pna", FileFormat::Pna)] {
        let path = dir.path().join(name);
        let mut writer = create_writer(&path, WriterOptions { file_format: format })?;
        let error = writer.write(b"ACGT").unwrap_err();
        assert_eq!(error.status(), pna::Status::InvalidState, "{format:?}");
    }
    Ok(())
}

#[test]
fn deduce_sniffs_content_not_extension() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    // a PNA file hiding behind a FASTA extension
    let disguised = dir.path().join("disguised.fa");
    let mut writer = create_writer(dir.path().join("real.pna"), WriterOptions {
        file_format: FileFormat::Pna,
    })?;
    writer.create_sequence(&dict("hidden", ""))?;
    writer.write(b"ACGT")?;
    writer.close()?;
    std::fs::copy(dir.path().join("real.pna"), &disguised)?;

    let records = collect(&disguised, BaseTransform::None)?;
    assert_eq!(records, vec![("hidden".to_owned(), "".to_owned(), b"ACGT".to_vec())]);
    Ok(())
}

#[test]
fn deduced_writer_format_follows_the_extension() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("auto.pna");
    let mut writer = create_writer(&path, WriterOptions::default())?;
    writer.create_sequence(&dict("auto", ""))?;
    writer.write(b"ACGT")?;
    writer.close()?;
    assert!(pna::is_pna_file_content(&path));

    let unknown = create_writer(dir.path().join("auto.txt"), WriterOptions::default());
    assert_eq!(unknown.unwrap_err().status(), pna::Status::InvalidParameter);
    Ok(())
}

#[test]
fn pna_preserves_extra_metadata_through_the_unified_api() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("extra.pna");
    let mut metadata = dict("rich", "with extras");
    metadata.set("assembly", "GRCh38");
    metadata.set("source", "unit-test");

    let mut writer = create_writer(&path, WriterOptions { file_format: FileFormat::Pna })?;
    writer.create_sequence(&metadata)?;
    writer.write(b"ACGTNNNN")?;
    writer.close()?;

    let mut sequences = create_sequence_iterator(&path, SequenceOptions::default())?;
    let sequence = sequences.next_sequence()?.unwrap();
    assert_eq!(sequence.metadata_value("assembly")?, "GRCh38");
    assert_eq!(sequence.metadata_value("source")?, "unit-test");
    assert_eq!(sequence.metadata_value(KEY_NAME)?, "rich");
    assert_eq!(sequence.metadata_value(KEY_COMMENT)?, "with extras");
    Ok(())
}

#[test]
fn read_all_after_partial_read_returns_the_rest() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let fasta = write_fixture(dir.path(), "rest.fa", ">s\nACGTACGT\n", false)?;
    let mut sequences = create_sequence_iterator(&fasta, SequenceOptions::default())?;
    let mut sequence = sequences.next_sequence()?.unwrap();
    let mut head = [0u8; 3];
    assert_eq!(sequence.read(&mut head)?, 3);
    assert_eq!(&head, b"ACG");
    assert_eq!(sequence.read_all()?, b"TACGT");
    Ok(())
}
