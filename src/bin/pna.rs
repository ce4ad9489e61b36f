//! Command-line companion of the `pna` crate: inspect PNA files and convert
//! FASTA to and from PNA.

use clap::{Parser, Subcommand};
use color_eyre::Result;
use pna::{
    BaseTransform, FileFormat, KEY_NAME, PnaReader, SequenceFlags, SequenceOptions, WriterOptions,
    create_sequence_iterator, create_writer,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pna", version, about = "Inspect PNA files and convert FASTA to and from PNA")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print header fields, file metadata and per-sequence statistics
    Info { path: PathBuf },
    /// Convert FASTA (plain or gzipped) to PNA, normalizing bases to GATCN
    Pack { input: PathBuf, output: PathBuf },
    /// Convert PNA back to 80-column FASTA
    Unpack { input: PathBuf, output: PathBuf },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    match Cli::parse().command {
        Command::Info { path } => info(&path),
        Command::Pack { input, output } => {
            convert(&input, &output, BaseTransform::CapsGatcn, FileFormat::Pna)
        }
        Command::Unpack { input, output } => {
            convert(&input, &output, BaseTransform::None, FileFormat::Fasta)
        }
    }
}

fn info(path: &PathBuf) -> Result<()> {
    let reader = PnaReader::open(path)?;
    println!("sequences:         {}", reader.sequence_count());
    println!("max fragments:     {}", reader.max_seqfragments());
    println!("max packed length: {}", reader.max_packed_bases_length());

    let metadata = reader.metadata()?;
    if !metadata.is_empty() {
        println!("file metadata:");
        for index in 0..metadata.len() {
            let (key, value) = metadata.pair(index)?;
            println!("  {key} = {value}");
        }
    }

    for index in 0..reader.sequence_count() {
        let metadata = reader.sequence_metadata(index)?;
        let name = metadata.get(KEY_NAME)?.unwrap_or("<unnamed>");
        let sequence = reader.open_sequence(index, SequenceFlags::default())?;
        println!(
            "#{index} {name}: {} bases, {} fragments, {} metadata pairs",
            sequence.size(),
            sequence.fragment_count(),
            metadata.len()
        );
    }
    Ok(())
}

fn convert(
    input: &PathBuf, output: &PathBuf, transform: BaseTransform, format: FileFormat,
) -> Result<()> {
    let mut sequences = create_sequence_iterator(
        input,
        SequenceOptions { file_format: FileFormat::Deduce, base_transform: transform },
    )?;
    let mut writer = create_writer(output, WriterOptions { file_format: format })?;
    let mut buf = vec![0u8; 1 << 16];
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
