//src/query.rs
//
// Preparation of query FASTA files before they are handed to the classifiers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::Result;
use crate::fasta::read_fasta_records;
use crate::normalize::{check_sequence, to_ascii};
use crate::types::FastaRecord;

/// Records per chunk written by [`split_inputs`].
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// ASCII-folds the header, replaces spaces with underscores and validates the
/// sequence. With `filter`, records with an unidentified kingdom are dropped.
pub fn convert_record(record: &FastaRecord, filter: bool, input: &Path) -> Result<Option<FastaRecord>> {
    if filter && record.header.contains("k__unidentified") {
        return Ok(None);
    }
    let header = to_ascii(&record.header).replace(' ', "_");
    let seq = check_sequence(&record.seq, &header, input)?;
    Ok(Some(FastaRecord { header, seq }))
}

/// Normalizes every record of `input` into `output`, preserving order.
/// Returns the number of records written.
pub fn format_query_inputs<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    filter: bool,
) -> Result<usize> {
    let input = input.as_ref();
    let records = read_fasta_records(input)?;

    let converted: Vec<Option<FastaRecord>> = records
        .par_iter()
        .map(|rec| convert_record(rec, filter, input))
        .collect::<Result<_>>()?;

    let mut out = BufWriter::new(File::create(output.as_ref())?);
    let mut written = 0;
    for rec in converted.into_iter().flatten() {
        writeln!(out, ">{}\n{}", rec.header, rec.seq)?;
        written += 1;
    }
    out.flush()?;

    log::info!(
        "Formatted {} of {} query sequences from {}",
        written,
        records.len(),
        input.display()
    );
    Ok(written)
}

/// Splits `input` into `<prefix>_0000.fasta`, `<prefix>_0001.fasta`, ... with at
/// most `chunk_size` single-line records each. `<prefix>` is everything before
/// `.fasta` in the input path.
pub fn split_inputs<P: AsRef<Path>>(input: P, chunk_size: usize) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    let input_str = input.to_string_lossy();
    let prefix = match input_str.find(".fasta") {
        Some(pos) => &input_str[..pos],
        None => &input_str[..],
    };

    let records = read_fasta_records(input)?;
    let mut query_files = Vec::new();
    for (file_count, chunk) in records.chunks(chunk_size.max(1)).enumerate() {
        let path = PathBuf::from(format!("{prefix}_{file_count:04}.fasta"));
        let mut out = BufWriter::new(File::create(&path)?);
        for rec in chunk {
            writeln!(out, ">{}\n{}", rec.header, rec.seq)?;
        }
        out.flush()?;
        query_files.push(path);
    }

    log::debug!("Split {} into {} chunk(s)", input.display(), query_files.len());
    Ok(query_files)
}
