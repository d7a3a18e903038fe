use std::io::{self, BufRead};
use std::path::Path;

use crate::fasta::open_reader;
use crate::types::Dialect;

/// Classifies a single header line.
pub fn classify_header(line: &str) -> Dialect {
    if !line.starts_with('>') {
        return Dialect::Invalid;
    }

    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() > 1 {
        // UNITE uses "|" inside the header, the kingdom tag sits in the last field
        return match fields.last() {
            Some(last) if last.contains("k__") => Dialect::Unite,
            _ => Dialect::Invalid,
        };
    }

    if line.contains(';') {
        Dialect::Silva
    } else {
        Dialect::Invalid
    }
}

/// Reads only the first line of `path` and reports its dialect.
/// An empty or unreadable first line is `Dialect::Invalid`; only opening the
/// file can fail.
pub fn detect_dialect<P: AsRef<Path>>(path: P) -> io::Result<Dialect> {
    let mut reader = open_reader(path.as_ref())?;
    let mut line = String::new();
    if reader.read_line(&mut line).is_err() {
        return Ok(Dialect::Invalid);
    }
    let dialect = classify_header(&line);
    log::info!("{} format detected for {}", dialect, path.as_ref().display());
    Ok(dialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_classify_unite() {
        let h = ">Glomus_sp|AB123|SH001.08FU|reps|k__Fungi;p__Glomeromycota;c__Glomeromycetes;o__Glomerales;f__Glomeraceae;g__Glomus;s__Glomus_sp";
        assert_eq!(classify_header(h), Dialect::Unite);
    }

    #[test]
    fn test_classify_silva() {
        let h = ">AB001.1.1500 Bacteria;Proteobacteria;Gammaproteobacteria";
        assert_eq!(classify_header(h), Dialect::Silva);
    }

    #[test]
    fn test_classify_invalid() {
        assert_eq!(classify_header("ACGT"), Dialect::Invalid);
        assert_eq!(classify_header(">just_an_id"), Dialect::Invalid);
        // pipes without a kingdom tag are not UNITE and are not reconsidered as SILVA
        assert_eq!(classify_header(">a|b|c;d"), Dialect::Invalid);
    }

    #[test]
    fn test_detect_reads_first_line_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.fasta");
        fs::write(&path, ">X1 Eukaryota;Fungi\nACGT\n>bad\n").unwrap();
        assert_eq!(detect_dialect(&path).unwrap(), Dialect::Silva);

        let empty = dir.path().join("empty.fasta");
        fs::write(&empty, "").unwrap();
        assert_eq!(detect_dialect(&empty).unwrap(), Dialect::Invalid);
    }
}
