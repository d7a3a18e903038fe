//src/normalize.rs
//
// Rewrites raw UNITE/SILVA headers into `Seq_ID\tRank_1..Rank_N` rows and a
// clean `>id\nSEQ` FASTA.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

use crate::error::{RefDbError, Result};
use crate::fasta::FastaReader;
use crate::types::{Dialect, RankRow, PLACEHOLDER};

/// IUPAC nucleotide codes accepted in reference and query sequences.
pub const NUCLEOTIDES: &str = "ATCGURYSWKMBDHVN";

/// Sequences shorter than this are known to trip up SINTAX database building.
pub const MIN_SEQUENCE_LEN: usize = 16;

const INCERTAE_SEDIS: &str = "Incertae_sedis";
const UNIDENTIFIED: &str = "unidentified";

/// Separates the SILVA accession from its lineage. Must not occur in the header.
const SILVA_MARKER: char = '?';
const SILVA_DOMAINS: [&str; 3] = ["Bacteria;", "Eukaryota;", "Archaea;"];

/// Column labels of a UNITE rank table.
pub const UNITE_RANKS: [&str; 7] = [
    "Kingdom", "Phylum", "Class", "Order", "Family", "Genus", "Species",
];

/// Running number appended to `..._sp` species so that distinct unidentified
/// species under one genus stay distinguishable.
///
/// A fresh counter is created for every reference file that is formatted;
/// callers that want numbering to continue across files can keep reusing one.
#[derive(Debug, Default, Clone)]
pub struct SpeciesCounter {
    next: u32,
}

impl SpeciesCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }
}

/// Summary of one normalization pass.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub dialect: Dialect,
    /// Rank column headers (without `Seq_ID`).
    pub rank_labels: Vec<String>,
    pub rows_written: usize,
    pub rows_dropped: usize,
}

/// Strips non-ASCII characters after canonical decomposition, so accented
/// letters keep their base letter.
pub fn to_ascii(s: &str) -> String {
    s.nfkd().filter(char::is_ascii).collect()
}

/// Upper-cases `seq` and rejects anything outside the IUPAC alphabet.
pub fn check_sequence(seq: &str, id: &str, path: &Path) -> Result<String> {
    let out = seq.to_ascii_uppercase();
    let bad: BTreeSet<char> = out.chars().filter(|c| !NUCLEOTIDES.contains(*c)).collect();
    if !bad.is_empty() {
        return Err(RefDbError::InvalidSequence {
            chars: bad.into_iter().collect(),
            id: id.to_string(),
            path: path.to_path_buf(),
        });
    }
    if out.len() < MIN_SEQUENCE_LEN {
        log::warn!(
            "Sequence length of {} is less than {} nucleotides and may cause SINTAX training to fail",
            id,
            MIN_SEQUENCE_LEN
        );
    }
    Ok(out)
}

// -----------------------------------------------------------------------
//  UNITE
// -----------------------------------------------------------------------

/// Parses a UNITE header (without `>`) into a rank row.
///
/// Returns `Ok(None)` when the kingdom is unidentified and the record has no
/// usable taxonomy.
pub fn parse_unite_header(
    header: &str,
    counter: &mut SpeciesCounter,
) -> std::result::Result<Option<RankRow>, String> {
    let ascii = to_ascii(header);
    let fields: Vec<&str> = ascii.split('|').collect();
    if fields.len() < 5 {
        return Err(format!("expected 5 '|' fields, found {}", fields.len()));
    }
    let name = fields[1].to_string();

    // "k__Fungi;p__Ascomycota;...;s__Genus_species" -> ["k", "Fungi;p", ..., "Genus_species"]
    let segments: Vec<&str> = fields[4].trim().split("__").collect();
    if segments.len() < 3 {
        return Err(format!("no rank tags in '{}'", fields[4].trim()));
    }
    let mut to_genus: Vec<String> = segments[1..segments.len() - 1]
        .iter()
        .map(|seg| seg[..seg.len().saturating_sub(2)].to_string())
        .collect();
    if to_genus.len() != UNITE_RANKS.len() - 1 {
        return Err(format!(
            "expected {} ranks above species, found {}",
            UNITE_RANKS.len() - 1,
            to_genus.len()
        ));
    }

    resolve_incertae_sedis(&mut to_genus);
    for rank in to_genus.iter_mut() {
        if rank == UNIDENTIFIED {
            *rank = PLACEHOLDER.to_string();
        }
    }

    if to_genus[0] == PLACEHOLDER {
        return Ok(None);
    }

    let genus = &to_genus[to_genus.len() - 1];
    let mut species = segments[segments.len() - 1].to_string();
    if species.contains("Incertae") {
        species = "unidentified_sp".to_string();
    } else if !species.contains(genus.as_str()) {
        let mut parts = species.split('_');
        let head = parts.next().unwrap_or_default();
        species = match parts.next() {
            Some(tail) => format!("{head}_unidentified_{tail}"),
            None => format!("{head}_unidentified"),
        };
    }
    if species.ends_with("sp") {
        species = format!("{}_{}", species, counter.next());
    }

    to_genus.push(species);
    Ok(Some(RankRow {
        sequence_id: name,
        ranks: to_genus,
    }))
}

/// `Incertae_sedis` becomes `<parent>_Incertae_sedis`, or a copy of the parent
/// when the parent is itself already marked. Only the immediate parent is
/// consulted; a kingdom-level `Incertae_sedis` is left as is.
fn resolve_incertae_sedis(ranks: &mut [String]) {
    let marked: Vec<usize> = ranks
        .iter()
        .enumerate()
        .filter(|(_, r)| *r == INCERTAE_SEDIS)
        .map(|(i, _)| i)
        .collect();

    for j in marked {
        if j == 0 {
            continue;
        }
        let parent = ranks[j - 1].clone();
        ranks[j] = if parent.contains(INCERTAE_SEDIS) {
            parent
        } else {
            format!("{parent}_{INCERTAE_SEDIS}")
        };
    }
}

// -----------------------------------------------------------------------
//  SILVA
// -----------------------------------------------------------------------

/// Splits a SILVA header (without `>`) into accession and raw rank list.
pub fn split_silva_header(header: &str) -> std::result::Result<(String, Vec<String>), String> {
    if header.contains(SILVA_MARKER) {
        return Err(format!("header contains reserved character '{SILVA_MARKER}'"));
    }

    let mut line = header.to_string();
    for domain in SILVA_DOMAINS {
        line = line.replace(&format!(" {domain}"), &format!("{SILVA_MARKER}{domain}"));
    }
    let line = to_ascii(&line.replace(' ', "_"));
    let line: String = line
        .chars()
        .filter_map(|c| match c {
            '*' => Some('_'),
            ',' | '<' | '>' | '\'' => None,
            other => Some(other),
        })
        .collect();
    let line = line.replace("Oral_Taxon", "oral_taxon");

    let (accession, lineage) = line
        .split_once(SILVA_MARKER)
        .ok_or_else(|| "no Bacteria/Eukaryota/Archaea domain after the accession".to_string())?;
    let name = accession.split('.').next().unwrap_or_default().to_string();
    if name.is_empty() {
        return Err("empty accession".to_string());
    }

    let ranks = lineage
        .trim()
        .split(';')
        .map(|s| s.to_string())
        .collect();
    Ok((name, ranks))
}

/// Maps `unidentified` ranks to the placeholder and pads the row to `max_rank`
/// columns by inserting placeholders just before the terminal rank.
///
/// An unidentified terminal rank is named after its deepest identified ancestor.
pub fn resolve_silva_ranks(mut ranks: Vec<String>, max_rank: usize) -> Vec<String> {
    for rank in ranks.iter_mut() {
        if rank == UNIDENTIFIED {
            *rank = PLACEHOLDER.to_string();
        }
    }
    let n = ranks.len();
    if n > 1 && ranks[n - 1] == PLACEHOLDER {
        if let Some(anchor) = ranks[..n - 1].iter().rev().find(|r| *r != PLACEHOLDER) {
            ranks[n - 1] = format!("{anchor}_{UNIDENTIFIED}");
        }
    }

    if ranks.len() < max_rank {
        if let Some(leaf) = ranks.pop() {
            let pad = max_rank - ranks.len() - 1;
            ranks.extend(std::iter::repeat(PLACEHOLDER.to_string()).take(pad));
            ranks.push(leaf);
        }
    }
    ranks
}

/// First pass over a SILVA file: the largest rank count of any record.
pub fn silva_max_rank<R: BufRead>(reader: R, path: &Path) -> Result<usize> {
    let mut max_rank = 1;
    let mut fasta = FastaReader::new(reader);
    while let Some((line, rec)) = fasta.next_record()? {
        let (_, ranks) = split_silva_header(&rec.header).map_err(|reason| {
            RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;
        max_rank = max_rank.max(ranks.len());
    }
    Ok(max_rank)
}

// -----------------------------------------------------------------------
//  Driver
// -----------------------------------------------------------------------

/// Writes the normalized FASTA and rank table for a UNITE reference.
pub fn normalize_unite<R: BufRead, F: Write, T: Write>(
    reader: R,
    path: &Path,
    counter: &mut SpeciesCounter,
    fasta_out: &mut F,
    table_out: &mut T,
) -> Result<NormalizedTable> {
    let rank_labels: Vec<String> = UNITE_RANKS.iter().map(|s| s.to_string()).collect();
    writeln!(table_out, "Seq_ID\t{}", rank_labels.join("\t"))?;

    let mut rows_written = 0;
    let mut rows_dropped = 0;
    let mut fasta = FastaReader::new(reader);
    while let Some((line, rec)) = fasta.next_record()? {
        let row = parse_unite_header(&rec.header, counter).map_err(|reason| {
            RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;
        let Some(row) = row else {
            log::debug!("Dropping {}: kingdom is unidentified", rec.header);
            rows_dropped += 1;
            continue;
        };

        let seq = check_sequence(&rec.seq, &row.sequence_id, path)?;
        writeln!(fasta_out, ">{}\n{}", row.sequence_id, seq)?;
        writeln!(table_out, "{}", row.to_table_line())?;
        rows_written += 1;
    }

    Ok(NormalizedTable {
        dialect: Dialect::Unite,
        rank_labels,
        rows_written,
        rows_dropped,
    })
}

/// Writes the normalized FASTA and rank table for a SILVA reference.
/// `max_rank` comes from a prior [`silva_max_rank`] pass over the same file.
pub fn normalize_silva<R: BufRead, F: Write, T: Write>(
    reader: R,
    path: &Path,
    max_rank: usize,
    fasta_out: &mut F,
    table_out: &mut T,
) -> Result<NormalizedTable> {
    let rank_labels: Vec<String> = (1..=max_rank).map(|x| format!("Rank_{x}")).collect();
    writeln!(table_out, "Seq_ID\t{}", rank_labels.join("\t"))?;

    let mut rows_written = 0;
    let mut fasta = FastaReader::new(reader);
    while let Some((line, rec)) = fasta.next_record()? {
        let (name, ranks) = split_silva_header(&rec.header).map_err(|reason| {
            RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;
        let row = RankRow {
            sequence_id: name,
            ranks: resolve_silva_ranks(ranks, max_rank),
        };

        let seq = check_sequence(&rec.seq, &row.sequence_id, path)?.replace('U', "T");
        writeln!(fasta_out, ">{}\n{}", row.sequence_id, seq)?;
        writeln!(table_out, "{}", row.to_table_line())?;
        rows_written += 1;
    }

    Ok(NormalizedTable {
        dialect: Dialect::Silva,
        rank_labels,
        rows_written,
        rows_dropped: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn unite(tax: &str) -> String {
        format!("Some_name|ACC1|SH1.08FU|reps|{tax}")
    }

    #[test]
    fn test_to_ascii_decomposes() {
        assert_eq!(to_ascii("Müller_Café"), "Muller_Cafe");
        assert_eq!(to_ascii("a\u{3b1}b"), "ab");
    }

    #[test]
    fn test_check_sequence() {
        let p = Path::new("in.fasta");
        assert_eq!(check_sequence("acgtn", "s", p).unwrap(), "ACGTN");
        match check_sequence("ACGX-", "s1", p) {
            Err(RefDbError::InvalidSequence { chars, id, .. }) => {
                assert_eq!(chars, vec!['-', 'X']);
                assert_eq!(id, "s1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unite_plain_species() {
        let mut c = SpeciesCounter::new();
        let h = unite("k__Fungi;p__Ascomycota;c__Sordariomycetes;o__Hypocreales;f__Nectriaceae;g__Fusarium;s__Fusarium_solani");
        let row = parse_unite_header(&h, &mut c).unwrap().unwrap();
        assert_eq!(row.sequence_id, "ACC1");
        assert_eq!(
            row.ranks,
            vec!["Fungi", "Ascomycota", "Sordariomycetes", "Hypocreales", "Nectriaceae", "Fusarium", "Fusarium_solani"]
        );
    }

    #[test]
    fn test_unite_incertae_sedis_chain() {
        let mut c = SpeciesCounter::new();
        let h = unite("k__Fungi;p__Ascomycota;c__Incertae_sedis;o__Incertae_sedis;f__Incertae_sedis;g__Gen;s__Gen_alba");
        let row = parse_unite_header(&h, &mut c).unwrap().unwrap();
        assert_eq!(row.ranks[2], "Ascomycota_Incertae_sedis");
        assert_eq!(row.ranks[3], "Ascomycota_Incertae_sedis");
        assert_eq!(row.ranks[4], "Ascomycota_Incertae_sedis");
        assert_eq!(row.ranks[6], "Gen_alba");
    }

    #[test]
    fn test_unite_unidentified_species_numbering() {
        let mut c = SpeciesCounter::new();
        let a = unite("k__Fungi;p__Ascomycota;c__unidentified;o__unidentified;f__unidentified;g__unidentified;s__Ascomycota_sp");
        let b = unite("k__Fungi;p__Basidiomycota;c__Agaricomycetes;o__Agaricales;f__Amanitaceae;g__Amanita;s__Amanita_sp");
        let c_ = unite("k__Fungi;p__Ascomycota;c__X;o__Y;f__Z;g__Gen;s__Incertae_sedis_sp");

        let ra = parse_unite_header(&a, &mut c).unwrap().unwrap();
        assert_eq!(&ra.ranks[2..6], &["-", "-", "-", "-"]);
        assert_eq!(ra.ranks[6], "Ascomycota_unidentified_sp_0");

        let rb = parse_unite_header(&b, &mut c).unwrap().unwrap();
        assert_eq!(rb.ranks[6], "Amanita_sp_1");

        let rc = parse_unite_header(&c_, &mut c).unwrap().unwrap();
        assert_eq!(rc.ranks[6], "unidentified_sp_2");
    }

    #[test]
    fn test_unite_unidentified_kingdom_dropped() {
        let mut c = SpeciesCounter::new();
        let h = unite("k__unidentified;p__unidentified;c__unidentified;o__unidentified;f__unidentified;g__unidentified;s__unidentified");
        assert!(parse_unite_header(&h, &mut c).unwrap().is_none());
    }

    #[test]
    fn test_unite_malformed() {
        let mut c = SpeciesCounter::new();
        assert!(parse_unite_header("a|b|c", &mut c).is_err());
        assert!(parse_unite_header(&unite("k__Fungi;p__Asco;s__x_y"), &mut c).is_err());
    }

    #[test]
    fn test_silva_header_split() {
        let (name, ranks) =
            split_silva_header("AB001.1.1500 Bacteria;Firmicutes;Bacilli;Lactobacillus oral Taxon, 'x'").unwrap();
        assert_eq!(name, "AB001");
        assert_eq!(ranks, vec!["Bacteria", "Firmicutes", "Bacilli", "Lactobacillus_oral_Taxon_x"]);

        let (_, ranks) = split_silva_header("Z9.1.2 Eukaryota;Amorphea;Homo sapiens*Oral Taxon").unwrap();
        assert_eq!(ranks[2], "Homo_sapiens_oral_taxon");

        assert!(split_silva_header("Z9 Viruses;Something").is_err());
        assert!(split_silva_header("Z9? Bacteria;A").is_err());
    }

    #[test]
    fn test_silva_unidentified_terminal() {
        let ranks: Vec<String> = ["Fungi", "Ascomycota", "-", "-", "-", "-", "unidentified"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = resolve_silva_ranks(ranks, 7);
        assert_eq!(out, vec!["Fungi", "Ascomycota", "-", "-", "-", "-", "Ascomycota_unidentified"]);
    }

    #[test]
    fn test_silva_padding_before_terminal() {
        let ranks: Vec<String> = ["Bacteria", "unidentified", "Leaf"].iter().map(|s| s.to_string()).collect();
        let out = resolve_silva_ranks(ranks, 5);
        assert_eq!(out, vec!["Bacteria", "-", "-", "-", "Leaf"]);
    }

    #[test]
    fn test_normalize_silva_file() {
        let data = ">A1.1.10 Eukaryota;Fungi;Ascomycota;Saccharomyces cerevisiae\nACGU\nuugg\n\
                    >B2.1.10 Bacteria;Firmicutes;unidentified\nAAAA\n";
        let path = Path::new("silva.fasta");
        let max_rank = silva_max_rank(Cursor::new(data), path).unwrap();
        assert_eq!(max_rank, 4);

        let mut fasta = Vec::new();
        let mut table = Vec::new();
        let summary = normalize_silva(Cursor::new(data), path, max_rank, &mut fasta, &mut table).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.rank_labels, vec!["Rank_1", "Rank_2", "Rank_3", "Rank_4"]);

        let fasta = String::from_utf8(fasta).unwrap();
        assert_eq!(fasta, ">A1\nACGTTTGG\n>B2\nAAAA\n");
        let table = String::from_utf8(table).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Seq_ID\tRank_1\tRank_2\tRank_3\tRank_4");
        assert_eq!(lines[1], "A1\tEukaryota\tFungi\tAscomycota\tSaccharomyces_cerevisiae");
        assert_eq!(lines[2], "B2\tBacteria\tFirmicutes\t-\tFirmicutes_unidentified");
    }

    #[test]
    fn test_normalize_unite_rejects_bad_sequence() {
        let data = format!(
            ">{}\nACGT*\n",
            unite("k__Fungi;p__A;c__B;o__C;f__D;g__E;s__E_f")
        );
        let mut c = SpeciesCounter::new();
        let err = normalize_unite(Cursor::new(data), Path::new("u.fasta"), &mut c, &mut Vec::new(), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, RefDbError::InvalidSequence { .. }));
    }
}
