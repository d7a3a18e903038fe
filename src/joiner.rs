//src/joiner.rs

use std::io::{BufRead, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{RefDbError, Result};
use crate::types::Dialect;

/// Sequence id -> `Root;name;...` lineage, as written by the tree builder.
pub type HeaderLineageMap = AHashMap<String, String>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    pub records: usize,
}

/// Loads a `>id\tlineage` table into memory.
pub fn read_header_lineages<R: BufRead>(reader: R, path: &Path) -> Result<HeaderLineageMap> {
    let mut map = HeaderLineageMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, lineage) = line
            .trim()
            .split_once('\t')
            .ok_or_else(|| RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "expected '<id>\\t<lineage>'".to_string(),
            })?;
        let id = id.trim_start_matches('>').to_string();
        if let Some(previous) = map.insert(id, lineage.to_string()) {
            log::warn!(
                "{}:{}: repeated sequence id, replacing lineage {}",
                path.display(),
                idx + 1,
                previous
            );
        }
    }
    Ok(map)
}

/// Rewrites `Root;A;B;...` as `d:A,k:B,...` for SINTAX.
///
/// The tag alphabet bounds the number of ranks: seven for UNITE, and for SILVA
/// eight or `rank_limit`, whichever is smaller.
pub fn lineage_to_utax(lineage: &str, dialect: Dialect, rank_limit: usize) -> String {
    let tags = dialect.utax_tags();
    let limit = match dialect {
        Dialect::Unite => tags.len(),
        _ => tags.len().min(rank_limit),
    };

    lineage
        .split(';')
        .skip(1)
        .take(limit)
        .zip(tags)
        .map(|(name, tag)| format!("{tag}:{name}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes the two annotated exports of a normalized FASTA:
/// `>id\tRoot;...` (RDP/BLAST) and `>id;tax=d:...,k:...;` (SINTAX).
/// Sequence lines are copied through. Every FASTA id must have a lineage.
pub fn add_full_lineage<F: BufRead, R: Write, U: Write>(
    fasta: F,
    lineages: &HeaderLineageMap,
    dialect: Dialect,
    rank_limit: usize,
    rdp_out: &mut R,
    utax_out: &mut U,
) -> Result<JoinSummary> {
    let mut summary = JoinSummary::default();

    for line in fasta.lines() {
        let line = line?;
        let line = line.trim();
        if let Some(id) = line.strip_prefix('>') {
            let lineage = lineages.get(id).ok_or_else(|| RefDbError::MissingLineage {
                id: id.to_string(),
            })?;
            writeln!(rdp_out, "{line}\t{lineage}")?;
            writeln!(
                utax_out,
                "{line};tax={};",
                lineage_to_utax(lineage, dialect, rank_limit)
            )?;
            summary.records += 1;
        } else {
            writeln!(rdp_out, "{line}")?;
            writeln!(utax_out, "{line}")?;
        }
    }

    log::info!("Added full lineage to {} sequences", summary.records);
    Ok(summary)
}
