// src/lib.rs
pub mod types;
pub mod error;
pub mod fasta;
pub mod dialect;
pub mod normalize;
pub mod lineage;
pub mod joiner;
pub mod query;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::dialect::detect_dialect;
use crate::error::{RefDbError, Result, TrainError};
use crate::fasta::open_reader;
use crate::joiner::{add_full_lineage, read_header_lineages};
use crate::lineage::{build_taxonomy, LineageTree, BATCH_SIZE};
use crate::normalize::{normalize_silva, normalize_unite, silva_max_rank, SpeciesCounter};
use crate::types::Dialect;

/// Tunables for one formatting run.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Rows between flushes of the tree builder outputs.
    pub batch_size: usize,
    /// Suffix every taxon name, for trainers that reject a name with two parents.
    pub dup: bool,
    /// Maximum number of ranks in the SINTAX export (SILVA only, capped at 8).
    pub utax_rank_limit: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            dup: false,
            utax_rank_limit: 8,
        }
    }
}

/// The file set produced for one reference database.
#[derive(Debug, Clone)]
pub struct TrainingArtifacts {
    pub dialect: Dialect,
    /// `>id\nSEQ`
    pub normalized_fasta: PathBuf,
    /// `Seq_ID\tRank_1...`
    pub rank_table: PathBuf,
    /// `id*name*parent*depth*rank`
    pub trained_taxonomy: PathBuf,
    /// `>id\tRoot;...`
    pub header_lineages: PathBuf,
    /// Normalized FASTA with the lineage tab-joined onto each header.
    pub rdp_trained_fasta: PathBuf,
    /// Normalized FASTA with `;tax=d:...,k:...;` headers.
    pub utax_fasta: PathBuf,

    pub sequences: usize,
    pub dropped: usize,
    pub taxa: usize,
}

impl TrainingArtifacts {
    fn new(db: &Path, out_dir: &Path, dialect: Dialect) -> Self {
        let stem = db
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference".to_string());
        let base = |suffix: &str| out_dir.join(format!("{stem}{suffix}"));

        Self {
            dialect,
            normalized_fasta: base("__RDP.fasta"),
            rank_table: base("__RDP_taxonomy.txt"),
            trained_taxonomy: base("__RDP_taxonomy_trained.txt"),
            header_lineages: base("__RDP_taxonomy_headers.txt"),
            rdp_trained_fasta: base("__RDP_trained.fasta"),
            utax_fasta: base("__UTAX.fasta"),
            sequences: 0,
            dropped: 0,
            taxa: 0,
        }
    }
}

/// Trains an external classifier from the formatted files.
pub trait ClassifierTrainer {
    fn train(&mut self, artifacts: &TrainingArtifacts) -> std::result::Result<(), TrainError>;
}

/// Detects the dialect of `db` and runs normalize -> build -> join, writing all
/// outputs into `out_dir`. Existing outputs are overwritten.
pub fn format_reference_db<P: AsRef<Path>, Q: AsRef<Path>>(
    db: P,
    out_dir: Q,
    options: &FormatOptions,
) -> Result<TrainingArtifacts> {
    let db = db.as_ref();
    let dialect = detect_dialect(db)?;
    if dialect == Dialect::Invalid {
        return Err(RefDbError::InvalidDialect {
            path: db.to_path_buf(),
        });
    }

    std::fs::create_dir_all(out_dir.as_ref())?;
    let mut artifacts = TrainingArtifacts::new(db, out_dir.as_ref(), dialect);

    // 1. Rank normalization
    log::info!("Reformatting database {}", db.display());
    let table = {
        let mut fasta_out = BufWriter::new(File::create(&artifacts.normalized_fasta)?);
        let mut table_out = BufWriter::new(File::create(&artifacts.rank_table)?);
        let table = match dialect {
            Dialect::Unite => {
                let mut counter = SpeciesCounter::new();
                normalize_unite(open_reader(db)?, db, &mut counter, &mut fasta_out, &mut table_out)?
            }
            _ => {
                let max_rank = silva_max_rank(open_reader(db)?, db)?;
                normalize_silva(open_reader(db)?, db, max_rank, &mut fasta_out, &mut table_out)?
            }
        };
        fasta_out.flush()?;
        table_out.flush()?;
        table
    };
    artifacts.sequences = table.rows_written;
    artifacts.dropped = table.rows_dropped;
    log::info!(
        "Reference database formatted: {} sequences, {} dropped, {} ranks",
        table.rows_written,
        table.rows_dropped,
        table.rank_labels.len()
    );

    // 2. Lineage tree
    if options.dup {
        log::info!("Duplicate taxa being handled with numerical suffixes");
    }
    let mut tree = LineageTree::new(dialect.always_disambiguates() || options.dup);
    {
        let mut headers_out = BufWriter::new(File::create(&artifacts.header_lineages)?);
        let mut trained_out = BufWriter::new(File::create(&artifacts.trained_taxonomy)?);
        build_taxonomy(
            BufReader::new(File::open(&artifacts.rank_table)?),
            &artifacts.rank_table,
            &mut tree,
            options.batch_size,
            &mut headers_out,
            &mut trained_out,
        )?;
        headers_out.flush()?;
        trained_out.flush()?;
    }
    artifacts.taxa = tree.len();

    // 3. Full lineage exports
    let lineages = read_header_lineages(
        BufReader::new(File::open(&artifacts.header_lineages)?),
        &artifacts.header_lineages,
    )?;
    {
        let mut rdp_out = BufWriter::new(File::create(&artifacts.rdp_trained_fasta)?);
        let mut utax_out = BufWriter::new(File::create(&artifacts.utax_fasta)?);
        add_full_lineage(
            BufReader::new(File::open(&artifacts.normalized_fasta)?),
            &lineages,
            dialect,
            options.utax_rank_limit,
            &mut rdp_out,
            &mut utax_out,
        )?;
        rdp_out.flush()?;
        utax_out.flush()?;
    }

    log::info!("Database formatting complete");
    Ok(artifacts)
}

/// Formats `db` and hands the result to `trainer`.
///
/// When the trainer rejects duplicate taxon names, the database is formatted
/// again from the raw input with `dup` enabled and training is retried once.
/// A second failure is fatal and carries the trainer's diagnostic.
pub fn train_reference_db<P: AsRef<Path>, Q: AsRef<Path>, T: ClassifierTrainer>(
    db: P,
    out_dir: Q,
    options: &FormatOptions,
    trainer: &mut T,
) -> Result<TrainingArtifacts> {
    let artifacts = format_reference_db(db.as_ref(), out_dir.as_ref(), options)?;
    match trainer.train(&artifacts) {
        Ok(()) => Ok(artifacts),
        Err(TrainError::DuplicateTaxonName(msg)) if !options.dup => {
            log::warn!("Training error ({msg}), redoing with duplicate taxa");
            let retry = FormatOptions {
                dup: true,
                ..options.clone()
            };
            let artifacts = format_reference_db(db.as_ref(), out_dir.as_ref(), &retry)?;
            trainer
                .train(&artifacts)
                .map_err(|e| RefDbError::TrainerRejected(e.to_string()))?;
            log::info!("Training error overcome with duplicate taxa handling");
            Ok(artifacts)
        }
        Err(TrainError::DuplicateTaxonName(msg)) => Err(RefDbError::TrainerRejected(msg)),
        Err(TrainError::Failed(msg)) => Err(RefDbError::Trainer(msg)),
    }
}
