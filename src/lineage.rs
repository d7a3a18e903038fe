//src/lineage.rs

use std::io::{BufRead, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{RefDbError, Result};
use crate::types::{RankRow, TaxonNode, PLACEHOLDER};

/// Rows processed between two flushes of the output buffers.
pub const BATCH_SIZE: usize = 10_000;

/// Id reserved for the root node.
pub const ROOT_ID: u32 = 0;

/// Running per-name counters used to append `_1`, `_2`, ... to terminal names.
/// Counters only ever grow within a run.
#[derive(Debug, Default, Clone)]
pub struct DisambiguationState {
    suffix_names: bool,
    end_name_counts: AHashMap<String, u32>,
}

impl DisambiguationState {
    /// With `suffix_names == false` names pass through untouched.
    pub fn new(suffix_names: bool) -> Self {
        Self {
            suffix_names,
            end_name_counts: AHashMap::new(),
        }
    }

    pub fn resolve(&mut self, end_name: &str) -> String {
        if !self.suffix_names {
            return end_name.to_string();
        }
        let count = self.end_name_counts.entry(end_name.to_string()).or_insert(0);
        *count += 1;
        format!("{}_{}", end_name, count)
    }
}

/// Flat, append-only lineage tree.
///
/// A lineage path is identified by `(parent id, terminal name)`: parent ids are
/// unique per path, so two rows share a key exactly when their non-placeholder
/// prefixes are identical. Ids are dense, so names and depths live in vectors
/// indexed by id.
#[derive(Debug, Clone)]
pub struct LineageTree {
    path_to_id: AHashMap<(u32, String), u32>,
    names: Vec<String>,
    depths: Vec<usize>,
    disambiguation: DisambiguationState,
}

impl LineageTree {
    pub fn new(suffix_names: bool) -> Self {
        Self {
            path_to_id: AHashMap::new(),
            names: vec![TaxonNode::root().name],
            depths: vec![0],
            disambiguation: DisambiguationState::new(suffix_names),
        }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Id of the node reached by following `path` (placeholders skipped) from the root.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<u32> {
        let mut current = ROOT_ID;
        for name in path.iter().map(|s| s.as_ref()).filter(|s| *s != PLACEHOLDER) {
            current = *self.path_to_id.get(&(current, name.to_string()))?;
        }
        Some(current)
    }

    /// Disambiguated name of an existing node.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    pub fn depth(&self, id: u32) -> Option<usize> {
        self.depths.get(id as usize).copied()
    }

    /// Walks one rank row, creating nodes for paths seen for the first time.
    ///
    /// Returns the resolved lineage (`Root;name;name...`) and the new nodes in
    /// creation order. `rank_labels[i]` labels a node first seen at column `i`.
    pub fn insert_row(&mut self, row: &RankRow, rank_labels: &[String]) -> (String, Vec<TaxonNode>) {
        let mut lineage = self.names[ROOT_ID as usize].clone();
        let mut created = Vec::new();

        let mut current = ROOT_ID;
        // last node whose name was appended to this row's lineage
        let mut last_emitted = ROOT_ID;

        for (i, rank) in row.ranks.iter().enumerate() {
            if rank != PLACEHOLDER {
                let key = (current, rank.clone());
                current = match self.path_to_id.get(&key) {
                    Some(&id) => id,
                    None => {
                        let label = rank_labels.get(i).map(String::as_str).unwrap_or_default();
                        let node = self.create_node(current, rank, label);
                        self.path_to_id.insert(key, node.id);
                        let id = node.id;
                        created.push(node);
                        id
                    }
                };
            }

            if current != last_emitted {
                lineage.push(';');
                lineage.push_str(&self.names[current as usize]);
                last_emitted = current;
            }
        }

        (lineage, created)
    }

    fn create_node(&mut self, parent_id: u32, end_name: &str, rank: &str) -> TaxonNode {
        let id = self.names.len() as u32;
        let depth = self.depths[parent_id as usize] + 1;
        let name = self.disambiguation.resolve(end_name);

        self.names.push(name.clone());
        self.depths.push(depth);

        TaxonNode {
            id,
            name,
            parent_id: i64::from(parent_id),
            depth,
            rank: rank.to_string(),
        }
    }
}

/// Counters for one tree-building pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub rows: usize,
    pub nodes: usize,
    /// Number of batch writes to the header/trained outputs.
    pub flushes: usize,
}

/// Streams a rank table into a trained taxonomy (`id*name*parent*depth*rank`)
/// and a header lineage table (`>id\tRoot;...`).
///
/// Output is buffered and written every `batch_size` rows, and once more at end
/// of input. The root line is written before any row is processed.
pub fn build_taxonomy<R: BufRead, H: Write, T: Write>(
    reader: R,
    path: &Path,
    tree: &mut LineageTree,
    batch_size: usize,
    headers_out: &mut H,
    trained_out: &mut T,
) -> Result<BuildSummary> {
    let batch_size = batch_size.max(1);
    let mut lines = reader.lines();

    let rank_labels: Vec<String> = match lines.next() {
        Some(header) => header?
            .trim_end()
            .split('\t')
            .skip(1)
            .map(|s| s.to_string())
            .collect(),
        None => {
            return Err(RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line: 1,
                reason: "rank table has no header row".to_string(),
            })
        }
    };

    writeln!(trained_out, "{}", TaxonNode::root().to_trained_line())?;

    let mut summary = BuildSummary::default();
    let mut header_buf = String::new();
    let mut trained_buf = String::new();
    let mut pending = 0;

    for (idx, line) in lines.enumerate() {
        let line = line?;
        let line_no = idx + 2;
        if line.trim().is_empty() {
            continue;
        }
        let row = RankRow::from_table_line(&line)
            .filter(|r| r.ranks.len() == rank_labels.len())
            .ok_or_else(|| RefDbError::MalformedRecord {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("expected {} rank columns", rank_labels.len()),
            })?;

        let (lineage, nodes) = tree.insert_row(&row, &rank_labels);
        header_buf.push_str(&format!(">{}\t{}\n", row.sequence_id, lineage));
        for node in &nodes {
            trained_buf.push_str(&node.to_trained_line());
            trained_buf.push('\n');
        }
        summary.rows += 1;
        summary.nodes += nodes.len();
        pending += 1;

        if pending == batch_size {
            flush_batch(&mut header_buf, &mut trained_buf, headers_out, trained_out)?;
            summary.flushes += 1;
            pending = 0;
            log::debug!("Exported {} taxonomy headers", summary.rows);
        }
    }

    if pending > 0 {
        flush_batch(&mut header_buf, &mut trained_buf, headers_out, trained_out)?;
        summary.flushes += 1;
    }

    log::info!(
        "Trained taxonomy: {} rows, {} nodes, {} batch(es)",
        summary.rows,
        summary.nodes,
        summary.flushes
    );
    Ok(summary)
}

fn flush_batch<H: Write, T: Write>(
    header_buf: &mut String,
    trained_buf: &mut String,
    headers_out: &mut H,
    trained_out: &mut T,
) -> Result<()> {
    headers_out.write_all(header_buf.as_bytes())?;
    trained_out.write_all(trained_buf.as_bytes())?;
    header_buf.clear();
    trained_buf.clear();
    Ok(())
}
