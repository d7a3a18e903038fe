//src/types.rs

use std::fmt;

/// Placeholder token for a rank that could not be resolved.
pub const PLACEHOLDER: &str = "-";

/// The two supported reference header dialects.
///
/// `Unite`: `>name|accession|...|...|k__Fungi;p__...;s__Species_name`
/// `Silva`: `>accession.start.end Eukaryota;Rank2;...;Leaf`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Unite,
    Silva,
    Invalid,
}

impl Dialect {
    /// Whether terminal names always get a numeric suffix in this dialect.
    /// Silva carries taxa with more than one parent lineage, so it is always on.
    pub fn always_disambiguates(&self) -> bool {
        matches!(self, Dialect::Silva)
    }

    /// Rank tag alphabet used for the UTAX export.
    pub fn utax_tags(&self) -> &'static [char] {
        match self {
            Dialect::Unite => &['d', 'k', 'p', 'c', 'o', 'f', 'g'],
            _ => &['d', 'k', 'p', 'c', 'o', 'f', 'g', 's'],
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dialect::Unite => "UNITE",
            Dialect::Silva => "SILVA",
            Dialect::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

/// One normalized row of the rank table.
/// Every row of one table has the same number of ranks; `-` pads missing levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankRow {
    pub sequence_id: String,
    pub ranks: Vec<String>,
}

impl RankRow {
    /// Parses a `Seq_ID\tRank_1\t...` line.
    pub fn from_table_line(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\n', '\r']).split('\t');
        let sequence_id = fields.next().filter(|s| !s.is_empty())?.to_string();
        let ranks: Vec<String> = fields.map(|s| s.trim().to_string()).collect();
        Some(Self { sequence_id, ranks })
    }

    pub fn to_table_line(&self) -> String {
        format!("{}\t{}", self.sequence_id, self.ranks.join("\t"))
    }
}

/// A node of the trained taxonomy. The root is id 0 with parent -1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonNode {
    pub id: u32,
    pub name: String,
    pub parent_id: i64,
    pub depth: usize,
    pub rank: String,
}

impl TaxonNode {
    pub fn root() -> Self {
        Self {
            id: 0,
            name: "Root".to_string(),
            parent_id: -1,
            depth: 0,
            rank: "rootrank".to_string(),
        }
    }

    /// `id*name*parent_id*depth*rank`
    pub fn to_trained_line(&self) -> String {
        format!(
            "{}*{}*{}*{}*{}",
            self.id, self.name, self.parent_id, self.depth, self.rank
        )
    }
}

/// A minimal representation of a FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Header line without the leading `>`.
    pub header: String,
    /// Sequence with line breaks removed.
    pub seq: String,
}

impl FastaRecord {
    /// First whitespace-delimited token of the header.
    pub fn id(&self) -> &str {
        self.header.split_whitespace().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_row_table_line() {
        let row = RankRow::from_table_line("A1\tFungi\t-\tAgaricales\n").unwrap();
        assert_eq!(row.sequence_id, "A1");
        assert_eq!(row.ranks, vec!["Fungi", "-", "Agaricales"]);
        assert_eq!(row.to_table_line(), "A1\tFungi\t-\tAgaricales");
        assert!(RankRow::from_table_line("").is_none());
    }

    #[test]
    fn test_root_line() {
        assert_eq!(TaxonNode::root().to_trained_line(), "0*Root*-1*0*rootrank");
    }
}
