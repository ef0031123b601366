//! Shared record types and the candidate-alignment input parser.
//!
//! Candidate alignments arrive as a tab-separated table, one local
//! alignment per line, 11 fields:
//!
//! ```text
//! query_id  q_start  q_stop  q_length  ref_id  r_start  r_stop  bit_score  evalue  identities  aln_length
//! ```
//!
//! Query and reference coordinates are 1-based inclusive; a reference
//! span with `r_start > r_stop` marks a reverse-complement alignment.
//! Blank lines and `#` comments are skipped. Lines are grouped into one
//! record set per query, preserving both the first-seen order of queries
//! and the input order of records within a query.

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::taxonomy::{NodeId, Taxonomy};

/// One candidate local alignment between a query and a reference.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub query_id: String,
    pub query_start: usize,
    pub query_stop: usize,
    pub query_length: usize,
    pub reference_id: String,
    pub reference_start: usize,
    pub reference_stop: usize,
    /// Seed score from the upstream local-alignment search; higher is better.
    pub score: f64,
    pub evalue: f64,
    pub identities: usize,
    pub alignment_length: usize,
    pub reference_node: NodeId,
    /// Set when the record is masked out; filtered records take no part
    /// in placement but stay in the set.
    pub filtered: bool,
}

impl AlignmentRecord {
    pub fn is_reverse(&self) -> bool {
        self.reference_start > self.reference_stop
    }
}

/// All candidate alignments of a single query, in input order.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub query_id: String,
    pub records: Vec<AlignmentRecord>,
    /// A per-query input defect (unresolvable taxon, bad span). The
    /// prediction for a defective set degrades to unclassified; other
    /// queries are unaffected.
    pub defect: Option<String>,
}

impl RecordSet {
    pub fn new(query_id: &str) -> Self {
        RecordSet {
            query_id: query_id.to_string(),
            records: Vec::new(),
            defect: None,
        }
    }
}

/// The placement result for one query segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub query_id: String,
    pub feature_begin: usize,
    pub feature_end: usize,
    /// Position of the query within the taxon range, 0 at the lower
    /// node and 1 at the upper node.
    pub interpolation: f64,
    pub lower_node: NodeId,
    pub upper_node: NodeId,
    pub support: usize,
    /// LCA of the best-scoring reference cohort; `None` when the query
    /// is unclassified.
    pub best_reference: Option<NodeId>,
    pub signal_strength: f64,
}

/// Parse the alignment table into per-query record sets.
pub fn parse_alignments<P: AsRef<Path>>(
    path: P,
    taxonomy: &Taxonomy,
    seqid_map: &FxHashMap<String, u32>,
) -> Result<Vec<RecordSet>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open alignment file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut sets: Vec<RecordSet> = Vec::new();
    let mut by_query: FxHashMap<String, usize> = FxHashMap::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            bail!(
                "{}:{}: expected 11 tab-separated fields, got {}",
                path.display(),
                lineno + 1,
                fields.len()
            );
        }

        let number = |idx: usize| -> Result<usize> {
            fields[idx].trim().parse().with_context(|| {
                format!("{}:{}: bad number '{}'", path.display(), lineno + 1, fields[idx])
            })
        };
        let float = |idx: usize| -> Result<f64> {
            fields[idx].trim().parse().with_context(|| {
                format!("{}:{}: bad number '{}'", path.display(), lineno + 1, fields[idx])
            })
        };

        let query_id = fields[0];
        let set_idx = match by_query.get(query_id) {
            Some(&idx) => idx,
            None => {
                by_query.insert(query_id.to_string(), sets.len());
                sets.push(RecordSet::new(query_id));
                sets.len() - 1
            }
        };
        if sets[set_idx].defect.is_some() {
            continue;
        }

        let query_start = number(1)?;
        let query_stop = number(2)?;
        let query_length = number(3)?;
        let reference_id = fields[4];
        let reference_start = number(5)?;
        let reference_stop = number(6)?;
        let score = float(7)?;
        let evalue = float(8)?;
        let identities = number(9)?;
        let alignment_length = number(10)?;

        if query_start == 0 || query_start > query_stop {
            sets[set_idx].defect = Some(format!(
                "invalid query span {}:{} at line {}",
                query_start,
                query_stop,
                lineno + 1
            ));
            continue;
        }
        let reference_node = match seqid_map
            .get(reference_id)
            .and_then(|&tax_id| taxonomy.find(tax_id))
        {
            Some(node) => node,
            None => {
                sets[set_idx].defect =
                    Some(format!("no taxon known for reference '{}'", reference_id));
                continue;
            }
        };

        sets[set_idx].records.push(AlignmentRecord {
            query_id: query_id.to_string(),
            query_start,
            query_stop,
            query_length,
            reference_id: reference_id.to_string(),
            reference_start,
            reference_stop,
            score,
            evalue,
            identities,
            alignment_length,
            reference_node,
            filtered: false,
        });
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn chain_taxonomy() -> Taxonomy {
        Taxonomy::from_entries(vec![
            (1, 1, "root".to_string(), "no rank".to_string()),
            (2, 1, "A".to_string(), "phylum".to_string()),
            (3, 2, "B".to_string(), "species".to_string()),
        ])
        .unwrap()
    }

    fn seqid_map() -> FxHashMap<String, u32> {
        let mut map = FxHashMap::default();
        map.insert("r1".to_string(), 3);
        map.insert("r2".to_string(), 2);
        map
    }

    #[test]
    fn groups_records_by_query_in_input_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "q1\t1\t50\t60\tr1\t10\t59\t95.0\t1e-20\t48\t50").unwrap();
        writeln!(file, "q2\t5\t30\t40\tr2\t100\t75\t44.0\t1e-5\t24\t26").unwrap();
        writeln!(file, "q1\t3\t52\t60\tr2\t21\t70\t90.0\t1e-18\t46\t50").unwrap();

        let tax = chain_taxonomy();
        let sets = parse_alignments(file.path(), &tax, &seqid_map()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].query_id, "q1");
        assert_eq!(sets[0].records.len(), 2);
        assert_eq!(sets[1].query_id, "q2");
        assert_eq!(sets[1].records.len(), 1);

        let rec = &sets[0].records[0];
        assert_eq!(rec.query_start, 1);
        assert_eq!(rec.identities, 48);
        assert_eq!(rec.reference_node, tax.find(3).unwrap());
        assert!(!rec.is_reverse());
        assert!(sets[1].records[0].is_reverse());
    }

    #[test]
    fn unknown_reference_poisons_only_that_query() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q1\t1\t50\t60\tr9\t10\t59\t95.0\t1e-20\t48\t50").unwrap();
        writeln!(file, "q2\t1\t50\t60\tr1\t10\t59\t95.0\t1e-20\t48\t50").unwrap();

        let sets = parse_alignments(file.path(), &chain_taxonomy(), &seqid_map()).unwrap();
        assert!(sets[0].defect.as_deref().unwrap().contains("r9"));
        assert!(sets[1].defect.is_none());
        assert_eq!(sets[1].records.len(), 1);
    }

    #[test]
    fn invalid_query_span_poisons_the_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q1\t50\t10\t60\tr1\t10\t59\t95.0\t1e-20\t48\t50").unwrap();

        let sets = parse_alignments(file.path(), &chain_taxonomy(), &seqid_map()).unwrap();
        assert!(sets[0].defect.as_deref().unwrap().contains("query span"));
    }

    #[test]
    fn malformed_line_is_a_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q1\t1\t50").unwrap();
        assert!(parse_alignments(file.path(), &chain_taxonomy(), &seqid_map()).is_err());
    }
}
