//! Loaders for the taxonomy table and the sequence-identifier mapping.
//!
//! Both files are tab-separated with `#` comment lines:
//!
//! ```text
//! # taxonomy: taxid  parent_taxid  name  rank
//! 1\t1\troot\tno rank
//! 2\t1\tBacteria\tsuperkingdom
//! ```
//!
//! ```text
//! # mapping: sequence id  taxid
//! ref_contig_17\t2
//! ```

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::Taxonomy;

fn skip_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Read a four-column taxonomy table into an indexed tree.
pub fn read_taxonomy<P: AsRef<Path>>(path: P) -> Result<Taxonomy> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open taxonomy file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if skip_line(&line) {
            continue;
        }
        let mut fields = line.split('\t');
        let (tax_id, parent, name, rank) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(t), Some(p), Some(n), Some(r)) => (t, p, n, r),
            _ => bail!("{}:{}: expected 4 tab-separated fields", path.display(), lineno + 1),
        };
        let tax_id: u32 = tax_id
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad taxon id '{}'", path.display(), lineno + 1, tax_id))?;
        let parent: u32 = parent
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad parent id '{}'", path.display(), lineno + 1, parent))?;
        entries.push((tax_id, parent, name.trim().to_string(), rank.trim().to_string()));
    }

    Taxonomy::from_entries(entries).with_context(|| format!("invalid taxonomy in {}", path.display()))
}

/// Read the `sequence id -> taxid` mapping used to annotate references.
pub fn read_seqid_map<P: AsRef<Path>>(path: P) -> Result<FxHashMap<String, u32>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open mapping file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut map = FxHashMap::default();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if skip_line(&line) {
            continue;
        }
        let mut fields = line.split('\t');
        let (seqid, tax_id) = match (fields.next(), fields.next()) {
            (Some(s), Some(t)) => (s, t),
            _ => bail!("{}:{}: expected 2 tab-separated fields", path.display(), lineno + 1),
        };
        let tax_id: u32 = tax_id
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad taxon id '{}'", path.display(), lineno + 1, tax_id))?;
        map.insert(seqid.trim().to_string(), tax_id);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_taxonomy_with_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "1\t1\troot\tno rank").unwrap();
        writeln!(file, "2\t1\tBacteria\tsuperkingdom").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "3\t2\tProteobacteria\tphylum").unwrap();

        let tax = read_taxonomy(file.path()).unwrap();
        assert_eq!(tax.len(), 3);
        let bacteria = tax.find(2).unwrap();
        assert_eq!(tax.node(bacteria).name, "Bacteria");
        assert_eq!(tax.depth(tax.find(3).unwrap()), 2);
    }

    #[test]
    fn rejects_short_taxonomy_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1\t1\troot").unwrap();
        let err = read_taxonomy(file.path()).unwrap_err();
        assert!(err.to_string().contains("expected 4"));
    }

    #[test]
    fn reads_seqid_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "contig_a\t7").unwrap();
        writeln!(file, "contig_b\t12").unwrap();

        let map = read_seqid_map(file.path()).unwrap();
        assert_eq!(map.get("contig_a"), Some(&7));
        assert_eq!(map.get("contig_b"), Some(&12));
        assert_eq!(map.len(), 2);
    }
}
