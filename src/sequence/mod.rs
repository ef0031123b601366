//! In-memory sequence store with 1-based substring retrieval.
//!
//! Built from FASTA; serves the forward and reverse-complement segment
//! requests of the placement passes. `stop` is clamped to the stored
//! sequence length, everything else out of bounds is an error that the
//! caller downgrades to an unclassified prediction for that query.

use anyhow::{bail, Context, Result};
use bio::alphabets::dna;
use bio::io::fasta;
use rustc_hash::FxHashMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct SequenceStore {
    seqs: Vec<Vec<u8>>,
    index: FxHashMap<String, usize>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fasta<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = fasta::Reader::from_file(path)
            .with_context(|| format!("cannot open FASTA file {}", path.display()))?;
        let mut store = Self::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("bad FASTA record in {}", path.display()))?;
            store.insert(record.id().to_string(), record.seq().to_vec());
        }
        Ok(store)
    }

    /// Add a sequence; an existing entry under the same id is replaced.
    pub fn insert(&mut self, id: String, seq: Vec<u8>) {
        match self.index.get(&id) {
            Some(&i) => self.seqs[i] = seq,
            None => {
                self.index.insert(id, self.seqs.len());
                self.seqs.push(seq);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    fn slice(&self, id: &str, start: usize, stop: usize) -> Result<&[u8]> {
        let &i = self
            .index
            .get(id)
            .with_context(|| format!("unknown sequence identifier '{}'", id))?;
        let seq = &self.seqs[i];
        if start < 1 || start > stop {
            bail!("invalid coordinates {}:{} for sequence '{}'", start, stop, id);
        }
        if start > seq.len() {
            bail!(
                "coordinates {}:{} outside sequence '{}' of length {}",
                start,
                stop,
                id,
                seq.len()
            );
        }
        let stop = stop.min(seq.len());
        Ok(&seq[start - 1..stop])
    }

    /// Substring over `[start, stop]`, 1-based inclusive.
    pub fn get(&self, id: &str, start: usize, stop: usize) -> Result<Vec<u8>> {
        self.slice(id, start, stop).map(<[u8]>::to_vec)
    }

    /// Reverse complement of the substring over `[start, stop]`.
    pub fn get_reverse_complement(&self, id: &str, start: usize, stop: usize) -> Result<Vec<u8>> {
        Ok(dna::revcomp(self.slice(id, start, stop)?))
    }
}
