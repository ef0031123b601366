//! Score-tolerance factor for non-treelike reference scores.
//!
//! A well-behaved reference set places smaller pairwise scores at deeper
//! anchor LCAs: as scores grow, the LCA with the anchor moves towards
//! the root. An inversion in that order (a deeper LCA appearing after a
//! shallower one in score order) means the scores are noisy around the
//! anchor, and the factor widens the score threshold that separates the
//! lower-bound ingroup from the outgroup accordingly.

use rustc_hash::FxHashMap;

use crate::taxonomy::{NodeId, Taxonomy};

pub struct BandFactor<'t> {
    taxonomy: &'t Taxonomy,
    data: Vec<(i32, NodeId)>,
    factor: Option<f64>,
}

impl<'t> BandFactor<'t> {
    /// The first sequence added must be the anchor itself with score 0.
    pub fn new(taxonomy: &'t Taxonomy, reserve: usize) -> Self {
        BandFactor {
            taxonomy,
            data: Vec::with_capacity(reserve),
            factor: None,
        }
    }

    pub fn add(&mut self, score: i32, node: NodeId) {
        self.data.push((score, node));
    }

    /// The widening factor, always >= 1. Computed once and cached.
    pub fn factor(&mut self) -> f64 {
        if let Some(f) = self.factor {
            return f;
        }
        let f = self.compute();
        self.factor = Some(f);
        f
    }

    fn compute(&mut self) -> f64 {
        let mut factor = 1.0f64;
        if self.data.len() < 2 {
            return factor;
        }
        self.data[1..].sort_by_key(|&(score, _)| score);

        let (anchor_score, anchor) = self.data[0];
        let mut last_rank = self.taxonomy.depth(anchor);
        let mut worst_score_per_rank: FxHashMap<usize, i32> = FxHashMap::default();
        worst_score_per_rank.insert(last_rank, anchor_score);

        for &(score, node) in &self.data[1..] {
            let rank = self.taxonomy.depth(self.taxonomy.lca(node, anchor));
            if rank == last_rank {
                continue;
            }
            if rank < last_rank {
                worst_score_per_rank.insert(rank, score);
                last_rank = rank;
            } else {
                // disorder: compare against every shallower rank seen so far
                for r in (0..rank).rev() {
                    if let Some(&ref_score) = worst_score_per_rank.get(&r) {
                        if ref_score != 0 {
                            factor = factor.max(score as f64 / ref_score as f64);
                        }
                    }
                }
            }
        }
        factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linear chain root(1) -> A(2) -> B(3) -> C(4) -> D(5).
    fn chain() -> Taxonomy {
        Taxonomy::from_entries(vec![
            (1, 1, "root".to_string(), "no rank".to_string()),
            (2, 1, "A".to_string(), "superkingdom".to_string()),
            (3, 2, "B".to_string(), "phylum".to_string()),
            (4, 3, "C".to_string(), "family".to_string()),
            (5, 4, "D".to_string(), "species".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn monotone_scores_give_factor_one() {
        let tax = chain();
        let d = tax.find(5).unwrap();
        let c = tax.find(4).unwrap();
        let a = tax.find(2).unwrap();

        let mut band = BandFactor::new(&tax, 4);
        band.add(0, d);
        band.add(2, d);
        band.add(5, c);
        band.add(30, a);
        assert_eq!(band.factor(), 1.0);
    }

    #[test]
    fn anchor_alone_gives_factor_one() {
        let tax = chain();
        let mut band = BandFactor::new(&tax, 1);
        band.add(0, tax.find(5).unwrap());
        assert_eq!(band.factor(), 1.0);
    }

    #[test]
    fn disorder_widens_by_the_score_ratio() {
        let tax = chain();
        let d = tax.find(5).unwrap();
        let c = tax.find(4).unwrap();
        let b = tax.find(3).unwrap();

        // In score order the anchor LCA depths run 4, 2, 3: the entry at
        // depth 3 arrives after depth 2 was already reached, so the
        // factor is its score against the worst score stored at a
        // shallower rank (8 / 6).
        let mut band = BandFactor::new(&tax, 4);
        band.add(0, d);
        band.add(5, d);
        band.add(8, c);
        band.add(6, b);
        let factor = band.factor();
        assert!((factor - 8.0 / 6.0).abs() < 1e-12);

        // a widened threshold admits the score-6 reference that the raw
        // anchor score of 5 would exclude
        assert_eq!((5.0 * factor) as i32, 6);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let tax = chain();
        let d = tax.find(5).unwrap();
        let c = tax.find(4).unwrap();
        let b = tax.find(3).unwrap();

        let mut forward = BandFactor::new(&tax, 4);
        forward.add(0, d);
        forward.add(5, d);
        forward.add(8, c);
        forward.add(6, b);

        let mut shuffled = BandFactor::new(&tax, 4);
        shuffled.add(0, d);
        shuffled.add(6, b);
        shuffled.add(5, d);
        shuffled.add(8, c);

        assert_eq!(forward.factor(), shuffled.factor());
    }

    #[test]
    fn factor_is_cached() {
        let tax = chain();
        let d = tax.find(5).unwrap();
        let mut band = BandFactor::new(&tax, 2);
        band.add(0, d);
        band.add(3, d);
        let first = band.factor();
        assert_eq!(band.factor(), first);
    }
}
