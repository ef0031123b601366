//! Rooted taxonomy tree with constant-time ancestry queries.
//!
//! Nodes live in an arena indexed by `NodeId`; parent links are indices,
//! never owning references. Ancestry tests use precomputed nested-set
//! intervals and `lca` uses an Euler tour with a sparse-table range
//! minimum, so both are O(1) after the one-time build.

pub mod reader;

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct TaxonNode {
    pub tax_id: u32,
    pub parent: NodeId,
    pub name: String,
    pub rank: String,
    /// Number of edges from the root; 0 for the root itself.
    pub root_path_length: usize,
    nested_left: usize,
    nested_right: usize,
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: Vec<TaxonNode>,
    root: NodeId,
    by_tax_id: FxHashMap<u32, NodeId>,
    euler_node: Vec<NodeId>,
    euler_depth: Vec<usize>,
    first_visit: Vec<usize>,
    /// sparse[k][i] = Euler position of the minimum depth in [i, i + 2^k).
    sparse: Vec<Vec<u32>>,
}

impl Taxonomy {
    /// Build a taxonomy from `(tax_id, parent_tax_id, name, rank)` rows.
    ///
    /// The root is the unique row whose `tax_id` equals its
    /// `parent_tax_id`. Rows may appear in any order.
    pub fn from_entries(entries: Vec<(u32, u32, String, String)>) -> Result<Self> {
        if entries.is_empty() {
            bail!("taxonomy is empty");
        }

        let mut by_tax_id = FxHashMap::default();
        for (idx, (tax_id, _, _, _)) in entries.iter().enumerate() {
            if by_tax_id.insert(*tax_id, idx).is_some() {
                bail!("duplicate taxon id {}", tax_id);
            }
        }

        let mut root = None;
        let mut nodes = Vec::with_capacity(entries.len());
        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); entries.len()];
        for (idx, (tax_id, parent_tax_id, name, rank)) in entries.into_iter().enumerate() {
            let parent = match by_tax_id.get(&parent_tax_id) {
                Some(&p) => p,
                None => bail!("taxon {} refers to unknown parent {}", tax_id, parent_tax_id),
            };
            if parent == idx {
                if root.replace(idx).is_some() {
                    bail!("taxonomy has more than one root");
                }
            } else {
                children[parent].push(idx);
            }
            nodes.push(TaxonNode {
                tax_id,
                parent,
                name,
                rank,
                root_path_length: 0,
                nested_left: 0,
                nested_right: 0,
            });
        }
        let root = match root {
            Some(r) => r,
            None => bail!("taxonomy has no root (a node whose parent is itself)"),
        };

        let mut taxonomy = Taxonomy {
            nodes,
            root,
            by_tax_id,
            euler_node: Vec::new(),
            euler_depth: Vec::new(),
            first_visit: Vec::new(),
            sparse: Vec::new(),
        };
        taxonomy.index(&children)?;
        Ok(taxonomy)
    }

    /// Depth-first pass assigning depths, nested-set intervals and the
    /// Euler tour, followed by the sparse-table build for `lca`.
    fn index(&mut self, children: &[Vec<NodeId>]) -> Result<()> {
        let n = self.nodes.len();
        self.first_visit = vec![usize::MAX; n];
        self.euler_node.reserve(2 * n);
        self.euler_depth.reserve(2 * n);

        let mut counter = 0usize;
        let mut visited = 0usize;
        // stack of (node, index of the next child to descend into)
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root, 0)];
        while let Some(&(node, next_child)) = stack.last() {
            if next_child == 0 {
                visited += 1;
                let depth = stack.len() - 1;
                self.nodes[node].root_path_length = depth;
                self.nodes[node].nested_left = counter;
                counter += 1;
                self.first_visit[node] = self.euler_node.len();
                self.euler_node.push(node);
                self.euler_depth.push(depth);
            }
            if next_child < children[node].len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                stack.push((children[node][next_child], 0));
            } else {
                self.nodes[node].nested_right = counter;
                counter += 1;
                stack.pop();
                if let Some(&(parent, _)) = stack.last() {
                    self.euler_node.push(parent);
                    self.euler_depth.push(stack.len() - 1);
                }
            }
        }
        if visited != n {
            bail!("taxonomy contains {} nodes unreachable from the root", n - visited);
        }

        // sparse table over the Euler depths
        let len = self.euler_depth.len();
        let mut sparse = vec![(0..len as u32).collect::<Vec<u32>>()];
        let mut k = 1usize;
        while (1 << k) <= len {
            let span = 1 << (k - 1);
            let mut level = Vec::with_capacity(len - (1 << k) + 1);
            for i in 0..=(len - (1 << k)) {
                let a = sparse[k - 1][i];
                let b = sparse[k - 1][i + span];
                level.push(if self.euler_depth[a as usize] <= self.euler_depth[b as usize] {
                    a
                } else {
                    b
                });
            }
            sparse.push(level);
            k += 1;
        }
        self.sparse = sparse;
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TaxonNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve an external numeric taxon id to its arena id.
    pub fn find(&self, tax_id: u32) -> Option<NodeId> {
        self.by_tax_id.get(&tax_id).copied()
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.nodes[id].root_path_length
    }

    /// True when `ancestor` is a proper ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let a = &self.nodes[ancestor];
        let d = &self.nodes[descendant];
        a.nested_left < d.nested_left && d.nested_right < a.nested_right
    }

    /// Lowest common ancestor of two nodes.
    pub fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        if a == b {
            return a;
        }
        let (mut lo, mut hi) = (self.first_visit[a], self.first_visit[b]);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        let span = hi - lo + 1;
        let k = usize::BITS as usize - 1 - span.leading_zeros() as usize;
        let left = self.sparse[k][lo];
        let right = self.sparse[k][hi + 1 - (1 << k)];
        let pos = if self.euler_depth[left as usize] <= self.euler_depth[right as usize] {
            left
        } else {
            right
        };
        self.euler_node[pos as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tax_id: u32, parent: u32, name: &str, rank: &str) -> (u32, u32, String, String) {
        (tax_id, parent, name.to_string(), rank.to_string())
    }

    /// root(1) with two subtrees:
    ///   1 -> 2 -> 3 -> 4
    ///   1 -> 5 -> 6
    fn sample() -> Taxonomy {
        Taxonomy::from_entries(vec![
            entry(1, 1, "root", "no rank"),
            entry(2, 1, "alpha", "phylum"),
            entry(3, 2, "beta", "class"),
            entry(4, 3, "gamma", "species"),
            entry(5, 1, "delta", "phylum"),
            entry(6, 5, "epsilon", "class"),
        ])
        .expect("valid taxonomy")
    }

    #[test]
    fn depths_follow_parent_links() {
        let tax = sample();
        assert_eq!(tax.depth(tax.root()), 0);
        let gamma = tax.find(4).unwrap();
        assert_eq!(tax.depth(gamma), 3);
        for id in 0..tax.len() {
            if id != tax.root() {
                let parent = tax.node(id).parent;
                assert_eq!(tax.depth(parent) + 1, tax.depth(id));
            }
        }
    }

    #[test]
    fn lca_within_a_chain_is_the_shallower_node() {
        let tax = sample();
        let beta = tax.find(3).unwrap();
        let gamma = tax.find(4).unwrap();
        assert_eq!(tax.lca(beta, gamma), beta);
        assert_eq!(tax.lca(gamma, beta), beta);
        assert_eq!(tax.lca(gamma, gamma), gamma);
    }

    #[test]
    fn lca_across_subtrees_is_the_root() {
        let tax = sample();
        let gamma = tax.find(4).unwrap();
        let epsilon = tax.find(6).unwrap();
        assert_eq!(tax.lca(gamma, epsilon), tax.root());
    }

    #[test]
    fn ancestry_is_proper() {
        let tax = sample();
        let alpha = tax.find(2).unwrap();
        let gamma = tax.find(4).unwrap();
        assert!(tax.is_ancestor(tax.root(), gamma));
        assert!(tax.is_ancestor(alpha, gamma));
        assert!(!tax.is_ancestor(gamma, alpha));
        assert!(!tax.is_ancestor(gamma, gamma));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = Taxonomy::from_entries(vec![
            entry(1, 1, "root", "no rank"),
            entry(2, 9, "orphan", "phylum"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("unknown parent"));
    }

    #[test]
    fn rejects_duplicate_root() {
        let err = Taxonomy::from_entries(vec![
            entry(1, 1, "root", "no rank"),
            entry(2, 2, "second", "no rank"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than one root"));
    }

    #[test]
    fn rejects_cycles() {
        let err = Taxonomy::from_entries(vec![
            entry(1, 1, "root", "no rank"),
            entry(2, 3, "a", "phylum"),
            entry(3, 2, "b", "class"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
