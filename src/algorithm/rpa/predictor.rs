//! Range placement over one query segment.
//!
//! Starting from the candidate seed alignments of a single query, three
//! passes of pairwise global alignments narrow the query down to a
//! contiguous ancestor interval of the taxonomy:
//!
//! * pass 0 re-aligns the best-scoring references against the query
//!   window and takes the LCA of the best cohort as the closest
//!   evolutionary neighbour (`rtax`);
//! * pass 1 aligns every other segment against each cohort anchor,
//!   splitting them into an ingroup (at most as distant as the query)
//!   that pulls the lower bound up, and an outgroup that seeds the upper
//!   bound;
//! * pass 2 re-checks the upper bound against the retained outgroup
//!   anchors so that a single noisy anchor cannot leave it too narrow.
//!
//! Pairwise alignments are expensive, so identity and triangle
//! shortcuts reuse known distances wherever two segments are both
//! sequence-identical to the query, and the inner pass-1 loop walks the
//! records in reverse so it can stop as soon as the lower bound hits
//! the root.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::align::edit_distance;
use crate::common::{AlignmentRecord, PredictionRecord, RecordSet};
use crate::sequence::SequenceStore;
use crate::taxonomy::{NodeId, Taxonomy};

use super::band_factor::BandFactor;

const INFINITE_SCORE: i32 = i32::MAX;

/// Tuning knobs for the placement passes.
#[derive(Debug, Clone, Copy)]
pub struct RpaConfig {
    /// Records scoring below `exclude_factor` times the best seed score
    /// are masked out before placement. Range [0, 1].
    pub exclude_factor: f64,
    /// Seeds within `reeval_bandwidth` of the best seed score are
    /// re-aligned against the query window in pass 0. Range [0, 1].
    pub reeval_bandwidth: f64,
}

impl Default for RpaConfig {
    fn default() -> Self {
        RpaConfig {
            exclude_factor: 0.5,
            reeval_bandwidth: 0.1,
        }
    }
}

pub struct RpaPredictor<'a> {
    taxonomy: &'a Taxonomy,
    queries: &'a SequenceStore,
    references: &'a SequenceStore,
    exclude_factor: f64,
    reeval_bandwidth_factor: f64,
}

impl<'a> RpaPredictor<'a> {
    pub fn new(
        taxonomy: &'a Taxonomy,
        queries: &'a SequenceStore,
        references: &'a SequenceStore,
        config: &RpaConfig,
    ) -> Self {
        RpaPredictor {
            taxonomy,
            queries,
            references,
            exclude_factor: config.exclude_factor,
            reeval_bandwidth_factor: 1.0 - config.reeval_bandwidth,
        }
    }

    /// Place one query segment. Never fails: input defects degrade to an
    /// unclassified prediction with the reason in the log sink.
    pub fn predict(&self, set: &mut RecordSet, log: &mut String) -> PredictionRecord {
        let tax = self.taxonomy;
        let root = tax.root();
        let qid = set.query_id.clone();

        if let Some(reason) = set.defect.clone() {
            let _ = writeln!(log, "ID\t-1:-1@{}", qid);
            let _ = writeln!(log, "  ERROR\t{}\n", reason);
            return self.unclassified(set);
        }

        // best seed score and surviving record count
        let mut n = 0usize;
        let mut qmaxscore = 0.0f64;
        for rec in set.records.iter().filter(|r| !r.filtered) {
            qmaxscore = qmaxscore.max(rec.score);
            n += 1;
        }
        let n_pre = n;

        // score floor
        let floor = qmaxscore * self.exclude_factor;
        for rec in set.records.iter_mut().filter(|r| !r.filtered) {
            if rec.score < floor {
                rec.filtered = true;
                n -= 1;
            }
        }

        if n == 0 {
            let _ = writeln!(log, "ID\t-1:-1@{}", qid);
            let _ = writeln!(log, "  NUMREF\t{}\t{}\n", n_pre, n);
            return self.unclassified(set);
        }

        if n == 1 {
            let Some(rec) = set.records.iter().find(|r| !r.filtered) else {
                return self.unclassified(set);
            };
            let _ = writeln!(log, "ID\t{}:{}@{}", rec.query_start, rec.query_stop, qid);
            let _ = writeln!(log, "  NUMREF\t{}\t{}\n", n_pre, n);
            return PredictionRecord {
                query_id: qid,
                feature_begin: rec.query_start,
                feature_end: rec.query_stop,
                interpolation: 1.0,
                lower_node: rec.reference_node,
                upper_node: root,
                support: rec.identities,
                best_reference: Some(rec.reference_node),
                signal_strength: 1.0,
            };
        }

        // query range = union of the surviving query spans
        let mut qr_start = usize::MAX;
        let mut qr_stop = 0usize;
        for rec in set.records.iter().filter(|r| !r.filtered) {
            qr_start = qr_start.min(rec.query_start);
            qr_stop = qr_stop.max(rec.query_stop);
        }
        let qr_len = qr_stop - qr_start + 1;
        let seqname = format!("{}:{}@{}", qr_start, qr_stop, qid);
        let _ = writeln!(log, "ID\t{}", seqname);
        let _ = writeln!(log, "  NUMREF\t{}\t{}\n", n_pre, n);

        // the surviving records in input order
        let records: Vec<&AlignmentRecord> =
            set.records.iter().filter(|r| !r.filtered).collect();

        let qrseq = match self.queries.get(&qid, qr_start, qr_stop) {
            Ok(seq) => seq,
            Err(err) => {
                let _ = writeln!(log, "  ERROR\t{}\n", err);
                return self.unclassified(set);
            }
        };
        let rrseqs = match self.reference_segments(&records, qr_start, qr_stop) {
            Ok(seqs) => seqs,
            Err(err) => {
                let _ = writeln!(log, "  ERROR\t{}\n", err);
                return self.unclassified(set);
            }
        };

        // ---- pass 0: re-alignment against the best-scoring references
        let _ = writeln!(log, "  PASS\t0");
        let mut qgroup: BTreeSet<usize> = BTreeSet::new();
        let mut qscores: Vec<i32> = Vec::with_capacity(n);
        let mut matches: Vec<usize> = Vec::with_capacity(n);
        let mut pass_0_counter = 0usize;
        let mut anchors_support = 0usize;
        let mut lca_all = records[0].reference_node;
        let mut index_best = 0usize;
        let reeval_floor = self.reeval_bandwidth_factor * qmaxscore;

        for (i, rec) in records.iter().enumerate() {
            let score;
            let m;
            if rec.alignment_length == qr_len && rec.identities == qr_len {
                // the seed already covers the window identically
                qgroup.insert(i);
                score = 0;
                m = rec.identities;
                let _ = writeln!(log, "    *ALN {} <=> query\tscore = {}; matches = {}", i, score, m);
            } else if rec.score >= reeval_floor {
                qgroup.insert(i);
                let d = edit_distance(&rrseqs[i], &qrseq);
                pass_0_counter += 1;
                score = d as i32;
                m = (rrseqs[i].len().max(qrseq.len()) - d).max(rec.identities);
                let _ = writeln!(log, "    +ALN {} <=> query\tscore = {}; matches = {}", i, score, m);
            } else {
                score = INFINITE_SCORE;
                m = 0;
            }
            qscores.push(score);
            matches.push(m);

            if score < qscores[index_best]
                || (score == qscores[index_best] && m > matches[index_best])
            {
                index_best = i;
            }
            anchors_support = anchors_support.max(m);
            lca_all = tax.lca(lca_all, rec.reference_node);
        }

        // keep only the cohort tied with the best (score, matches)
        qgroup.retain(|&i| qscores[i] == qscores[index_best] && matches[i] == matches[index_best]);
        let mut rtax = records[index_best].reference_node;
        for &i in &qgroup {
            rtax = tax.lca(rtax, records[i].reference_node);
        }
        debug_assert!(!qgroup.is_empty());
        let _ = writeln!(log, "    NUMALN\t{}\n", pass_0_counter);

        // ---- pass 1: anchors against all other segments
        let _ = writeln!(log, "  PASS\t1");
        let mut pass_1_counter = 0usize;
        let mut naive_1_counter = 0usize;
        let mut anchors_taxsig = 1.0f64;
        let mut ival_global = 0.0f64;
        let mut lnode_global = rtax;
        let mut unode_global = rtax;
        let mut outgroup: BTreeSet<usize> = BTreeSet::new();
        let mut bandfactor_max = 1.0f64;
        let mut lca_root_dist_min = usize::MAX;

        loop {
            let Some(index_anchor) = qgroup.pop_first() else {
                break;
            };
            let qscore = qscores[index_anchor];
            let rnode = records[index_anchor].reference_node;
            let mut band = BandFactor::new(tax, n);
            band.add(0, rnode);

            let mut lnode = rtax;
            let mut lscore = 0i32;
            let mut uscore = INFINITE_SCORE;
            let mut outgroup_tmp: Vec<(usize, i32)> = Vec::new();

            naive_1_counter += n - 1;
            for i in (0..n).rev() {
                if lnode == root {
                    break;
                }
                let cnode = records[i].reference_node;
                let score;
                if i == index_anchor {
                    score = 0;
                } else if qscores[i] == 0 && qscores[index_anchor] == 0 {
                    // both sequence-identical to the query, hence to each other
                    score = qscores[i];
                } else {
                    let d = edit_distance(&rrseqs[i], &rrseqs[index_anchor]);
                    pass_1_counter += 1;
                    let m = rrseqs[i].len().max(rrseqs[index_anchor].len()) - d;
                    let _ = writeln!(
                        log,
                        "    +ALN {} <=> {}\tscore = {}; matches = {}",
                        i, index_anchor, d, m
                    );
                    // the anchor is sequence-identical to the query, so
                    // this is also a query alignment
                    if qscores[index_anchor] == 0 && matches[i] > 0 {
                        qscores[i] = d as i32;
                        matches[i] = m;
                    }
                    score = d as i32;
                }

                band.add(score, cnode);

                if score == 0 {
                    // no new information relative to this anchor
                    qgroup.remove(&i);
                } else if score <= qscore {
                    lnode = tax.lca(lnode, cnode);
                    if score > lscore {
                        lscore = score;
                    }
                } else {
                    if score < uscore {
                        uscore = score;
                    }
                    outgroup_tmp.push((i, score));
                }
            }

            let bandfactor = band.factor();
            bandfactor_max = bandfactor_max.max(bandfactor);
            let qscore_ex = (qscore as f64 * bandfactor) as i32;
            let _ = writeln!(
                log,
                "    EXT\tqscore = {}; threshold = {}; bandfactor = {}",
                qscore, qscore_ex, bandfactor
            );

            // the lowest upper score that counts as close enough after
            // band widening; everything above it is dropped
            let mut min_upper_score = INFINITE_SCORE;
            let mut kept: Vec<(usize, i32)> = Vec::with_capacity(outgroup_tmp.len());
            for (i, score) in outgroup_tmp {
                if score > qscore_ex {
                    if score > min_upper_score {
                        continue;
                    }
                    if score < min_upper_score {
                        min_upper_score = score;
                    }
                } else if min_upper_score > qscore_ex {
                    min_upper_score = score;
                } else {
                    min_upper_score = min_upper_score.max(score);
                }
                kept.push((i, score));
            }

            let mut unode: Option<NodeId> = None;
            if min_upper_score != INFINITE_SCORE {
                let mut upper = lnode;
                for &(i, score) in &kept {
                    if score > min_upper_score {
                        continue;
                    }
                    let cnode = records[i].reference_node;
                    upper = tax.lca(cnode, upper);

                    // keep only the outgroup members branching closest
                    // to the root relative to rtax
                    let lca_root_dist = tax.depth(tax.lca(cnode, rtax));
                    if lca_root_dist > lca_root_dist_min {
                        continue;
                    }
                    if lca_root_dist < lca_root_dist_min {
                        lca_root_dist_min = lca_root_dist;
                        outgroup.clear();
                    }
                    outgroup.insert(i);
                }
                unode = Some(upper);
            }

            let ival;
            let unode = match unode {
                None => {
                    uscore = -1;
                    ival = 1.0;
                    root
                }
                Some(upper) => {
                    if upper != lnode && lscore < qscore {
                        ival = (qscore - lscore) as f64 / (uscore - lscore) as f64;
                    } else {
                        ival = 0.0;
                    }
                    upper
                }
            };
            let _ = writeln!(
                log,
                "    SCORE\tlscore = {}; uscore = {}; qscore = {}; qscore_ex = {}; ival = {}",
                lscore, uscore, qscore, qscore_ex, ival
            );

            let taxsig = 0.0; // placeholder until a real signal model exists
            ival_global = ival_global.max(ival);
            anchors_taxsig = anchors_taxsig.min(taxsig);
            unode_global = tax.lca(unode_global, unode);
            lnode_global = tax.lca(lnode_global, lnode);

            if qgroup.is_empty() || lnode_global == root {
                break;
            }
        }
        let _ = writeln!(log, "    NUMALN\t{}\t{}", pass_1_counter, naive_1_counter - pass_1_counter);
        let _ = writeln!(log, "    NUMOUTGRP\t{}", outgroup.len());
        let _ = writeln!(
            log,
            "    RANGE\t{}\t{}\t{}\n",
            tax.node(rtax).name,
            tax.node(lnode_global).name,
            tax.node(unode_global).name
        );

        // ---- pass 2: grow the upper node using the outgroup anchors
        let _ = writeln!(log, "  PASS\t2");
        let mut pass_2_counter = 0usize;
        let mut computed_2 = 0usize;
        let mut naive_2 = 0usize;

        while let Some(index_anchor) = outgroup.pop_first() {
            if unode_global == lca_all {
                // no further widening is possible
                naive_2 += if matches[index_anchor] == 0 { n } else { n - 1 };
                continue;
            }

            if matches[index_anchor] == 0 {
                let d = edit_distance(&rrseqs[index_anchor], &qrseq);
                let m = rrseqs[index_anchor].len().max(qrseq.len()) - d;
                let _ = writeln!(
                    log,
                    "    +ALN query <=> {}\tscore = {}; matches = {}",
                    index_anchor, d, m
                );
                qscores[index_anchor] = d as i32;
                matches[index_anchor] = m;
                pass_2_counter += 1;
                computed_2 += 1;
                naive_2 += 1;
            }
            let qscore_ex = (qscores[index_anchor] as f64 * bandfactor_max) as i32;

            for i in 0..n {
                let cnode = records[i].reference_node;
                let score;
                if i == index_anchor {
                    score = 0;
                } else {
                    naive_2 += 1;
                    if cnode == unode_global || tax.is_ancestor(unode_global, cnode) {
                        // already inside the current upper bound
                        score = INFINITE_SCORE;
                    } else {
                        let d = edit_distance(&rrseqs[i], &rrseqs[index_anchor]);
                        let _ = writeln!(log, "    +ALN {} <=> {}\tscore = {}", i, index_anchor, d);
                        qscores[i] = d as i32;
                        pass_2_counter += 1;
                        computed_2 += 1;
                        score = d as i32;
                    }
                }

                if score == 0 {
                    outgroup.remove(&i);
                }
                if score <= qscore_ex {
                    unode_global = tax.lca(unode_global, cnode);
                }
            }
        }
        let _ = writeln!(log, "    NUMALN\t{}\t{}", computed_2, naive_2 - computed_2);

        // ---- finalisation
        if unode_global == lnode_global {
            ival_global = 1.0;
        }
        let _ = writeln!(
            log,
            "    RANGE\t{}\t{}\t{}\n",
            tax.node(rtax).name,
            tax.node(lnode_global).name,
            tax.node(unode_global).name
        );

        let total = pass_0_counter + pass_1_counter + pass_2_counter;
        let _ = writeln!(
            log,
            "STATS\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\n",
            seqname,
            n,
            pass_0_counter,
            pass_1_counter,
            pass_2_counter,
            total,
            total as f64 / n as f64
        );

        debug_assert!((0.0..=1.0).contains(&ival_global));
        debug_assert!(lnode_global == rtax || tax.is_ancestor(lnode_global, rtax));
        debug_assert!(unode_global == lnode_global || tax.is_ancestor(unode_global, lnode_global));

        PredictionRecord {
            query_id: qid,
            feature_begin: qr_start,
            feature_end: qr_stop,
            interpolation: ival_global,
            lower_node: lnode_global,
            upper_node: unode_global,
            support: anchors_support,
            best_reference: Some(rtax),
            signal_strength: anchors_taxsig,
        }
    }

    /// Cut each reference segment out of its source sequence, extended
    /// on both sides so that it covers the full query window. For
    /// reverse-orientation records the extensions swap sides and the
    /// reverse complement is retrieved.
    fn reference_segments(
        &self,
        records: &[&AlignmentRecord],
        qr_start: usize,
        qr_stop: usize,
    ) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut rrseqs = Vec::with_capacity(records.len());
        for rec in records {
            let left_ext = rec.query_start - qr_start;
            let right_ext = qr_stop - rec.query_stop;
            let segment = if !rec.is_reverse() {
                let start = rec.reference_start.saturating_sub(left_ext).max(1);
                let stop = rec.reference_stop + right_ext;
                self.references.get(&rec.reference_id, start, stop)?
            } else {
                let start = rec.reference_stop.saturating_sub(right_ext).max(1);
                let stop = rec.reference_start + left_ext;
                self.references
                    .get_reverse_complement(&rec.reference_id, start, stop)?
            };
            rrseqs.push(segment);
        }
        Ok(rrseqs)
    }

    /// Root-to-root prediction for queries that cannot be placed.
    fn unclassified(&self, set: &RecordSet) -> PredictionRecord {
        let root = self.taxonomy.root();
        let (begin, end) = set
            .records
            .first()
            .map(|rec| (1, rec.query_length))
            .unwrap_or((0, 0));
        PredictionRecord {
            query_id: set.query_id.clone(),
            feature_begin: begin,
            feature_end: end,
            interpolation: 1.0,
            lower_node: root,
            upper_node: root,
            support: 0,
            best_reference: None,
            signal_strength: 0.0,
        }
    }
}
