//! Insert-size estimates for pass 1 from annotation regions that can hold
//! only one transcript structure.
//!
//! Two kinds of regions qualify: single-isoform genes that overlap no other
//! gene, and long exons of multi-isoform genes that overlap no other exon of
//! their gene. A pair whose inner mate ends both fall in one region has an
//! unambiguous insert size.

use crate::annotation::{Exon, Gene, GeneModel};
use crate::read_pair::ReadPair;
use crate::types::{Pos, RefId, Strand};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertEstimate {
    /// Exonic bases between the mates; 0 when they overlap.
    pub dist: i64,
    pub overlaps: bool,
}

#[derive(Debug, Clone)]
enum BlockKind {
    LongExon,
    SingleIsoform(Vec<Exon>),
}

#[derive(Debug, Clone)]
struct DistBlock {
    lft: Pos,
    rgt: Pos,
    kind: BlockKind,
}

impl DistBlock {
    fn contains(&self, p: Pos) -> bool {
        self.lft <= p && p <= self.rgt
    }

    /// `p1` is the last base of the left mate, `p2` the first of the right.
    fn insert_size(&self, p1: Pos, p2: Pos, overlaps: bool) -> Option<InsertEstimate> {
        if overlaps {
            return Some(InsertEstimate { dist: 0, overlaps });
        }
        let p1 = p1 as i64;
        let p2 = p2 as i64;
        let exons = match &self.kind {
            BlockKind::LongExon => {
                return Some(InsertEstimate {
                    dist: p2 - p1 - 1,
                    overlaps,
                });
            }
            BlockKind::SingleIsoform(exons) => exons,
        };

        let hit = |p: i64| exons.iter().rposition(|e| e.lft as i64 <= p && p <= e.rgt as i64);
        let (i1, i2) = (hit(p1)?, hit(p2)?);
        if i1 == i2 {
            return Some(InsertEstimate {
                dist: p2 - p1 - 1,
                overlaps,
            });
        }
        let inner: i64 = exons[i1 + 1..i2].iter().map(|e| e.length() as i64).sum();
        let dist = (exons[i1].rgt as i64 - p1) + inner + (p2 - exons[i2].lft as i64);
        Some(InsertEstimate { dist, overlaps })
    }
}

#[derive(Debug, Default)]
struct RefEstimator {
    plus: Vec<DistBlock>,
    minus: Vec<DistBlock>,
}

impl RefEstimator {
    fn add(&mut self, strand: Strand, block: DistBlock) {
        if strand == Strand::Plus {
            self.plus.push(block);
        } else {
            self.minus.push(block);
        }
    }

    fn sort(&mut self) {
        self.plus.sort_unstable_by_key(|b| (b.lft, b.rgt));
        self.minus.sort_unstable_by_key(|b| (b.lft, b.rgt));
    }

    fn estimate(&self, p: &ReadPair<'_>) -> Option<InsertEstimate> {
        match p.strand {
            Strand::Plus => estimate_in(&self.plus, p),
            Strand::Minus => estimate_in(&self.minus, p),
            Strand::Both => match (estimate_in(&self.plus, p), estimate_in(&self.minus, p)) {
                (Some(_), Some(_)) => None,
                (d1, d2) => d1.or(d2),
            },
        }
    }
}

fn estimate_in(blocks: &[DistBlock], p: &ReadPair<'_>) -> Option<InsertEstimate> {
    let (p1, p2) = (p.s1.rrgt, p.s2.rlft);
    let pos = p1.min(p2) as i64 - 1;
    let i = blocks.partition_point(|b| (b.rgt as i64) < pos);
    let block = blocks.get(i)?;
    if !block.contains(p1) || !block.contains(p2) {
        return None;
    }
    block.insert_size(p1, p2, p.overlaps)
}

/// Marks every entry of a `(lft, rgt)`-sorted list that overlaps a later one.
fn mark_overlaps(spans: &[(Pos, Pos)]) -> Vec<bool> {
    let mut overlaps = vec![false; spans.len()];
    for i in 0..spans.len() {
        let mut j = i + 1;
        while j < spans.len() && spans[i].1 >= spans[j].0 {
            overlaps[i] = true;
            overlaps[j] = true;
            j += 1;
        }
    }
    overlaps
}

#[derive(Debug, Default)]
pub struct EstimateDist {
    refs: Vec<Option<RefEstimator>>,
    annotated: bool,
}

impl EstimateDist {
    /// Build the region lists. `tid_of` maps annotation reference names to
    /// genome reference ids.
    pub fn new<F>(model: &GeneModel, min_exon: u32, tid_of: F) -> Self
    where
        F: Fn(&str) -> Option<RefId>,
    {
        let mut refs: Vec<Option<RefEstimator>> = Vec::new();
        let (mut isoforms, mut exons) = (0usize, 0usize);

        for r in model.refs() {
            let Some(tid) = tid_of(&r.name) else {
                debug!(reference = %r.name, "Annotated reference missing from genome header");
                continue;
            };
            let mut est = RefEstimator::default();
            let spans: Vec<(Pos, Pos)> = r.genes.iter().map(|g| (g.lft, g.rgt)).collect();
            let overlaps = mark_overlaps(&spans);

            for (gene, _) in r.genes.iter().zip(overlaps).filter(|(_, o)| !o) {
                if let [tx] = gene.transcripts.as_slice() {
                    est.add(
                        gene.strand,
                        DistBlock {
                            lft: tx.lft(),
                            rgt: tx.rgt(),
                            kind: BlockKind::SingleIsoform(tx.exons.clone()),
                        },
                    );
                    isoforms += 1;
                } else {
                    exons += add_long_exons(gene, min_exon, &mut est);
                }
            }
            est.sort();

            if refs.len() <= tid {
                refs.resize_with(tid + 1, || None);
            }
            refs[tid] = Some(est);
        }

        info!(
            single_isoforms = isoforms,
            long_exons = exons,
            "Built fragment size estimation regions"
        );
        Self {
            refs,
            annotated: !model.is_empty(),
        }
    }

    /// Estimate the insert size of `p`, or `None` when no region explains
    /// it. Without any annotation the raw gap is used.
    pub fn estimate(&self, p: &ReadPair<'_>) -> Option<InsertEstimate> {
        if !self.annotated {
            let dist = if p.overlaps { 0 } else { p.dist };
            return Some(InsertEstimate {
                dist,
                overlaps: p.overlaps,
            });
        }
        let tid = p.r1.tid?;
        self.refs.get(tid)?.as_ref()?.estimate(p)
    }
}

fn add_long_exons(gene: &Gene, min_exon: u32, est: &mut RefEstimator) -> usize {
    let mut exons: Vec<Exon> = gene
        .transcripts
        .iter()
        .flat_map(|t| t.exons.iter().copied())
        .collect();
    exons.sort_unstable();
    exons.dedup();

    let spans: Vec<(Pos, Pos)> = exons.iter().map(|e| (e.lft, e.rgt)).collect();
    let overlaps = mark_overlaps(&spans);
    let mut added = 0;
    for (e, _) in exons.iter().zip(overlaps).filter(|(_, o)| !o) {
        if e.length() >= min_exon {
            est.add(
                gene.strand,
                DistBlock {
                    lft: e.lft,
                    rgt: e.rgt,
                    kind: BlockKind::LongExon,
                },
            );
            added += 1;
        }
    }
    added
}
