//! Gene span lookup per reference.

use crate::annotation::GeneModel;
use crate::types::{Pos, RefId, Strand};
use coitrees::{BasicCOITree, Interval, IntervalTree};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct GeneSpan {
    gene: u32,
    strand: Strand,
}

/// One interval tree per genome reference id, over the spans of its genes.
/// Gene ids are indices into that reference's gene list.
#[derive(Default)]
pub struct GeneIntervals {
    trees: Vec<Option<BasicCOITree<GeneSpan, u32>>>,
}

impl GeneIntervals {
    /// Build the trees, mapping reference names to genome ids with `tid_of`.
    /// Genes on references unknown to `tid_of` are dropped.
    pub fn new<F>(model: &GeneModel, tid_of: F) -> Self
    where
        F: Fn(&str) -> Option<RefId>,
    {
        let mut trees: Vec<Option<BasicCOITree<GeneSpan, u32>>> = Vec::new();
        for r in model.refs() {
            let Some(tid) = tid_of(&r.name) else {
                debug!(reference = %r.name, "Annotated reference missing from genome header");
                continue;
            };
            let intervals: Vec<Interval<GeneSpan>> = r
                .genes
                .iter()
                .enumerate()
                .map(|(i, g)| {
                    Interval::new(
                        g.lft as i32,
                        g.rgt as i32,
                        GeneSpan {
                            gene: i as u32,
                            strand: g.strand,
                        },
                    )
                })
                .collect();
            if trees.len() <= tid {
                trees.resize_with(tid + 1, || None);
            }
            trees[tid] = Some(BasicCOITree::new(&intervals));
        }
        Self { trees }
    }

    pub fn is_empty(&self) -> bool {
        self.trees.iter().all(Option::is_none)
    }

    /// Sorted ids of the genes overlapping `[lft, rgt]`, restricted to
    /// `strand` unless it is `Both`.
    pub fn find_overlap_ids(&self, tid: RefId, lft: Pos, rgt: Pos, strand: Strand) -> Vec<u32> {
        let mut ids = Vec::new();
        let Some(Some(tree)) = self.trees.get(tid) else {
            return ids;
        };
        tree.query(lft as i32, rgt as i32, |node| {
            if node.metadata.strand.matches(strand) {
                ids.push(node.metadata.gene);
            }
        });
        ids.sort_unstable();
        ids
    }

    /// True if some gene overlaps both intervals.
    pub fn share_gene(&self, tid: RefId, a: (Pos, Pos), b: (Pos, Pos), strand: Strand) -> bool {
        let g1 = self.find_overlap_ids(tid, a.0, a.1, strand);
        if g1.is_empty() {
            return false;
        }
        let g2 = self.find_overlap_ids(tid, b.0, b.1, strand);
        g2.iter().any(|g| g1.binary_search(g).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::GeneModelBuilder;

    fn intervals() -> GeneIntervals {
        let mut b = GeneModelBuilder::new();
        b.add_exon("chr1", "a", "a1", Strand::Plus, 100, 200);
        b.add_exon("chr1", "a", "a1", Strand::Plus, 900, 1000);
        b.add_exon("chr1", "b", "b1", Strand::Minus, 150, 500);
        b.add_exon("chr9", "c", "c1", Strand::Plus, 0, 50);
        let model = b.finish();
        GeneIntervals::new(&model, |name| (name == "chr1").then_some(2))
    }

    #[test]
    fn overlap_with_strand_filter() {
        let gi = intervals();
        assert_eq!(gi.find_overlap_ids(2, 160, 170, Strand::Both), vec![0, 1]);
        assert_eq!(gi.find_overlap_ids(2, 160, 170, Strand::Plus), vec![0]);
        assert_eq!(gi.find_overlap_ids(2, 160, 170, Strand::Minus), vec![1]);
        assert!(gi.find_overlap_ids(2, 1001, 2000, Strand::Both).is_empty());
        assert!(gi.find_overlap_ids(0, 160, 170, Strand::Both).is_empty());
        assert!(gi.find_overlap_ids(7, 160, 170, Strand::Both).is_empty());
    }

    #[test]
    fn shared_gene() {
        let gi = intervals();
        assert!(gi.share_gene(2, (100, 120), (950, 980), Strand::Both));
        assert!(!gi.share_gene(2, (400, 450), (950, 980), Strand::Both));
        assert!(!gi.share_gene(2, (100, 120), (950, 980), Strand::Minus));
    }
}
