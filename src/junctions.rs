//! Annotated splice junction graph used to explain large mate gaps.
//!
//! For a pair whose mates are too far apart to be a plausible fragment on
//! the genome, the search walks chains of non-overlapping introns between
//! the end of mate 1 and the start of mate 2, removing each intron from the
//! gap, and keeps the placement whose fragment size is most likely under the
//! size distribution.

use crate::read_pair::ReadPair;
use crate::size_dist::SizeDist;
use crate::types::{HashMap, HashMapExt, Pos, RefId, Strand};
use tracing::info;

/// An intron given by its flanking exonic bases: `lft` is the last base of
/// the upstream exon, `rgt` the first base of the downstream exon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Junction {
    pub tid: RefId,
    pub lft: Pos,
    pub rgt: Pos,
    pub strand: Strand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JuncBlock {
    pub lft: Pos,
    pub rgt: Pos,
    /// First later junction starting at or after this one's `rgt`.
    pub next_index: usize,
}

/// Junctions of one reference, split by strand.
#[derive(Debug, Default)]
pub struct RefJunctions {
    plus: Vec<JuncBlock>,
    minus: Vec<JuncBlock>,
}

impl RefJunctions {
    fn add(&mut self, lft: Pos, rgt: Pos, strand: Strand) {
        let block = JuncBlock {
            lft,
            rgt,
            next_index: 0,
        };
        match strand {
            Strand::Plus => self.plus.push(block),
            Strand::Minus => self.minus.push(block),
            Strand::Both => {}
        }
    }

    fn prepare(&mut self) {
        prepare_list(&mut self.plus);
        prepare_list(&mut self.minus);
    }

    pub fn juncs(&self, strand: Strand) -> &[JuncBlock] {
        match strand {
            Strand::Minus => &self.minus,
            _ => &self.plus,
        }
    }

    pub fn len(&self) -> usize {
        self.plus.len() + self.minus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prepare_list(juncs: &mut Vec<JuncBlock>) {
    juncs.sort_unstable_by_key(|j| (j.lft, j.rgt));
    juncs.dedup_by_key(|j| (j.lft, j.rgt));
    let n = juncs.len();
    for i in 0..n {
        let rgt = juncs[i].rgt;
        juncs[i].next_index = (i + 1..n).find(|&j| juncs[j].lft >= rgt).unwrap_or(n);
    }
}

/// Index of the first junction with `lft >= p`.
pub fn find(juncs: &[JuncBlock], p: i64) -> usize {
    juncs.partition_point(|j| (j.lft as i64) < p)
}

/// Best explanation of a mate gap.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistEstimate {
    /// Exonic bases between the mates.
    pub isize: i64,
    /// Height of the resulting fragment size; 0 if unexplained.
    pub height: f64,
}

#[derive(Debug)]
pub struct PairJunctions {
    refs: HashMap<RefId, RefJunctions>,
    min_exonic: u32,
    max_iter: usize,
}

impl PairJunctions {
    pub fn new(min_exonic: u32, max_iter: usize) -> Self {
        Self {
            refs: HashMap::new(),
            min_exonic,
            max_iter,
        }
    }

    /// Add an intron. Junctions of unknown strand are ignored.
    pub fn add_junction(&mut self, junc: Junction) {
        if !junc.strand.is_known() {
            return;
        }
        self.refs
            .entry(junc.tid)
            .or_default()
            .add(junc.lft, junc.rgt, junc.strand);
    }

    /// Sort, de-duplicate and link the junctions. Call once after the last
    /// `add_junction`.
    pub fn prepare(&mut self) {
        for r in self.refs.values_mut() {
            r.prepare();
        }
        let total: usize = self.refs.values().map(RefJunctions::len).sum();
        info!(junctions = total, "Prepared junctions for read pairing");
    }

    pub fn reference(&self, tid: RefId) -> Option<&RefJunctions> {
        self.refs.get(&tid)
    }

    /// Estimate the exonic distance between the mates of `p`.
    ///
    /// The plain genomic gap is the baseline; each strand allowed by the
    /// pair is then searched for a chain of introns giving a higher height.
    pub fn estimate_dist(&self, p: &ReadPair<'_>, dist: &SizeDist) -> DistEstimate {
        if p.discordant {
            return DistEstimate::default();
        }

        let lens = p.read_lens() as i64;
        let lft = p.s1.rrgt as i64;
        let rgt = p.s2.rlft as i64;
        let cd = rgt - lft - 1;
        let mut best = DistEstimate {
            isize: cd,
            height: dist.height(lens + cd),
        };

        let Some(refj) = p.r1.tid.and_then(|tid| self.refs.get(&tid)) else {
            return best;
        };

        let up = self.min_exonic.min(p.r1.cigar.exonic_tail()) as i64;
        let down = self.min_exonic.min(p.r2.cigar.exonic_head()) as i64;

        for strand in [Strand::Plus, Strand::Minus] {
            if !strand.matches(p.strand) {
                continue;
            }
            let juncs = refj.juncs(strand);
            // each strand gets its own visit budget
            let mut search = Search {
                juncs,
                dist,
                lens,
                down,
                max_iter: self.max_iter,
                iter: 0,
            };
            let t = search.run(find(juncs, lft - up), lft, rgt, 0);
            if t.height > best.height {
                best = t;
            }
        }
        best
    }
}

/// State of one strand's bounded depth-first search.
struct Search<'s> {
    juncs: &'s [JuncBlock],
    dist: &'s SizeDist,
    lens: i64,
    down: i64,
    max_iter: usize,
    iter: usize,
}

impl Search<'_> {
    /// Explore junctions from index `i`, with `lft` the current exonic
    /// position, `rgt` the start of mate 2 and `acc` the exonic bases
    /// already collected. Stops early once the visit budget is spent and
    /// returns the best placement seen so far.
    fn run(&mut self, mut i: usize, lft: i64, rgt: i64, acc: i64) -> DistEstimate {
        let mut best = DistEstimate::default();
        self.iter += 1;
        if self.iter >= self.max_iter {
            return best;
        }

        let cutoff = self.dist.cutoff() as i64;
        while i < self.juncs.len()
            && self.juncs[i].rgt as i64 <= rgt + self.down
            && self.iter < self.max_iter
        {
            let j = self.juncs[i];
            let d = (j.lft as i64 - lft) + acc;
            if d < cutoff {
                let cd = rgt - j.rgt as i64 + d;
                let height = self.dist.height(self.lens + cd);
                if height > best.height {
                    best = DistEstimate { isize: cd, height };
                }
                let next = j.next_index;
                if next < self.juncs.len() && (self.juncs[next].lft as i64) < rgt {
                    let t = self.run(next, j.rgt as i64, rgt, d + 1);
                    if t.height > best.height {
                        best = t;
                    }
                }
            }
            i += 1;
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_pair::ReadPairFactory;
    use crate::record::{Alignment, Cigar};
    use noodles::sam::alignment::record::Flags;

    fn junc(lft: Pos, rgt: Pos) -> Junction {
        Junction {
            tid: 0,
            lft,
            rgt,
            strand: Strand::Plus,
        }
    }

    fn aln(lft: u32, cigar: &str, reverse: bool) -> Alignment {
        let cigar: Cigar = cigar.parse().unwrap();
        let len = cigar.query_len() as usize;
        Alignment {
            tid: Some(0),
            lft,
            cigar,
            flags: if reverse {
                Flags::REVERSE_COMPLEMENTED
            } else {
                Flags::empty()
            },
            seq: vec![b'A'; len],
            qual: vec![30; len],
            ..Default::default()
        }
    }

    fn dist() -> SizeDist {
        let mut d = SizeDist::new(0.99, 1000);
        for s in 200..450 {
            d.add_fragment(s);
        }
        d.normalize();
        d
    }

    #[test]
    fn next_index_is_first_non_overlapping_successor() {
        let mut pj = PairJunctions::new(8, 500);
        for (l, r) in [(100, 200), (150, 300), (150, 300), (210, 260), (300, 400), (500, 600)] {
            pj.add_junction(junc(l, r));
        }
        pj.add_junction(Junction {
            tid: 0,
            lft: 1,
            rgt: 2,
            strand: Strand::Both,
        });
        pj.prepare();
        let juncs = pj.reference(0).unwrap().juncs(Strand::Plus);
        assert_eq!(juncs.len(), 5);
        for (i, j) in juncs.iter().enumerate() {
            let expected = (i + 1..juncs.len())
                .find(|&k| juncs[k].lft >= j.rgt)
                .unwrap_or(juncs.len());
            assert_eq!(j.next_index, expected);
        }
        assert_eq!(juncs[0].next_index, 2);
        assert_eq!(juncs[4].next_index, 5);
        assert_eq!(find(juncs, 150), 1);
        assert_eq!(find(juncs, 700), 5);
    }

    #[test]
    fn single_intron_explains_gap() {
        let mut pj = PairJunctions::new(8, 500);
        // 1000 base intron between 1149 and 2150
        pj.add_junction(junc(1149, 2150));
        pj.prepare();
        let d = dist();
        let m1 = aln(1000, "100M", false);
        let m2 = aln(2200, "100M", true);
        let p = ReadPairFactory::default().build(&m1, &m2);
        let est = pj.estimate_dist(&p, &d);
        assert_eq!(est.isize, 100);
        assert!(est.height > 0.0);
    }

    #[test]
    fn chain_of_introns() {
        let mut pj = PairJunctions::new(8, 500);
        pj.add_junction(junc(1149, 2150));
        pj.add_junction(junc(2199, 5000));
        pj.prepare();
        let d = dist();
        let m1 = aln(1000, "100M", false);
        let m2 = aln(5050, "100M", true);
        let p = ReadPairFactory::default().build(&m1, &m2);
        let est = pj.estimate_dist(&p, &d);
        // three exonic runs of 50 bases
        assert_eq!(est.isize, 150);
        assert!(est.height > 0.0);
    }

    #[test]
    fn unexplained_gap_has_no_height() {
        let mut pj = PairJunctions::new(8, 500);
        pj.add_junction(junc(1149, 2150));
        pj.prepare();
        let d = dist();
        let m1 = aln(1000, "100M", false);
        let m2 = aln(2_001_000, "100M", true);
        let p = ReadPairFactory::default().build(&m1, &m2);
        assert_eq!(pj.estimate_dist(&p, &d).height, 0.0);
    }

    #[test]
    fn exhausted_budget_returns_baseline() {
        let mut pj = PairJunctions::new(8, 1);
        pj.add_junction(junc(1149, 2150));
        pj.prepare();
        let d = dist();
        let m1 = aln(1000, "100M", false);
        let m2 = aln(2200, "100M", true);
        let p = ReadPairFactory::default().build(&m1, &m2);
        let est = pj.estimate_dist(&p, &d);
        assert_eq!(est.isize, 1100);
        assert_eq!(est.height, 0.0);
    }
}
