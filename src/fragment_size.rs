//! Fragment-size classification of mate pairs.
//!
//! Pass 1 measures pairs that only admit one insert size and feeds them to a
//! [`SizeDist`]; pass 2 scores every candidate pair against the frozen
//! distribution and decides whether it is concordant.

use crate::estimate_dist::EstimateDist;
use crate::intervals::GeneIntervals;
use crate::junctions::PairJunctions;
use crate::read_pair::ReadPair;
use crate::record::{Alignment, CigarOp};
use crate::size_dist::SizeDist;

#[derive(Debug, Clone, Copy)]
pub struct FragmentSizeConfig {
    /// Gaps longer than this are discordant without a junction search.
    pub max_dist: i64,
    /// Unexplained gaps up to this size are concordant when both mates sit in
    /// one annotated gene. 0 disables the rule.
    pub max_gene_dist: i64,
    /// Unexplained gaps up to this size are concordant outright. 0 disables
    /// the rule.
    pub fallback_dist: i64,
    pub score_bonus: f64,
}

impl Default for FragmentSizeConfig {
    fn default() -> Self {
        Self {
            max_dist: 1_000_000,
            max_gene_dist: 0,
            fallback_dist: 0,
            score_bonus: 10.0,
        }
    }
}

pub struct FragmentSize<'a> {
    pub junctions: &'a PairJunctions,
    pub estimator: &'a EstimateDist,
    pub intervals: &'a GeneIntervals,
    pub config: FragmentSizeConfig,
}

impl FragmentSize<'_> {
    /// Classify every pair; returns how many are concordant and unfiltered.
    pub fn calculate_sizes(&self, pairs: &mut [ReadPair<'_>], dist: &SizeDist) -> usize {
        let mut passed = 0;
        for p in pairs.iter_mut() {
            self.calculate_size(p, dist);
            if !p.filtered && !p.discordant {
                passed += 1;
            }
        }
        passed
    }

    pub fn calculate_size(&self, p: &mut ReadPair<'_>, dist: &SizeDist) {
        if p.discordant || p.filtered {
            return;
        }

        if p.overlaps {
            determine_overlap(p);
            if p.discordant {
                return;
            }
            p.score = dist.height(p.fsize as i64);
            self.set_align_score(p, dist);
            p.discordant = p.score == 0.0;
            p.fragment_fail = p.score == 0.0;
            return;
        }

        let gap = p.dist;
        if gap > self.config.max_dist {
            p.discordant = true;
            return;
        }

        let t = self.junctions.estimate_dist(p, dist);
        if t.height == 0.0 {
            p.fragment_fail = true;
            p.discordant = true;
            if self.config.max_gene_dist > 0 && gap <= self.config.max_gene_dist {
                if let Some(tid) = p.r1.tid {
                    let a = (p.s1.rlft, p.s1.rrgt);
                    let b = (p.s2.rlft, p.s2.rrgt);
                    if self.intervals.share_gene(tid, a, b, p.strand) {
                        p.discordant = false;
                    }
                }
            } else if self.config.fallback_dist > 0 && gap <= self.config.fallback_dist {
                p.discordant = false;
            }
        } else {
            p.isize = t.isize as i32;
            p.score = t.height;
            p.fsize = (p.read_lens() as i64 + t.isize).max(0) as u32;
            self.set_align_score(p, dist);
        }
    }

    fn set_align_score(&self, p: &mut ReadPair<'_>, dist: &SizeDist) {
        let bonus = if dist.max_height() > 0.0 {
            self.config.score_bonus * (p.score / dist.max_height())
        } else {
            0.0
        };
        p.align_score = bonus + (p.r1.score + p.r2.score) as f64;
    }

    /// Measure a pass-1 pair and record its fragment size in `dist`. Returns
    /// false when the pair has no unambiguous size.
    pub fn estimate_size(&self, p: &mut ReadPair<'_>, dist: &mut SizeDist) -> bool {
        if p.discordant {
            return false;
        }
        let Some(d) = self.estimator.estimate(p) else {
            return false;
        };
        if d.overlaps {
            determine_overlap(p);
            if p.discordant {
                return false;
            }
        } else {
            p.isize = d.dist as i32;
            p.fsize = (p.read_lens() as i64 + d.dist).max(0) as u32;
        }
        dist.add_fragment(p.fsize as i64);
        true
    }
}

/// Overlapping mates must share their exon structure inside the common
/// region: from the first block pair that overlaps, every remaining block of
/// the left mate has to overlap the matching block of the right mate, else
/// the pair is discordant. The overlap length comes from
/// the block ends directly when both mates are unspliced, else from the mean
/// of each mate's query bases in the overlap window.
pub fn determine_overlap(p: &mut ReadPair<'_>) {
    let b1 = p.r1.blocks();
    let b2 = p.r2.blocks();

    let overlap = if let ([x], [y]) = (b1.as_slice(), b2.as_slice()) {
        x.rrgt as i64 - y.rlft as i64 + 1
    } else {
        let (mut i, mut j) = (0, 0);
        while i < b1.len() && j < b2.len() {
            if b1[i].rrgt < b2[j].rlft {
                i += 1;
            } else if b2[j].rrgt < b1[i].rlft {
                j += 1;
            } else {
                break;
            }
        }
        if i == b1.len() || j == b2.len() {
            p.discordant = true;
            return;
        }

        let (start2, mut i1, mut i2) = (j, i + 1, j + 1);
        while i1 < b1.len() && i2 < b2.len() {
            if !b1[i1].roverlaps(&b2[i2]) {
                p.discordant = true;
                return;
            }
            i1 += 1;
            i2 += 1;
        }
        if i1 < b1.len() {
            p.discordant = true;
            return;
        }

        let ostart = b2[start2].rlft as i64;
        let oend = b1.last().map_or(0, |b| b.rrgt as i64);
        let c1 = count_query_bases(p.r1, ostart, oend);
        let c2 = count_query_bases(p.r2, ostart, oend);
        (c1 + c2) / 2
    };

    p.isize = -(overlap as i32);
    p.fsize = (p.read_lens() as i64 - overlap).max(0) as u32;
}

/// Query bases of `r` placed inside `[ostart, oend]`, counting insertions
/// at or after `ostart`.
fn count_query_bases(r: &Alignment, ostart: i64, oend: i64) -> i64 {
    let mut rp = r.lft as i64;
    let mut bases = 0;
    for &(len, op) in &r.cigar.ops {
        if rp > oend {
            break;
        }
        let len = len as i64;
        match op {
            _ if op.is_match() => {
                let mut avail = len;
                let mut start = rp;
                if rp < ostart && rp + avail > ostart {
                    avail -= ostart - rp;
                    start = ostart;
                }
                if start >= ostart {
                    bases += avail.min(oend - start + 1);
                }
                rp += len;
            }
            CigarOp::Ins if rp >= ostart => bases += len,
            CigarOp::RefSkip | CigarOp::Del => rp += len,
            _ => {}
        }
    }
    bases
}
