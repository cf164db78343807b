//! Query/reference interval pairs used to compare mate placements.

use crate::record::{Cigar, CigarOp};
use crate::types::Pos;

/// Inclusive query range `[qlft, qrgt]` aligned to reference range
/// `[rlft, rrgt]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Seed {
    pub qlft: u32,
    pub qrgt: u32,
    pub rlft: Pos,
    pub rrgt: Pos,
}

impl Seed {
    pub fn new(qlft: u32, qrgt: u32, rlft: Pos, rrgt: Pos) -> Self {
        Self {
            qlft,
            qrgt,
            rlft,
            rrgt,
        }
    }

    /// True if `self` starts no later and ends no later than `other`.
    pub fn before(&self, other: &Seed) -> bool {
        self.rlft <= other.rlft && self.rrgt <= other.rrgt
    }

    /// Overlap on both the query and the reference.
    pub fn overlaps(&self, other: &Seed) -> bool {
        self.qlft <= other.qrgt && other.qlft <= self.qrgt && self.roverlaps(other)
    }

    pub fn roverlaps(&self, other: &Seed) -> bool {
        self.rlft <= other.rrgt && other.rlft <= self.rrgt
    }

    pub fn rlen(&self) -> u32 {
        self.rrgt - self.rlft + 1
    }
}

/// Split a CIGAR placed at `lft` into its exonic blocks.
///
/// A leading soft clip shifts the query start; the trailing one is ignored.
pub fn blocks(cigar: &Cigar, lft: Pos) -> Vec<Seed> {
    let mut out = Vec::new();
    let mut q = 0u32;
    let mut r = lft;
    let mut qstart = 0u32;
    let mut rstart = lft;
    let mut open = false;

    for (i, &(len, op)) in cigar.ops.iter().enumerate() {
        match op {
            CigarOp::SoftClip if i == 0 => {
                q += len;
                qstart = q;
            }
            CigarOp::RefSkip => {
                if open {
                    out.push(Seed::new(qstart, q - 1, rstart, r - 1));
                }
                r += len;
                qstart = q;
                rstart = r;
                open = false;
            }
            _ if op.is_match() => {
                q += len;
                r += len;
                open = true;
            }
            CigarOp::Ins => {
                q += len;
                open = true;
            }
            CigarOp::Del => {
                r += len;
                open = true;
            }
            _ => {}
        }
    }
    if open {
        out.push(Seed::new(qstart, q.saturating_sub(1), rstart, r.saturating_sub(1)));
    }
    out
}
