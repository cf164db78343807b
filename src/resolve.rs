//! Map fragment-space alignments back onto the genome.

use crate::fragments::{FragmentMap, FragmentSet};
use crate::record::{Alignment, CigarOp, tags};
use crate::types::{HashMap, HashMapExt, RefId};
use anyhow::{Result, anyhow, bail};

pub struct ResolveFragments {
    frags: FragmentMap,
    /// Fragment id for every reference of the fragment alignment header.
    tid2set: Vec<u32>,
    /// Genome reference id for every reference of the fragment alignment header.
    tid2ref: Vec<RefId>,
}

impl ResolveFragments {
    /// `fragment_refs` are the reference names of the fragment alignments
    /// (the fragment ids), `genome_refs` those of the genome alignments.
    pub fn new<F, G>(frags: FragmentMap, fragment_refs: F, genome_refs: G) -> Result<Self>
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        G: IntoIterator,
        G::Item: AsRef<str>,
    {
        let mut genome_tids = HashMap::new();
        for (tid, name) in genome_refs.into_iter().enumerate() {
            genome_tids.insert(name.as_ref().to_string(), tid);
        }

        let mut tid2set = Vec::new();
        let mut tid2ref = Vec::new();
        for name in fragment_refs {
            let name = name.as_ref();
            let id: u32 = name
                .parse()
                .map_err(|_| anyhow!("fragment reference name is not a fragment id: {name}"))?;
            let set = frags
                .get(id)
                .ok_or_else(|| anyhow!("fragment {id} is missing from the fragment database"))?;
            let tid = genome_tids.get(&set.chrom).ok_or_else(|| {
                anyhow!("fragment {id} lies on {} which is not in the genome header", set.chrom)
            })?;
            tid2set.push(id);
            tid2ref.push(*tid);
        }

        Ok(Self {
            frags,
            tid2set,
            tid2ref,
        })
    }

    pub fn fragment_map(&self) -> &FragmentMap {
        &self.frags
    }

    fn lookup(&self, tid: RefId) -> Result<(&FragmentSet, RefId)> {
        let id = *self
            .tid2set
            .get(tid)
            .ok_or_else(|| anyhow!("fragment reference id {tid} out of range"))?;
        let set = self
            .frags
            .get(id)
            .ok_or_else(|| anyhow!("fragment {id} is missing from the fragment database"))?;
        Ok((set, self.tid2ref[tid]))
    }

    /// Translate a fragment-space alignment to genome coordinates, inserting
    /// an intron at every block boundary it crosses.
    ///
    /// Alignments that stay inside a single block are marked filtered and
    /// returned untouched, the genome alignment already covers them.
    pub fn resolve(&self, mut r: Alignment) -> Result<Alignment> {
        let tid = r
            .tid
            .ok_or_else(|| anyhow!("cannot resolve an unaligned fragment record"))?;
        let (set, ref_tid) = self.lookup(tid)?;
        let blocks = &set.blocks;

        let lft = r.lft;
        let rgt = r.rgt();
        let mut i = blocks
            .iter()
            .position(|b| lft <= b.r_rgt)
            .ok_or_else(|| anyhow!("position {lft} lies past the end of fragment {}", set.id))?;
        if lft < blocks[i].r_lft {
            bail!("position {lft} lies outside every block of fragment {}", set.id);
        }

        if rgt <= blocks[i].r_rgt {
            r.filtered = true;
            return Ok(r);
        }

        let genome_lft = lft - blocks[i].r_lft + blocks[i].lft;
        let mut pos = lft;
        let mut ops = Vec::with_capacity(r.cigar.ops.len() + blocks.len());

        for &(len, op) in &r.cigar.ops {
            if !op.has_bases() {
                ops.push((len, op));
                continue;
            }
            let mut len = len;
            loop {
                let block = blocks[i];
                let np = pos + len - 1;
                let crosses = np > block.r_rgt;
                if !crosses && !(np == block.r_rgt && rgt > block.r_rgt) {
                    ops.push((len, op));
                    pos += len;
                    break;
                }

                let next = blocks.get(i + 1).ok_or_else(|| {
                    anyhow!("alignment runs past the last block of fragment {}", set.id)
                })?;
                let tail = np.saturating_sub(block.r_rgt);
                let head = len - tail;
                if head > 0 {
                    ops.push((head, op));
                }
                pos += head;
                ops.push((next.lft - block.rgt - 1, CigarOp::RefSkip));
                i += 1;

                if tail == 0 {
                    break;
                }
                len = tail;
            }
        }

        r.cigar.ops = ops;
        r.lft = genome_lft;
        r.tid = Some(ref_tid);
        r.clear_mate();
        r.set_int_tag(tags::zj(), set.id as i32);
        if set.strand.is_known() {
            r.set_char_tag(tags::xs(), set.strand.to_char());
        }
        Ok(r)
    }

    /// Soft clip terminal exonic anchors shorter than `min_exonic` together
    /// with the intron they hang off.
    ///
    /// The record is marked filtered if an indel touching an intron exceeds
    /// `max_splice_indel` (when non-zero) or no intron remains.
    pub fn trim(&self, mut r: Alignment, min_exonic: u32, max_splice_indel: u32) -> Alignment {
        if min_exonic < 1 {
            return r;
        }
        if !r.cigar.has_skip() {
            r.filtered = true;
            return r;
        }

        let fa = r.cigar.first_aligned();
        let la = r.cigar.last_aligned();

        if fa < min_exonic
            && let Some(skip) = r.cigar.ops.iter().position(|(_, op)| *op == CigarOp::RefSkip)
        {
            let ops = &r.cigar.ops;
            let mut sc = 0;
            let mut lft = r.lft;
            for &(len, op) in &ops[..skip] {
                match op {
                    CigarOp::Del => lft += len,
                    CigarOp::Ins | CigarOp::SoftClip => sc += len,
                    _ if op.is_match() => {
                        lft += len;
                        sc += len;
                    }
                    _ => {}
                }
            }
            lft += ops[skip].0;
            let mut rest = skip + 1;
            match ops.get(rest) {
                Some(&(len, CigarOp::Del)) => {
                    lft += len;
                    rest += 1;
                }
                Some(&(len, CigarOp::Ins)) => {
                    sc += len;
                    rest += 1;
                }
                _ => {}
            }
            r.cigar.ops.drain(..rest);
            r.lft = lft;
            r.cigar.prepend_operation(sc, CigarOp::SoftClip);
        }

        if la < min_exonic
            && let Some(skip) = r.cigar.ops.iter().rposition(|(_, op)| *op == CigarOp::RefSkip)
        {
            let ops = &r.cigar.ops;
            let mut sc: u32 = ops[skip + 1..]
                .iter()
                .filter(|(_, op)| op.is_match() || matches!(op, CigarOp::Ins | CigarOp::SoftClip))
                .map(|(len, _)| *len)
                .sum();
            let mut keep = skip;
            if keep > 0 {
                match ops[keep - 1] {
                    (len, CigarOp::Ins) => {
                        sc += len;
                        keep -= 1;
                    }
                    (_, CigarOp::Del) => keep -= 1,
                    _ => {}
                }
            }
            r.cigar.ops.truncate(keep);
            r.cigar.add_operation(sc, CigarOp::SoftClip);
        }

        let mut failed = false;
        if max_splice_indel > 0 {
            for w in r.cigar.ops.windows(2) {
                let (a, b) = (w[0], w[1]);
                let sz = if a.1 == CigarOp::RefSkip && b.1.is_indel() {
                    b.0
                } else if a.1.is_indel() && b.1 == CigarOp::RefSkip {
                    a.0
                } else {
                    continue;
                };
                if sz > max_splice_indel {
                    failed = true;
                    break;
                }
            }
        }
        r.filtered = failed || !r.cigar.has_skip();
        r
    }
}
