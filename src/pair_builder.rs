//! Batch workers: merge the genome and fragment hits of each mate, filter
//! them, pair the mates and classify the result.

use crate::bam_io::InputPair;
use crate::fragment_size::FragmentSize;
use crate::read_pair::{ReadPair, ReadPairFactory};
use crate::record::{Alignment, fix_seq_quals, tags};
use crate::resolve::ResolveFragments;
use crate::scoring::ScoreFilter;
use crate::seed::Seed;
use crate::size_dist::SizeDist;
use crate::splice_trim::SpliceTrimmer;
use anyhow::Result;
use noodles::sam::alignment::record::data::field::Tag;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy)]
pub struct PairConfig {
    /// Score margin for keeping alternate alignments (doubled for pairs).
    pub score_diff: u32,
    /// Most alternates written before a read counts as a repeat.
    pub max_repeat: u32,
    /// Longest span of a discordant pair that may still be written.
    pub max_discordant_dist: i64,
    /// Shortest exonic anchor kept on resolved fragment hits; 0 disables.
    pub min_length: u32,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            score_diff: 6,
            max_repeat: 10,
            max_discordant_dist: 10_000,
            min_length: 8,
        }
    }
}

/// Surviving alignments of one mate. `spare` is a dropped record of the
/// same read kept to build an unmapped placeholder.
#[derive(Debug, Default)]
pub struct MateReads {
    pub reads: Vec<Alignment>,
    spare: Option<Alignment>,
}

impl MateReads {
    fn drop_read(&mut self, r: Alignment) {
        if self.spare.is_none() {
            self.spare = Some(r);
        }
    }
}

/// Shared per-mate stages of both passes.
pub struct PairBuilder<'a> {
    pub resolver: &'a ResolveFragments,
    pub trimmer: &'a SpliceTrimmer,
    pub scorer: &'a ScoreFilter<'a>,
    pub factory: ReadPairFactory,
    pub config: PairConfig,
}

impl PairBuilder<'_> {
    /// Resolve and trim the genome and fragment hits of one mate and drop
    /// duplicates. Fragment hits that do not cross a junction are dropped.
    pub fn merge_reads(
        &self,
        mut genome: Vec<Alignment>,
        mut fragment: Vec<Alignment>,
        read_num: u8,
    ) -> Result<MateReads> {
        let mut out = MateReads::default();
        fix_seq_quals(&mut genome);
        fix_seq_quals(&mut fragment);

        let front_aligned = |g: &[Alignment]| g.first().is_some_and(Alignment::is_aligned);
        if !front_aligned(&genome) && !front_aligned(&fragment) {
            out.spare = genome.into_iter().chain(fragment).next();
            return Ok(out);
        }

        for mut r in genome {
            r.clear_tags();
            r.set_read_number(read_num);
            r.set_secondary(false);
            if !r.is_aligned() {
                r.filtered = true;
            }
            if r.filtered {
                out.drop_read(r);
            } else {
                self.trimmer.trim(&mut r);
                out.reads.push(r);
            }
        }

        for mut r in fragment {
            r.clear_tags();
            r.set_read_number(read_num);
            if r.is_aligned() {
                r = self.resolver.resolve(r)?;
            } else {
                r.filtered = true;
            }
            r.set_secondary(false);
            if !r.filtered && self.config.min_length > 0 {
                r = self.resolver.trim(r, self.config.min_length, 0);
            }
            if !r.filtered {
                self.trimmer.trim(&mut r);
                if !r.cigar.has_skip() {
                    r.filtered = true;
                }
            }
            if r.filtered {
                out.drop_read(r);
            } else {
                out.reads.push(r);
            }
        }

        remove_dups(&mut out.reads);
        Ok(out)
    }

    /// Score the mate's alignments, drop failures and spliced/unspliced
    /// overlaps, and fall back to an unmapped placeholder when nothing is
    /// left.
    pub fn filter_reads(&self, mate: &mut MateReads, read_num: u8) {
        for r in &mut mate.reads {
            if self.scorer.filter_read(r) {
                r.filtered = true;
            }
        }
        remove_overlaps(&mut mate.reads);

        let (kept, dropped): (Vec<_>, Vec<_>) =
            std::mem::take(&mut mate.reads).into_iter().partition(|r| !r.filtered);
        mate.reads = kept;
        if mate.reads.is_empty() {
            let spare = mate.spare.take().or_else(|| dropped.into_iter().next());
            if let Some(mut r) = spare {
                r.make_unmapped(read_num);
                r.filtered = false;
                mate.reads.push(r);
            }
        }
    }

    /// Merge and filter both mates of an input pair.
    pub fn prepare(&self, input: InputPair) -> Result<(MateReads, MateReads)> {
        let InputPair {
            ref1,
            tx1,
            ref2,
            tx2,
        } = input;
        let mut m1 = self.merge_reads(ref1, tx1, 1)?;
        let mut m2 = self.merge_reads(ref2, tx2, 2)?;
        self.filter_reads(&mut m1, 1);
        self.filter_reads(&mut m2, 2);
        Ok((m1, m2))
    }
}

/// Sort by position and drop alignments repeating an earlier one's
/// reference, position and CIGAR. Earlier entries win, so genome hits are
/// kept over identical resolved fragment hits.
fn remove_dups(reads: &mut Vec<Alignment>) {
    if reads.len() < 2 {
        return;
    }
    reads.sort_by_key(|r| (r.tid, r.lft, r.rgt()));
    let mut out: Vec<Alignment> = Vec::with_capacity(reads.len());
    for r in reads.drain(..) {
        let dup = out
            .iter()
            .rev()
            .take_while(|k| k.tid == r.tid && k.lft == r.lft && k.rgt() == r.rgt())
            .any(|k| k.cigar == r.cigar);
        if !dup {
            out.push(r);
        }
    }
    *reads = out;
}

fn check_overlap(spliced: &Alignment, contig: &Seed) -> bool {
    spliced.blocks().iter().any(|b| b.overlaps(contig))
}

/// Where a spliced and an unspliced alignment of neighbouring positions
/// place the same read bases on the same genome bases, filter the lower
/// scoring one (the earlier one on ties). Returns whether any was filtered.
fn remove_overlaps(reads: &mut [Alignment]) -> bool {
    let Some(first) = reads.first() else {
        return false;
    };
    let mut pb = first.seed();
    let mut ps = first.cigar.has_skip();
    let mut removed = false;

    for i in 1..reads.len() {
        if reads[i].filtered || reads[i - 1].filtered {
            continue;
        }
        let curr = reads[i].seed();
        let cs = reads[i].cigar.has_skip();
        if curr.overlaps(&pb) && ps != cs {
            let overlap =
                (ps && check_overlap(&reads[i - 1], &curr)) || (cs && check_overlap(&reads[i], &pb));
            if overlap {
                removed = true;
                if reads[i].score > reads[i - 1].score {
                    reads[i - 1].filtered = true;
                } else {
                    reads[i].filtered = true;
                }
            }
        }
        pb = curr;
        ps = cs;
    }
    removed
}

/// Pass-1 worker: measures pairs with a single plausible placement.
pub struct PairEstimator<'a> {
    pub builder: PairBuilder<'a>,
    pub sizer: FragmentSize<'a>,
    pub dist: SizeDist,
    pub num_used: usize,
    pub num_passed: usize,
    pub total: usize,
}

impl<'a> PairEstimator<'a> {
    pub fn new(builder: PairBuilder<'a>, sizer: FragmentSize<'a>, dist: SizeDist) -> Self {
        Self {
            builder,
            sizer,
            dist,
            num_used: 0,
            num_passed: 0,
            total: 0,
        }
    }

    pub fn process(&mut self, input: InputPair) -> Result<()> {
        let (m1, m2) = self.builder.prepare(input)?;
        if m1.reads.is_empty() && m2.reads.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::new();
        self.builder
            .factory
            .build_pairs(&m1.reads, &m2.reads, &mut pairs);
        self.process_one(&mut pairs);
        Ok(())
    }

    fn process_one(&mut self, pairs: &mut [ReadPair<'_>]) {
        self.total += 1;
        if self.filter_pairs(pairs) != 1 {
            return;
        }
        for p in pairs.iter_mut().filter(|p| !p.filtered) {
            if self.sizer.estimate_size(p, &mut self.dist) {
                self.num_passed += 1;
            }
        }
        self.num_used += 1;
    }

    /// Keep concordant pairs within twice the score margin of the best one.
    fn filter_pairs(&self, pairs: &mut [ReadPair<'_>]) -> usize {
        let pair_score = |p: &ReadPair<'_>| p.r1.score + p.r2.score;
        let max = pairs
            .iter()
            .filter(|p| !p.discordant)
            .map(pair_score)
            .fold(0, i32::max);
        let thresh = max - self.builder.config.score_diff as i32 * 2;
        let mut kept = 0;
        for p in pairs.iter_mut() {
            if p.discordant || pair_score(p) < thresh {
                p.filtered = true;
            } else {
                kept += 1;
            }
        }
        kept
    }
}

/// Classification tallies of pass 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCounts {
    pub unique_pair: usize,
    pub repeat_pair: usize,
    pub xrepeat_pair: usize,
    pub discordant_pair: usize,
    pub discordant_single: usize,
    pub r1_single: usize,
    pub r2_single: usize,
    pub r1_repeat: usize,
    pub r2_repeat: usize,
    pub r1_xrepeat: usize,
    pub r2_xrepeat: usize,
    pub unaligned: usize,
    pub total: usize,
}

impl OutputCounts {
    pub fn labeled(&self) -> [(&'static str, usize); 13] {
        [
            ("Unique Pairs", self.unique_pair),
            ("Repeat Pairs", self.repeat_pair),
            ("Filtered Repeat Pairs", self.xrepeat_pair),
            ("R1 Singleton", self.r1_single),
            ("R1 Repeat", self.r1_repeat),
            ("R1 Filtered Repeat", self.r1_xrepeat),
            ("R2 Singleton", self.r2_single),
            ("R2 Repeat", self.r2_repeat),
            ("R2 Filtered Repeat", self.r2_xrepeat),
            ("Discordant Pairs", self.discordant_pair),
            ("Discordant Unique", self.discordant_single),
            ("Unaligned", self.unaligned),
            ("Total", self.total),
        ]
    }
}

impl AddAssign<&OutputCounts> for OutputCounts {
    fn add_assign(&mut self, c: &OutputCounts) {
        self.unique_pair += c.unique_pair;
        self.repeat_pair += c.repeat_pair;
        self.xrepeat_pair += c.xrepeat_pair;
        self.discordant_pair += c.discordant_pair;
        self.discordant_single += c.discordant_single;
        self.r1_single += c.r1_single;
        self.r2_single += c.r2_single;
        self.r1_repeat += c.r1_repeat;
        self.r2_repeat += c.r2_repeat;
        self.r1_xrepeat += c.r1_xrepeat;
        self.r2_xrepeat += c.r2_xrepeat;
        self.unaligned += c.unaligned;
        self.total += c.total;
    }
}

/// Pass-2 worker: classifies every input pair and collects output records.
pub struct PairResolver<'a> {
    pub builder: PairBuilder<'a>,
    pub sizer: FragmentSize<'a>,
    pub dist: &'a SizeDist,
    pub output: Vec<Alignment>,
    pub counts: OutputCounts,
}

impl<'a> PairResolver<'a> {
    pub fn new(builder: PairBuilder<'a>, sizer: FragmentSize<'a>, dist: &'a SizeDist) -> Self {
        Self {
            builder,
            sizer,
            dist,
            output: Vec::new(),
            counts: OutputCounts::default(),
        }
    }

    pub fn process(&mut self, input: InputPair) -> Result<()> {
        let (m1, m2) = self.builder.prepare(input)?;
        if m1.reads.is_empty() && m2.reads.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::new();
        self.builder
            .factory
            .build_pairs(&m1.reads, &m2.reads, &mut pairs);
        self.process_one(&m1.reads, &m2.reads, &mut pairs);
        Ok(())
    }

    pub fn process_one(
        &mut self,
        merged1: &[Alignment],
        merged2: &[Alignment],
        pairs: &mut [ReadPair<'_>],
    ) {
        let r1_aligned = merged1.first().is_some_and(Alignment::is_aligned);
        let r2_aligned = merged2.first().is_some_and(Alignment::is_aligned);
        self.counts.total += 1;

        if !pairs.is_empty() {
            self.sizer.calculate_sizes(pairs, self.dist);
            self.handle_pairs(merged1, merged2, pairs);
        } else if r1_aligned && !r2_aligned {
            self.handle_single(merged1, 1);
            self.push_unmapped(merged2, 2, false);
        } else if r2_aligned && !r1_aligned {
            self.handle_single(merged2, 2);
            self.push_unmapped(merged1, 1, false);
        } else {
            self.push_unmapped(merged1, 1, false);
            self.push_unmapped(merged2, 2, false);
            self.counts.unaligned += 1;
        }
    }

    /// Keep concordant pairs within twice the score margin of the best
    /// concordant pair, or failing that a single near-best discordant pair.
    pub fn handle_pairs(
        &mut self,
        merged1: &[Alignment],
        merged2: &[Alignment],
        pairs: &mut [ReadPair<'_>],
    ) {
        let config = self.builder.config;
        let margin = config.score_diff as f64 * 2.0;
        let mate_score = |p: &ReadPair<'_>| p.r1.score + p.r2.score;

        let mut max_concordant = 0.0f64;
        let mut max_discordant = 0i32;
        for p in pairs.iter_mut() {
            if !p.discordant {
                max_concordant = max_concordant.max(p.align_score);
                continue;
            }
            let span = p.r1.rgt().max(p.r2.rgt()) as i64 - p.r1.lft.min(p.r2.lft) as i64;
            if !p.tid_fail && !p.orientation_fail && !p.overlaps && span <= config.max_discordant_dist
            {
                max_discordant = max_discordant.max(mate_score(p));
            } else {
                p.filtered = true;
            }
        }

        let thresh = max_concordant - margin;
        let thresh_d = max_discordant as f64 - margin;
        let (mut kept, mut kept_d) = (0u32, 0u32);
        for p in pairs.iter_mut() {
            if !p.discordant {
                if p.align_score >= thresh {
                    kept += 1;
                } else {
                    p.filtered = true;
                }
            } else if !p.filtered {
                if mate_score(p) as f64 >= thresh_d {
                    kept_d += 1;
                } else {
                    p.filtered = true;
                }
            }
        }

        if kept > 0 {
            if kept <= config.max_repeat {
                pairs.sort_by(|a, b| b.align_score.total_cmp(&a.align_score));
                let mut ni = 0;
                for p in pairs.iter().filter(|p| !p.discordant && !p.filtered) {
                    ni += 1;
                    let (a, b) = p.make_pair_copy(ni, kept);
                    self.output.push(a);
                    self.output.push(b);
                }
                if kept == 1 {
                    self.counts.unique_pair += 1;
                } else {
                    self.counts.repeat_pair += 1;
                }
            } else {
                self.push_unmapped(merged1, 1, true);
                self.push_unmapped(merged2, 2, true);
                self.counts.xrepeat_pair += 1;
            }
        } else if kept_d == 1 {
            if let Some(p) = pairs.iter().find(|p| p.discordant && !p.filtered) {
                let (a, b) = p.make_pair_copy(1, 1);
                self.output.push(a);
                self.output.push(b);
            }
            self.counts.discordant_single += 1;
        } else {
            self.push_unmapped(merged1, 1, false);
            self.push_unmapped(merged2, 2, false);
            self.counts.discordant_pair += 1;
        }
    }

    /// Only one mate aligned: keep its alignments within the score margin.
    pub fn handle_single(&mut self, merged: &[Alignment], read_num: u8) {
        let config = self.builder.config;
        let max_score = merged
            .iter()
            .filter(|r| !r.filtered)
            .map(|r| r.score)
            .fold(0, i32::max);
        let thresh = max_score - config.score_diff as i32;
        let mut kept: Vec<&Alignment> = merged
            .iter()
            .filter(|r| !r.filtered && r.score >= thresh)
            .collect();

        let n = kept.len() as u32;
        if n > 0 && n <= config.max_repeat {
            kept.sort_by(|a, b| b.score.cmp(&a.score));
            for (i, r) in kept.into_iter().enumerate() {
                let mut out = r.clone();
                out.set_int_tag(Tag::ALIGNMENT_HIT_COUNT, n as i32);
                out.set_int_tag(Tag::HIT_INDEX, i as i32 + 1);
                out.set_secondary(i > 0);
                self.output.push(out);
            }
            match (n, read_num) {
                (1, 1) => self.counts.r1_single += 1,
                (1, _) => self.counts.r2_single += 1,
                (_, 1) => self.counts.r1_repeat += 1,
                _ => self.counts.r2_repeat += 1,
            }
        } else {
            self.push_unmapped(merged, read_num, true);
            if read_num == 1 {
                self.counts.r1_xrepeat += 1;
            } else {
                self.counts.r2_xrepeat += 1;
            }
        }
    }

    fn push_unmapped(&mut self, merged: &[Alignment], read_num: u8, repeat: bool) {
        let Some(first) = merged.first() else {
            return;
        };
        let mut r = first.clone();
        r.make_unmapped(read_num);
        if repeat {
            r.set_int_tag(tags::zr(), 1);
        }
        self.output.push(r);
    }

    /// Hand over the collected records, leaving `pool` (cleared) in place.
    pub fn swap_output(&mut self, pool: &mut Vec<Alignment>) {
        pool.clear();
        std::mem::swap(&mut self.output, pool);
    }
}
