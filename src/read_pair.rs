//! Mate pair hypotheses and their geometric checks.

use crate::record::{Alignment, tags};
use crate::seed::Seed;
use crate::types::Strand;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;

/// Library strandedness, used to check the relative order of the mates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stranded {
    #[default]
    Unstranded,
    FirstStrand,
    SecondStrand,
}

impl Stranded {
    /// `s1` and `s2` are the seeds of mate 1 and mate 2, `strand` the
    /// transcript strand of the pair.
    pub fn check_orientation(self, s1: &Seed, s2: &Seed, strand: Strand) -> bool {
        match self {
            Stranded::Unstranded => true,
            Stranded::FirstStrand if strand == Strand::Plus => s2.before(s1),
            Stranded::FirstStrand => s1.before(s2),
            Stranded::SecondStrand if strand == Strand::Minus => s2.before(s1),
            Stranded::SecondStrand => s1.before(s2),
        }
    }
}

/// One placement of both mates. `r1`/`s1` is always the leftmost mate;
/// `swapped` records whether that is mate 2.
#[derive(Debug, Clone)]
pub struct ReadPair<'a> {
    pub r1: &'a Alignment,
    pub r2: &'a Alignment,
    pub s1: Seed,
    pub s2: Seed,
    pub strand: Strand,
    pub fsize: u32,
    pub isize: i32,
    /// Bases between the mates, negative when they overlap.
    pub dist: i64,
    pub score: f64,
    pub align_score: f64,
    pub discordant: bool,
    pub strand_fail: bool,
    pub tid_fail: bool,
    pub overlaps: bool,
    pub orientation_fail: bool,
    pub fragment_fail: bool,
    pub filtered: bool,
    pub swapped: bool,
}

impl<'a> ReadPair<'a> {
    /// Mate 1 regardless of genome order.
    pub fn real_r1(&self) -> &'a Alignment {
        if self.swapped { self.r2 } else { self.r1 }
    }

    /// Mate 2 regardless of genome order.
    pub fn real_r2(&self) -> &'a Alignment {
        if self.swapped { self.r1 } else { self.r2 }
    }

    pub fn tlen(&self) -> i64 {
        self.s2.rrgt as i64 - self.s1.rlft as i64 + 1
    }

    /// Summed fragment length of both reads.
    pub fn read_lens(&self) -> u32 {
        self.r1.read_len() + self.r2.read_len()
    }

    /// Output copies of both mates (leftmost first) as hit `ni` of `nh`.
    pub fn make_pair_copy(&self, ni: u32, nh: u32) -> (Alignment, Alignment) {
        let mut a = self.r1.clone();
        let mut b = self.r2.clone();
        let tlen = self.tlen() as i32;
        a.tlen = tlen;
        b.tlen = -tlen;
        a.mate_tid = b.tid;
        b.mate_tid = a.tid;
        a.mate_lft = Some(b.lft);
        b.mate_lft = Some(a.lft);

        let a_reverse = a.flags.is_reverse_complemented();
        let b_reverse = b.flags.is_reverse_complemented();
        for (r, mate_reverse) in [(&mut a, b_reverse), (&mut b, a_reverse)] {
            r.flags.insert(Flags::SEGMENTED);
            r.flags.set(Flags::PROPERLY_SEGMENTED, !self.discordant);
            r.flags.remove(Flags::MATE_UNMAPPED);
            r.flags.set(Flags::MATE_REVERSE_COMPLEMENTED, mate_reverse);
            r.set_secondary(ni != 1);
            if nh > 0 {
                r.set_int_tag(Tag::ALIGNMENT_HIT_COUNT, nh as i32);
                r.set_int_tag(Tag::HIT_INDEX, ni as i32);
            }
            r.set_float_tag(tags::zs(), self.align_score as f32);
        }
        a.set_read_number(if self.swapped { 2 } else { 1 });
        b.set_read_number(if self.swapped { 1 } else { 2 });
        (a, b)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadPairFactory {
    pub stranded: Stranded,
}

impl ReadPairFactory {
    pub fn new(stranded: Stranded) -> Self {
        Self { stranded }
    }

    pub fn build<'a>(&self, r1: &'a Alignment, r2: &'a Alignment) -> ReadPair<'a> {
        let s1 = r1.seed();
        let s2 = r2.seed();
        let tx1 = r1.xs_strand();
        let tx2 = r2.xs_strand();
        let strand = match (tx1, tx2) {
            (Strand::Both, tx) | (tx, Strand::Both) => tx,
            (a, b) if a == b => a,
            _ => Strand::Both,
        };

        let tid_fail = r1.tid != r2.tid;
        let strand_fail = r1.strand() == r2.strand();
        let orientation_fail = !self.stranded.check_orientation(&s1, &s2, strand);

        let mut pair = ReadPair {
            r1,
            r2,
            s1,
            s2,
            strand,
            fsize: 0,
            isize: 0,
            dist: 0,
            score: 0.0,
            align_score: (r1.score + r2.score) as f64,
            discordant: tid_fail || strand_fail || orientation_fail,
            strand_fail,
            tid_fail,
            overlaps: s1.roverlaps(&s2),
            orientation_fail,
            fragment_fail: false,
            filtered: false,
            swapped: false,
        };

        if pair.s2.before(&pair.s1) {
            std::mem::swap(&mut pair.s1, &mut pair.s2);
            std::mem::swap(&mut pair.r1, &mut pair.r2);
            pair.swapped = true;
        }
        pair.dist = pair.s2.rlft as i64 - pair.s1.rrgt as i64 - 1;
        pair
    }

    /// All candidate placements: aligned mates on the same reference with
    /// opposite read strands.
    pub fn build_pairs<'a>(
        &self,
        mates1: &'a [Alignment],
        mates2: &'a [Alignment],
        pairs: &mut Vec<ReadPair<'a>>,
    ) {
        pairs.clear();
        for a in mates1.iter().filter(|r| r.is_aligned()) {
            for b in mates2.iter().filter(|r| r.is_aligned()) {
                if a.tid == b.tid && a.strand() != b.strand() {
                    pairs.push(self.build(a, b));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Cigar;

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
            score: 100,
            ..Default::default()
        }
    }

    #[test]
    fn canonical_order_and_distance() {
        let f = ReadPairFactory::default();
        let m1 = aln(500, "100M", true);
        let m2 = aln(100, "100M", false);
        let p = f.build(&m1, &m2);
        assert!(p.swapped);
        assert_eq!(p.r1.lft, 100);
        assert_eq!(p.real_r1().lft, 500);
        assert_eq!(p.dist, 300);
        assert!(!p.discordant);
        assert!(!p.overlaps);
        assert_eq!(p.align_score, 200.0);
        assert_eq!(p.tlen(), 500);
    }

    #[test]
    fn same_strand_is_discordant() {
        let f = ReadPairFactory::default();
        let m1 = aln(100, "100M", false);
        let m2 = aln(500, "100M", false);
        let p = f.build(&m1, &m2);
        assert!(p.strand_fail);
        assert!(p.discordant);
    }

    #[test]
    fn pair_strand_from_xs() {
        let f = ReadPairFactory::default();
        let mut m1 = aln(100, "100M", false);
        let mut m2 = aln(500, "100M", true);
        m1.set_char_tag(tags::xs(), b'-');
        assert_eq!(f.build(&m1, &m2).strand, Strand::Minus);
        m2.set_char_tag(tags::xs(), b'+');
        assert_eq!(f.build(&m1, &m2).strand, Strand::Both);
        m2.set_char_tag(tags::xs(), b'-');
        assert_eq!(f.build(&m1, &m2).strand, Strand::Minus);
    }

    #[test]
    fn first_strand_orientation() {
        let f = ReadPairFactory::new(Stranded::FirstStrand);
        let mut m1 = aln(500, "100M", true);
        let mut m2 = aln(100, "100M", false);
        m1.set_char_tag(tags::xs(), b'+');
        m2.set_char_tag(tags::xs(), b'+');
        assert!(!f.build(&m1, &m2).orientation_fail);
        m1.set_char_tag(tags::xs(), b'-');
        m2.set_char_tag(tags::xs(), b'-');
        assert!(f.build(&m1, &m2).orientation_fail);
    }

    #[test]
    fn candidate_pairs_need_opposite_strands() {
        let f = ReadPairFactory::default();
        let mates1 = vec![aln(100, "100M", false), aln(900, "100M", true)];
        let mut other_ref = aln(300, "100M", true);
        other_ref.tid = Some(1);
        let mates2 = vec![aln(400, "100M", true), other_ref];
        let mut pairs = Vec::new();
        f.build_pairs(&mates1, &mates2, &mut pairs);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].r1.lft, 100);
    }

    #[test]
    fn pair_copy_flags() {
        let f = ReadPairFactory::default();
        let m1 = aln(500, "100M", true);
        let m2 = aln(100, "100M", false);
        let p = f.build(&m1, &m2);
        let (a, b) = p.make_pair_copy(2, 3);
        assert!(a.flags.is_last_segment());
        assert!(b.flags.is_first_segment());
        assert!(a.flags.is_secondary() && b.flags.is_secondary());
        assert!(a.flags.is_properly_segmented());
        assert!(a.flags.is_mate_reverse_complemented());
        assert!(!b.flags.is_mate_reverse_complemented());
        assert_eq!(a.tlen, 500);
        assert_eq!(b.tlen, -500);
        assert_eq!(a.mate_lft, Some(500));
        assert_eq!(a.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(3));
        assert_eq!(b.int_tag(Tag::HIT_INDEX), Some(2));
    }
}
