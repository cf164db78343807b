//! Alignment record model shared by every stage of the merge.
//!
//! Records are read once from BAM into [`Alignment`], moved through
//! resolution, trimming and scoring, and converted back into a noodles
//! `RecordBuf` only when they are emitted.

use crate::seed::{self, Seed};
use crate::types::{Pos, RefId, Strand};
use anyhow::{Result, anyhow, bail};
use noodles::core::Position;
use noodles::sam;
use sam::alignment::RecordBuf;
use sam::alignment::record::Flags;
use sam::alignment::record::MappingQuality;
use sam::alignment::record::cigar::{Op as SamCigarOp, op::Kind as CigarKind};
use sam::alignment::record::data::field::Tag;
use sam::alignment::record_buf::{
    Cigar as SamCigar, Data as SamData, QualityScores, Sequence, data::field::Value,
};
use std::fmt;
use std::str::FromStr;

/// Custom tags written by the merge.
pub mod tags {
    use noodles::sam::alignment::record::data::field::Tag;

    /// Inferred transcript strand.
    pub fn xs() -> Tag {
        Tag::new(b'X', b'S')
    }

    /// Combined pair alignment score.
    pub fn zs() -> Tag {
        Tag::new(b'Z', b'S')
    }

    /// Originating fragment id.
    pub fn zj() -> Tag {
        Tag::new(b'Z', b'J')
    }

    /// Repeat-overflow marker on unmapped placeholders.
    pub fn zr() -> Tag {
        Tag::new(b'Z', b'R')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CigarOp {
    #[default]
    Match,
    Ins,
    Del,
    RefSkip,
    SoftClip,
    HardClip,
    Pad,
    Equal,
    Diff,
}

impl CigarOp {
    pub fn is_match(self) -> bool {
        matches!(self, CigarOp::Match | CigarOp::Equal | CigarOp::Diff)
    }

    pub fn is_indel(self) -> bool {
        matches!(self, CigarOp::Ins | CigarOp::Del)
    }

    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarOp::Match | CigarOp::Ins | CigarOp::SoftClip | CigarOp::Equal | CigarOp::Diff
        )
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOp::Match | CigarOp::Del | CigarOp::RefSkip | CigarOp::Equal | CigarOp::Diff
        )
    }

    /// Reference-consuming ops other than intron skips: the ops that walk
    /// through the exonic sequence of a fragment.
    pub fn has_bases(self) -> bool {
        self.consumes_reference() && self != CigarOp::RefSkip
    }

    pub fn to_char(self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Ins => 'I',
            CigarOp::Del => 'D',
            CigarOp::RefSkip => 'N',
            CigarOp::SoftClip => 'S',
            CigarOp::HardClip => 'H',
            CigarOp::Pad => 'P',
            CigarOp::Equal => '=',
            CigarOp::Diff => 'X',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        let op = match c {
            'M' => CigarOp::Match,
            'I' => CigarOp::Ins,
            'D' => CigarOp::Del,
            'N' => CigarOp::RefSkip,
            'S' => CigarOp::SoftClip,
            'H' => CigarOp::HardClip,
            'P' => CigarOp::Pad,
            '=' => CigarOp::Equal,
            'X' => CigarOp::Diff,
            _ => return None,
        };
        Some(op)
    }

    fn from_kind(kind: CigarKind) -> Self {
        match kind {
            CigarKind::Match => CigarOp::Match,
            CigarKind::Insertion => CigarOp::Ins,
            CigarKind::Deletion => CigarOp::Del,
            CigarKind::Skip => CigarOp::RefSkip,
            CigarKind::SoftClip => CigarOp::SoftClip,
            CigarKind::HardClip => CigarOp::HardClip,
            CigarKind::Pad => CigarOp::Pad,
            CigarKind::SequenceMatch => CigarOp::Equal,
            CigarKind::SequenceMismatch => CigarOp::Diff,
        }
    }

    fn kind(self) -> CigarKind {
        match self {
            CigarOp::Match => CigarKind::Match,
            CigarOp::Ins => CigarKind::Insertion,
            CigarOp::Del => CigarKind::Deletion,
            CigarOp::RefSkip => CigarKind::Skip,
            CigarOp::SoftClip => CigarKind::SoftClip,
            CigarOp::HardClip => CigarKind::HardClip,
            CigarOp::Pad => CigarKind::Pad,
            CigarOp::Equal => CigarKind::SequenceMatch,
            CigarOp::Diff => CigarKind::SequenceMismatch,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cigar {
    pub ops: Vec<(u32, CigarOp)>,
}

impl Cigar {
    pub fn add_operation(&mut self, len: u32, op: CigarOp) {
        if len == 0 {
            return;
        }
        if let Some((prev_len, prev_op)) = self.ops.last_mut()
            && *prev_op == op
        {
            *prev_len += len;
            return;
        }
        self.ops.push((len, op));
    }

    pub fn prepend_operation(&mut self, len: u32, op: CigarOp) {
        if len == 0 {
            return;
        }
        if let Some((prev_len, prev_op)) = self.ops.first_mut()
            && *prev_op == op
        {
            *prev_len += len;
            return;
        }
        self.ops.insert(0, (len, op));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn reference_len(&self) -> u32 {
        self.ops
            .iter()
            .filter(|(_, op)| op.consumes_reference())
            .map(|(len, _)| *len)
            .sum()
    }

    pub fn query_len(&self) -> u32 {
        self.ops
            .iter()
            .filter(|(_, op)| op.consumes_query())
            .map(|(len, _)| *len)
            .sum()
    }

    pub fn has_skip(&self) -> bool {
        self.ops.iter().any(|(_, op)| *op == CigarOp::RefSkip)
    }

    pub fn front_clip(&self) -> u32 {
        match self.ops.first() {
            Some(&(len, CigarOp::SoftClip)) => len,
            _ => 0,
        }
    }

    pub fn back_clip(&self) -> u32 {
        match self.ops.last() {
            Some(&(len, CigarOp::SoftClip)) => len,
            _ => 0,
        }
    }

    /// Aligned bases before the first intron.
    pub fn first_aligned(&self) -> u32 {
        self.ops
            .iter()
            .take_while(|(_, op)| *op != CigarOp::RefSkip)
            .filter(|(_, op)| op.is_match())
            .map(|(len, _)| *len)
            .sum()
    }

    /// Aligned bases after the last intron.
    pub fn last_aligned(&self) -> u32 {
        self.ops
            .iter()
            .rev()
            .take_while(|(_, op)| *op != CigarOp::RefSkip)
            .filter(|(_, op)| op.is_match())
            .map(|(len, _)| *len)
            .sum()
    }

    /// Reference bases (matches and deletions) before the first intron.
    pub fn exonic_head(&self) -> u32 {
        self.ops
            .iter()
            .take_while(|(_, op)| *op != CigarOp::RefSkip)
            .filter(|(_, op)| op.has_bases())
            .map(|(len, _)| *len)
            .sum()
    }

    /// Reference bases (matches and deletions) after the last intron.
    pub fn exonic_tail(&self) -> u32 {
        self.ops
            .iter()
            .rev()
            .take_while(|(_, op)| *op != CigarOp::RefSkip)
            .filter(|(_, op)| op.has_bases())
            .map(|(len, _)| *len)
            .sum()
    }

    pub fn from_sam(ops: &[SamCigarOp]) -> Self {
        let mut cigar = Cigar::default();
        for op in ops {
            cigar.ops.push((op.len() as u32, CigarOp::from_kind(op.kind())));
        }
        cigar
    }

    pub fn to_sam(&self) -> SamCigar {
        self.ops
            .iter()
            .filter(|(len, _)| *len > 0)
            .map(|(len, op)| SamCigarOp::new(op.kind(), *len as usize))
            .collect()
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "*");
        }
        for (len, op) in &self.ops {
            write!(f, "{}{}", len, op.to_char())?;
        }
        Ok(())
    }
}

impl FromStr for Cigar {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut cigar = Cigar::default();
        if s == "*" {
            return Ok(cigar);
        }
        let mut len: u32 = 0;
        let mut has_len = false;
        for c in s.chars() {
            if let Some(d) = c.to_digit(10) {
                len = len
                    .checked_mul(10)
                    .and_then(|l| l.checked_add(d))
                    .ok_or_else(|| anyhow!("CIGAR length overflow in {s}"))?;
                has_len = true;
            } else {
                let op = CigarOp::from_char(c)
                    .ok_or_else(|| anyhow!("invalid CIGAR op '{c}' in {s}"))?;
                if !has_len {
                    bail!("CIGAR op '{c}' without a length in {s}");
                }
                cigar.ops.push((len, op));
                len = 0;
                has_len = false;
            }
        }
        if has_len {
            bail!("trailing length without an op in {s}");
        }
        Ok(cigar)
    }
}

/// One alignment of one mate, in genome or fragment coordinates.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub name: Vec<u8>,
    pub flags: Flags,
    pub tid: Option<RefId>,
    /// 0-based leftmost reference position.
    pub lft: Pos,
    pub mapq: Option<MappingQuality>,
    pub cigar: Cigar,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub mate_tid: Option<RefId>,
    pub mate_lft: Option<Pos>,
    pub tlen: i32,
    pub data: SamData,
    pub score: i32,
    pub filtered: bool,
}

impl Default for Alignment {
    fn default() -> Self {
        Self {
            name: Vec::new(),
            flags: Flags::empty(),
            tid: None,
            lft: 0,
            mapq: None,
            cigar: Cigar::default(),
            seq: Vec::new(),
            qual: Vec::new(),
            mate_tid: None,
            mate_lft: None,
            tlen: 0,
            data: SamData::default(),
            score: 0,
            filtered: false,
        }
    }
}

impl Alignment {
    pub fn is_aligned(&self) -> bool {
        !self.flags.is_unmapped() && self.tid.is_some() && !self.cigar.is_empty()
    }

    /// Rightmost reference position (inclusive).
    pub fn rgt(&self) -> Pos {
        let len = self.cigar.reference_len();
        if len == 0 { self.lft } else { self.lft + len - 1 }
    }

    pub fn read_len(&self) -> u32 {
        if self.seq.is_empty() {
            self.cigar.query_len()
        } else {
            self.seq.len() as u32
        }
    }

    pub fn qlft(&self) -> u32 {
        self.cigar.front_clip()
    }

    pub fn qrgt(&self) -> u32 {
        self.read_len()
            .saturating_sub(self.cigar.back_clip())
            .saturating_sub(1)
    }

    pub fn seed(&self) -> Seed {
        Seed::new(self.qlft(), self.qrgt(), self.lft, self.rgt())
    }

    /// Exonic blocks of the alignment, split at introns.
    pub fn blocks(&self) -> Vec<Seed> {
        seed::blocks(&self.cigar, self.lft)
    }

    /// Strand the read itself aligned to.
    pub fn strand(&self) -> Strand {
        if self.flags.is_reverse_complemented() {
            Strand::Minus
        } else {
            Strand::Plus
        }
    }

    /// Transcript strand carried in the XS tag, `Both` when absent.
    pub fn xs_strand(&self) -> Strand {
        match self.data.get(&tags::xs()) {
            Some(Value::Character(c)) => Strand::from_char(*c),
            Some(Value::String(s)) => s.first().map_or(Strand::Both, |c| Strand::from_char(*c)),
            _ => Strand::Both,
        }
    }

    /// Read bases between the soft clips.
    pub fn aligned_bases(&self) -> u32 {
        self.read_len()
            .saturating_sub(self.cigar.front_clip())
            .saturating_sub(self.cigar.back_clip())
    }

    pub fn int_tag(&self, tag: Tag) -> Option<i64> {
        self.data.get(&tag).and_then(|v| v.as_int())
    }

    pub fn set_int_tag(&mut self, tag: Tag, value: i32) {
        self.data.insert(tag, Value::from(value));
    }

    pub fn set_char_tag(&mut self, tag: Tag, value: u8) {
        self.data.insert(tag, Value::Character(value));
    }

    pub fn set_float_tag(&mut self, tag: Tag, value: f32) {
        self.data.insert(tag, Value::Float(value));
    }

    pub fn clear_tags(&mut self) {
        self.data = SamData::default();
    }

    pub fn clear_mate(&mut self) {
        self.mate_tid = None;
        self.mate_lft = None;
        self.tlen = 0;
    }

    /// Set the first/last segment flags from a mate number (1 or 2).
    pub fn set_read_number(&mut self, read_num: u8) {
        self.flags.set(Flags::FIRST_SEGMENT, read_num == 1);
        self.flags.set(Flags::LAST_SEGMENT, read_num == 2);
    }

    pub fn set_secondary(&mut self, secondary: bool) {
        self.flags.set(Flags::SECONDARY, secondary);
    }

    /// Turn terminal hard clips into soft clips.
    pub fn convert_hard_clips(&mut self) {
        if let Some((_, op)) = self.cigar.ops.first_mut()
            && *op == CigarOp::HardClip
        {
            *op = CigarOp::SoftClip;
        }
        if let Some((_, op)) = self.cigar.ops.last_mut()
            && *op == CigarOp::HardClip
        {
            *op = CigarOp::SoftClip;
        }
    }

    /// Soft clip `n` aligned bases from the left end, skipping over any
    /// deletions or introns crossed on the way.
    pub fn clip_front(&mut self, mut n: u32) {
        let old = std::mem::take(&mut self.cigar.ops);
        let mut ops: Vec<(u32, CigarOp)> = Vec::with_capacity(old.len() + 1);
        let mut sc = 0u32;
        let mut lft = self.lft;

        for (i, (len, op)) in old.into_iter().enumerate() {
            if i == 0 && op == CigarOp::SoftClip {
                sc += len;
            } else if op.is_match() {
                if n == 0 {
                    ops.push((len, op));
                } else if len > n {
                    sc += n;
                    lft += n;
                    ops.push((len - n, op));
                    n = 0;
                } else {
                    n -= len;
                    sc += len;
                    lft += len;
                }
            } else if matches!(op, CigarOp::Del | CigarOp::RefSkip) && n > 0 {
                lft += len;
            } else if op == CigarOp::Ins && n > 0 {
                sc += len;
            } else {
                ops.push((len, op));
            }
        }

        let mut start = 0;
        for &(len, op) in &ops {
            match op {
                CigarOp::Ins => sc += len,
                CigarOp::Del | CigarOp::RefSkip => lft += len,
                _ => break,
            }
            start += 1;
        }
        ops.drain(..start);

        self.lft = lft;
        self.cigar.ops = ops;
        self.cigar.prepend_operation(sc, CigarOp::SoftClip);
    }

    /// Soft clip `n` aligned bases from the right end.
    pub fn clip_back(&mut self, mut n: u32) {
        let ops = &mut self.cigar.ops;
        let mut sc = 0u32;
        if let Some(&(len, CigarOp::SoftClip)) = ops.last() {
            sc = len;
            ops.pop();
        }

        while n > 0 {
            let Some(&(len, op)) = ops.last() else {
                break;
            };
            if op.is_match() {
                if len > n {
                    sc += n;
                    if let Some(last) = ops.last_mut() {
                        last.0 -= n;
                    }
                    n = 0;
                } else {
                    n -= len;
                    sc += len;
                    ops.pop();
                }
            } else {
                if op == CigarOp::Ins {
                    sc += len;
                }
                ops.pop();
            }
        }

        while let Some(&(len, op)) = ops.last() {
            match op {
                CigarOp::Ins => sc += len,
                CigarOp::Del | CigarOp::RefSkip => {}
                _ => break,
            }
            ops.pop();
        }

        self.cigar.add_operation(sc, CigarOp::SoftClip);
    }

    /// Reset the record into an unmapped placeholder for mate `read_num`.
    pub fn make_unmapped(&mut self, read_num: u8) {
        if self.is_aligned() && self.strand() == Strand::Minus {
            reverse_complement(&mut self.seq);
            self.qual.reverse();
        }
        self.flags = Flags::UNMAPPED | Flags::SEGMENTED;
        self.set_read_number(read_num);
        self.clear_tags();
        self.cigar = Cigar::default();
        self.set_int_tag(Tag::ALIGNMENT_HIT_COUNT, 0);
        self.clear_mate();
        self.tid = None;
        self.lft = 0;
        self.mapq = None;
        self.score = 0;
    }

    pub fn from_record_buf(record: &RecordBuf) -> Self {
        Self {
            name: record.name().map(|n| n.to_vec()).unwrap_or_default(),
            flags: record.flags(),
            tid: record.reference_sequence_id(),
            lft: record
                .alignment_start()
                .map(|p| (p.get() - 1) as Pos)
                .unwrap_or(0),
            mapq: record.mapping_quality(),
            cigar: Cigar::from_sam(record.cigar().as_ref()),
            seq: record.sequence().as_ref().to_vec(),
            qual: record.quality_scores().as_ref().to_vec(),
            mate_tid: record.mate_reference_sequence_id(),
            mate_lft: record.mate_alignment_start().map(|p| (p.get() - 1) as Pos),
            tlen: record.template_length(),
            data: record.data().clone(),
            score: 0,
            filtered: false,
        }
    }

    pub fn to_record_buf(&self) -> Result<RecordBuf> {
        let mut out = RecordBuf::default();
        if !self.name.is_empty() {
            *out.name_mut() = Some(self.name.clone().into());
        }
        *out.flags_mut() = self.flags;
        *out.reference_sequence_id_mut() = self.tid;
        if self.tid.is_some() {
            let pos1 = self.lft as usize + 1;
            let start = Position::try_from(pos1)
                .map_err(|_| anyhow!("alignment start out of range: {pos1}"))?;
            *out.alignment_start_mut() = Some(start);
        }
        *out.mapping_quality_mut() = self.mapq;
        *out.cigar_mut() = self.cigar.to_sam();
        *out.mate_reference_sequence_id_mut() = self.mate_tid;
        if let Some(mate_lft) = self.mate_lft {
            let pos1 = mate_lft as usize + 1;
            let start = Position::try_from(pos1)
                .map_err(|_| anyhow!("mate alignment start out of range: {pos1}"))?;
            *out.mate_alignment_start_mut() = Some(start);
        }
        *out.template_length_mut() = self.tlen;
        *out.sequence_mut() = Sequence::from(self.seq.clone());
        if self.qual.len() == self.seq.len() {
            *out.quality_scores_mut() = QualityScores::from(self.qual.clone());
        }
        *out.data_mut() = self.data.clone();
        Ok(out)
    }
}

/// Share one complete sequence/quality record across a group of alignments
/// of the same read (secondaries may omit them) and turn terminal hard
/// clips into soft clips.
pub fn fix_seq_quals(group: &mut [Alignment]) {
    let Some(src) = group.iter().position(|r| {
        !r.flags.is_secondary()
            && !r.seq.is_empty()
            && (r.qual.is_empty() || r.qual.len() == r.seq.len())
    }) else {
        return;
    };
    let seq = group[src].seq.clone();
    let qual = group[src].qual.clone();
    let strand = group[src].strand();

    for (i, r) in group.iter_mut().enumerate() {
        r.convert_hard_clips();
        if i != src {
            r.seq = seq.clone();
            r.qual = qual.clone();
            if r.strand() != strand {
                reverse_complement(&mut r.seq);
                r.qual.reverse();
            }
        }
    }
}

pub fn reverse_complement(seq: &mut [u8]) {
    seq.reverse();
    for base in seq.iter_mut() {
        *base = match *base {
            b'A' | b'a' => b'T',
            b'T' | b't' => b'A',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            _ => b'N',
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cigar(s: &str) -> Cigar {
        s.parse().unwrap()
    }

    fn aln(lft: Pos, c: &str, len: usize) -> Alignment {
        Alignment {
            tid: Some(0),
            lft,
            cigar: cigar(c),
            seq: vec![b'A'; len],
            qual: vec![30; len],
            ..Default::default()
        }
    }

    #[test]
    fn cigar_parse_and_display() {
        let c = cigar("5S20M100N30M2I10M");
        assert_eq!(c.to_string(), "5S20M100N30M2I10M");
        assert_eq!(c.reference_len(), 160);
        assert_eq!(c.query_len(), 67);
        assert!(c.has_skip());
        assert_eq!(c.first_aligned(), 20);
        assert_eq!(c.last_aligned(), 40);
        assert!("10Q".parse::<Cigar>().is_err());
        assert!("M".parse::<Cigar>().is_err());
    }

    #[test]
    fn add_operation_merges_runs() {
        let mut c = Cigar::default();
        c.add_operation(5, CigarOp::Match);
        c.add_operation(5, CigarOp::Match);
        c.add_operation(0, CigarOp::Del);
        c.prepend_operation(3, CigarOp::SoftClip);
        c.prepend_operation(2, CigarOp::SoftClip);
        assert_eq!(c.to_string(), "5S10M");
    }

    #[test]
    fn exonic_head_and_tail_count_deletions() {
        let c = cigar("10M2D5M100N8M1D2M");
        assert_eq!(c.exonic_head(), 17);
        assert_eq!(c.exonic_tail(), 11);
    }

    #[test]
    fn rgt_and_query_bounds() {
        let a = aln(100, "5S40M200N45M10S", 100);
        assert_eq!(a.rgt(), 100 + 285 - 1);
        assert_eq!(a.qlft(), 5);
        assert_eq!(a.qrgt(), 89);
        assert_eq!(a.aligned_bases(), 85);
    }

    #[test]
    fn clip_front_crosses_intron() {
        let mut a = aln(100, "4M500N96M", 100);
        a.clip_front(4);
        assert_eq!(a.cigar.to_string(), "4S96M");
        assert_eq!(a.lft, 604);
    }

    #[test]
    fn clip_front_partial_match() {
        let mut a = aln(100, "2S50M", 52);
        a.clip_front(3);
        assert_eq!(a.cigar.to_string(), "5S47M");
        assert_eq!(a.lft, 103);
    }

    #[test]
    fn clip_back_crosses_intron() {
        let mut a = aln(100, "96M500N4M", 100);
        a.clip_back(4);
        assert_eq!(a.cigar.to_string(), "96M4S");
        assert_eq!(a.rgt(), 195);
    }

    #[test]
    fn clip_back_absorbs_insertion() {
        let mut a = aln(0, "40M2I3M", 45);
        a.clip_back(3);
        assert_eq!(a.cigar.to_string(), "40M5S");
    }

    #[test]
    fn make_unmapped_restores_read_orientation() {
        let mut a = aln(10, "4M", 4);
        a.seq = b"AACG".to_vec();
        a.qual = vec![1, 2, 3, 4];
        a.flags = Flags::REVERSE_COMPLEMENTED;
        a.set_int_tag(Tag::ALIGNMENT_SCORE, 12);
        a.make_unmapped(2);
        assert_eq!(a.seq, b"CGTT".to_vec());
        assert_eq!(a.qual, vec![4, 3, 2, 1]);
        assert!(a.flags.is_unmapped());
        assert!(a.flags.is_last_segment());
        assert!(!a.flags.is_first_segment());
        assert_eq!(a.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(0));
        assert_eq!(a.int_tag(Tag::ALIGNMENT_SCORE), None);
        assert!(a.tid.is_none());
        assert!(a.cigar.is_empty());
    }

    #[test]
    fn fix_seq_quals_copies_from_primary() {
        let mut primary = aln(0, "4M", 4);
        primary.seq = b"ACGG".to_vec();
        primary.qual = vec![10, 20, 30, 40];
        let mut secondary = aln(0, "1H3M", 0);
        secondary.seq.clear();
        secondary.qual.clear();
        secondary.flags = Flags::SECONDARY | Flags::REVERSE_COMPLEMENTED;
        let mut group = vec![secondary, primary];
        fix_seq_quals(&mut group);
        assert_eq!(group[0].seq, b"CCGT".to_vec());
        assert_eq!(group[0].qual, vec![40, 30, 20, 10]);
        assert_eq!(group[0].cigar.to_string(), "1S3M");
    }

    #[test]
    fn xs_strand_from_tag() {
        let mut a = aln(0, "4M", 4);
        assert_eq!(a.xs_strand(), Strand::Both);
        a.set_char_tag(tags::xs(), b'-');
        assert_eq!(a.xs_strand(), Strand::Minus);
    }

    #[test]
    fn record_buf_round_trip_keeps_coordinates() {
        let mut a = aln(99, "10M50N10M", 20);
        a.name = b"read1".to_vec();
        a.set_int_tag(Tag::ALIGNMENT_HIT_COUNT, 1);
        let buf = a.to_record_buf().unwrap();
        assert_eq!(buf.alignment_start().map(|p| p.get()), Some(100));
        let back = Alignment::from_record_buf(&buf);
        assert_eq!(back.lft, 99);
        assert_eq!(back.cigar, a.cigar);
        assert_eq!(back.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(1));
    }
}
