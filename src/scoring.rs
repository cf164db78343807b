//! Splice-aware alignment scoring.

use crate::genome::ReferenceSource;
use crate::record::{Alignment, CigarOp};
use anyhow::{Result, bail};
use noodles::sam::alignment::record::data::field::Tag;

/// Scoring weights and filtering thresholds.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_ext: i32,
    /// Comma separated plus-strand motifs (donor dinucleotide followed by
    /// acceptor dinucleotide) scored as canonical.
    pub canonical_motifs: String,
    pub score_gtag: i32,
    pub score_canonical: i32,
    pub score_non_canonical: i32,
    pub big_intron_size: u32,
    pub big_intron_penalty: i32,
    /// Minimum score per aligned base.
    pub min_score: f64,
    /// Reject at this many edits; 0 disables the rule.
    pub max_edit_dist: u32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            match_score: 3,
            mismatch: -3,
            gap_open: -8,
            gap_ext: -1,
            canonical_motifs: "GTAG,GCAG,GCTG,GCAA,GCGG,GTTG,GTAA,ATAC,ATAA,ATAG".to_string(),
            score_gtag: -3,
            score_canonical: -6,
            score_non_canonical: -9,
            big_intron_size: 64_000,
            big_intron_penalty: -12,
            min_score: 2.0,
            max_edit_dist: 15,
        }
    }
}

/// 4-bit nucleotide code: one bit per base, ambiguity codes are unions.
pub fn nt16(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'=' => 0,
        b'A' => 1,
        b'C' => 2,
        b'M' => 3,
        b'G' => 4,
        b'R' => 5,
        b'S' => 6,
        b'V' => 7,
        b'T' | b'U' => 8,
        b'W' => 9,
        b'Y' => 10,
        b'H' => 11,
        b'K' => 12,
        b'D' => 13,
        b'B' => 14,
        _ => 15,
    }
}

/// 2-bit code of an unambiguous base.
pub fn nt4(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

fn is_ambiguous(code: usize) -> bool {
    !matches!(code, 1 | 2 | 4 | 8)
}

fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

/// Substitution table over nt16 codes plus affine gap weights.
#[derive(Debug, Clone)]
pub struct AlignScores {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_ext: i32,
    table: [[i32; 16]; 16],
}

impl AlignScores {
    pub fn new(match_score: i32, mismatch: i32, gap_open: i32, gap_ext: i32) -> Self {
        let mut table = [[mismatch; 16]; 16];
        for (i, row) in table.iter_mut().enumerate() {
            if !is_ambiguous(i) {
                row[i] = match_score;
            }
        }
        Self {
            match_score,
            mismatch,
            gap_open,
            gap_ext,
            table,
        }
    }

    pub fn score(&self, query: u8, reference: u8) -> i32 {
        self.table[nt16(query) as usize][nt16(reference) as usize]
    }

    pub fn gap(&self, len: u32) -> i32 {
        self.gap_open + self.gap_ext * len as i32
    }
}

/// Penalties for intron flanking motifs and very long introns.
#[derive(Debug, Clone)]
pub struct SpliceScore {
    scores: [i32; 256],
    non_canonical: i32,
    big_intron_size: u32,
    big_intron_penalty: i32,
}

impl SpliceScore {
    pub fn new(motifs: &str, gtag: i32, canonical: i32, non_canonical: i32) -> Result<Self> {
        let mut scores = [non_canonical; 256];
        let mut defined = [false; 256];

        let mut define = |motif: &[u8], penalty: i32| -> Result<()> {
            let plus = motif_code(motif[0], motif[1], motif[2], motif[3]);
            let minus = motif_code(
                complement(motif[3]),
                complement(motif[2]),
                complement(motif[1]),
                complement(motif[0]),
            );
            let (Some(plus), Some(minus)) = (plus, minus) else {
                bail!(
                    "splice motif {} contains an ambiguous base",
                    String::from_utf8_lossy(motif)
                );
            };
            if defined[plus as usize] || defined[minus as usize] {
                bail!("ambiguous splice motif {}", String::from_utf8_lossy(motif));
            }
            for code in [plus, minus] {
                defined[code as usize] = true;
                scores[code as usize] = penalty;
            }
            Ok(())
        };

        for motif in motifs.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            let motif = motif.to_ascii_uppercase();
            if motif.len() != 4 {
                bail!("splice motif {motif} must be four bases");
            }
            if motif == "GTAG" || motif == "CTAC" {
                continue;
            }
            define(motif.as_bytes(), canonical)?;
        }
        define(b"GTAG", gtag)?;

        Ok(Self {
            scores,
            non_canonical,
            big_intron_size: u32::MAX,
            big_intron_penalty: 0,
        })
    }

    pub fn with_intron_penalty(mut self, size: u32, penalty: i32) -> Self {
        self.big_intron_size = size;
        self.big_intron_penalty = penalty;
        self
    }

    /// Motif penalty for an intron flanked by `b1 b2 ... b3 b4`.
    pub fn score(&self, b1: u8, b2: u8, b3: u8, b4: u8) -> i32 {
        match motif_code(b1, b2, b3, b4) {
            Some(code) => self.scores[code as usize],
            None => self.non_canonical,
        }
    }

    pub fn intron_penalty(&self, len: u32) -> i32 {
        if len >= self.big_intron_size {
            let scaled = ((len as f64).log2() + self.big_intron_penalty as f64) as i32;
            -scaled.min(0)
        } else {
            0
        }
    }
}

fn motif_code(b1: u8, b2: u8, b3: u8, b4: u8) -> Option<u8> {
    Some((nt4(b1)? << 6) | (nt4(b2)? << 4) | (nt4(b3)? << 2) | nt4(b4)?)
}

/// Scores alignments against the genome and applies the score floor.
pub struct ScoreFilter<'g> {
    scores: AlignScores,
    splices: SpliceScore,
    genome: &'g dyn ReferenceSource,
    min_score: f64,
    max_edit_dist: u32,
}

impl<'g> ScoreFilter<'g> {
    pub fn new(config: &ScoreConfig, genome: &'g dyn ReferenceSource) -> Result<Self> {
        let splices = SpliceScore::new(
            &config.canonical_motifs,
            config.score_gtag,
            config.score_canonical,
            config.score_non_canonical,
        )?
        .with_intron_penalty(config.big_intron_size, config.big_intron_penalty);
        Ok(Self {
            scores: AlignScores::new(
                config.match_score,
                config.mismatch,
                config.gap_open,
                config.gap_ext,
            ),
            splices,
            genome,
            min_score: config.min_score,
            max_edit_dist: config.max_edit_dist,
        })
    }

    /// Score `r` against the genome, store the score plus AS/NM tags and
    /// return the edit distance.
    pub fn score_alignment(&self, r: &mut Alignment) -> u32 {
        let Some(tid) = r.tid else {
            return 0;
        };
        let reference = self.genome.sequence(tid).unwrap_or(&[]);
        let ref_base = |p: usize| reference.get(p).copied().unwrap_or(b'N');
        let query_base = |z: usize| r.seq.get(z).copied().unwrap_or(b'N');

        let mut p = r.lft as usize;
        let mut z = 0usize;
        let mut score = 0i32;
        let mut edist = 0u32;

        for &(len, op) in &r.cigar.ops {
            let n = len as usize;
            match op {
                _ if op.is_match() => {
                    for _ in 0..n {
                        let s = self.scores.score(query_base(z), ref_base(p));
                        score += s;
                        if s == self.scores.mismatch {
                            edist += 1;
                        }
                        p += 1;
                        z += 1;
                    }
                }
                CigarOp::Del => {
                    score += self.scores.gap(len);
                    edist += len;
                    p += n;
                }
                CigarOp::Ins => {
                    score += self.scores.gap(len);
                    edist += len;
                    z += n;
                }
                CigarOp::RefSkip => {
                    score += self.splices.score(
                        ref_base(p),
                        ref_base(p + 1),
                        ref_base((p + n).saturating_sub(2)),
                        ref_base((p + n).saturating_sub(1)),
                    );
                    score += self.splices.intron_penalty(len);
                    p += n;
                }
                CigarOp::SoftClip => z += n,
                _ => {}
            }
        }

        r.score = score;
        r.set_int_tag(Tag::EDIT_DISTANCE, edist as i32);
        r.set_int_tag(Tag::ALIGNMENT_SCORE, score);
        edist
    }

    /// Score `r` and report whether it falls below the score floor or
    /// carries too many edits.
    pub fn filter_read(&self, r: &mut Alignment) -> bool {
        let edist = self.score_alignment(r);
        let cutoff = (r.aligned_bases() as f64 * self.min_score) as i32;
        r.score < cutoff || (self.max_edit_dist > 0 && edist >= self.max_edit_dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GenomeDb;
    use crate::record::Cigar;

    fn aln(lft: u32, cigar: &str, seq: &[u8]) -> Alignment {
        Alignment {
            tid: Some(0),
            lft,
            cigar: cigar.parse::<Cigar>().unwrap(),
            seq: seq.to_vec(),
            qual: vec![30; seq.len()],
            ..Default::default()
        }
    }

    #[test]
    fn substitution_table() {
        let s = AlignScores::new(3, -3, -8, -1);
        assert_eq!(s.score(b'A', b'A'), 3);
        assert_eq!(s.score(b'a', b'A'), 3);
        assert_eq!(s.score(b'A', b'C'), -3);
        assert_eq!(s.score(b'N', b'N'), -3);
        assert_eq!(s.score(b'R', b'R'), -3);
        assert_eq!(s.gap(2), -10);
    }

    #[test]
    fn motif_tiers() {
        let c = ScoreConfig::default();
        let s = SpliceScore::new(
            &c.canonical_motifs,
            c.score_gtag,
            c.score_canonical,
            c.score_non_canonical,
        )
        .unwrap();
        assert_eq!(s.score(b'G', b'T', b'A', b'G'), -3);
        assert_eq!(s.score(b'C', b'T', b'A', b'C'), -3);
        assert_eq!(s.score(b'G', b'C', b'A', b'G'), -6);
        // reverse complement of GCAG
        assert_eq!(s.score(b'C', b'T', b'G', b'C'), -6);
        assert_eq!(s.score(b'A', b'A', b'A', b'A'), -9);
        assert_eq!(s.score(b'G', b'N', b'A', b'G'), -9);
    }

    #[test]
    fn duplicate_motif_is_an_error() {
        assert!(SpliceScore::new("GCAG,CTGC", -3, -6, -9).is_err());
        assert!(SpliceScore::new("GCA", -3, -6, -9).is_err());
    }

    #[test]
    fn intron_penalty_threshold() {
        let s = SpliceScore::new("", -3, -6, -9)
            .unwrap()
            .with_intron_penalty(64_000, -20);
        assert_eq!(s.intron_penalty(1000), 0);
        // log2(65536) - 20 = -4
        assert_eq!(s.intron_penalty(65_536), 4);
        let s = s.with_intron_penalty(64_000, -12);
        assert_eq!(s.intron_penalty(65_536), 0);
    }

    #[test]
    fn score_spliced_alignment() {
        // exon1: 8 bases, intron GT....AG of 10 bases, exon2: 8 bases
        let genome = GenomeDb::from_sequences(vec![b"ACGTACGTGTCCCCCCAGTTGGCCAA".to_vec()]);
        let filter = ScoreFilter::new(&ScoreConfig::default(), &genome).unwrap();
        let mut r = aln(0, "8M10N8M", b"ACGTACGTTTGGCCAA");
        let edist = filter.score_alignment(&mut r);
        assert_eq!(edist, 0);
        assert_eq!(r.score, 16 * 3 - 3);
        assert_eq!(r.int_tag(Tag::ALIGNMENT_SCORE), Some(45));
        assert_eq!(r.int_tag(Tag::EDIT_DISTANCE), Some(0));
        assert!(!filter.filter_read(&mut r));
    }

    #[test]
    fn mismatches_and_gaps_count_as_edits() {
        let genome = GenomeDb::from_sequences(vec![b"AAAAAAAAAAAAAAAAAAAA".to_vec()]);
        let filter = ScoreFilter::new(&ScoreConfig::default(), &genome).unwrap();
        let mut r = aln(0, "2S4M2D4M", b"GGAAACAAAA");
        let edist = filter.score_alignment(&mut r);
        assert_eq!(edist, 3);
        assert_eq!(r.score, 7 * 3 - 3 - 10);
        // 8 aligned bases need 16 points
        assert!(filter.filter_read(&mut r));
    }
}
