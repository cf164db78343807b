use crate::fragment_size::FragmentSizeConfig;
use crate::pair_builder::PairConfig;
use crate::read_pair::Stranded;
use crate::scoring::ScoreConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sequel-rs",
    about = "Merge genome and junction-fragment alignments of paired-end RNA-seq reads",
    version,
    allow_negative_numbers = true
)]
pub struct Args {
    /// Mate 1 genome alignments (BAM, sorted by read name)
    pub ref1: PathBuf,

    /// Mate 1 junction-fragment alignments (BAM, sorted by read name)
    pub juncs1: PathBuf,

    /// Mate 2 genome alignments (BAM, sorted by read name)
    pub ref2: PathBuf,

    /// Mate 2 junction-fragment alignments (BAM, sorted by read name)
    pub juncs2: PathBuf,

    /// Genome FASTA the reads were aligned to
    #[arg(short = 'r', long = "ref", value_name = "FASTA")]
    pub genome: PathBuf,

    /// Junction fragment database
    #[arg(short = 'f', long, value_name = "FILE")]
    pub fragments: PathBuf,

    /// Output prefix; writes <prefix>.bam and <prefix>-dist.txt
    #[arg(short = 'o', long, value_name = "PREFIX")]
    pub output: String,

    /// Gene annotation (GTF/GFF3) used for fragment size estimation
    #[arg(short = 'g', long, value_name = "GTF/GFF")]
    pub gtf: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = 4)]
    pub threads: usize,

    /// Set logging level to WARN
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Minimum exon length used for annotation-based size estimates
    #[arg(long, default_value_t = 250)]
    pub min_exon: u32,

    /// Cumulative fraction of the size distribution kept below the cutoff
    #[arg(long, default_value_t = 0.99)]
    pub confidence: f64,

    /// Largest fragment size recorded in the distribution
    #[arg(long, default_value_t = 1500)]
    pub max_fragment: usize,

    /// Largest mate gap examined for a junction path
    #[arg(long, default_value_t = 1_000_000)]
    pub max_dist: i64,

    /// The library is first stranded
    #[arg(long, conflicts_with = "second_strand")]
    pub first_strand: bool,

    /// The library is second stranded
    #[arg(long)]
    pub second_strand: bool,

    /// Fragment size observations to collect; non-positive uses every pair
    #[arg(long, default_value_t = 1_000_000)]
    pub obs: i64,

    /// Fewest fragment size observations accepted
    #[arg(long, default_value_t = 100_000)]
    pub min_obs: u64,

    /// Most alternate placements written for one read or pair
    #[arg(long, default_value_t = 10)]
    pub max_repeat: u32,

    /// Previously saved fragment size distribution; skips estimation
    #[arg(short = 'F', long, value_name = "FILE")]
    pub frag_sizes: Option<PathBuf>,

    /// Junction search budget per pair
    #[arg(long, default_value_t = 500)]
    pub max_iter: usize,

    /// Canonical splice motifs in plus strand orientation
    #[arg(long, default_value = "GTAG,GCAG,GCTG,GCAA,GCGG,GTTG,GTAA,ATAC,ATAA,ATAG")]
    pub canonical_motifs: String,

    /// Match score
    #[arg(short = 'm', long = "match", default_value_t = 3)]
    pub match_score: i32,

    /// Mismatch score
    #[arg(short = 'i', long, default_value_t = -3)]
    pub mismatch: i32,

    /// Gap open penalty
    #[arg(short = 'G', long, default_value_t = -8)]
    pub gap_open: i32,

    /// Gap extend penalty
    #[arg(short = 'E', long, default_value_t = -1)]
    pub gap_ext: i32,

    /// Penalty for GT-AG junctions
    #[arg(long = "score-GTAG", default_value_t = -3)]
    pub score_gtag: i32,

    /// Penalty for the other canonical junctions
    #[arg(long, default_value_t = -6)]
    pub score_canonical: i32,

    /// Penalty for non-canonical junctions
    #[arg(long, default_value_t = -9)]
    pub score_non_canonical: i32,

    /// Score margin for alternate alignments; doubled for pairs
    #[arg(long, default_value_t = 6)]
    pub score_diff: u32,

    /// Minimum exonic alignment length
    #[arg(long, default_value_t = 8)]
    pub min_length: u32,

    /// Bases trimmed off alignment ends that overhang a splice site
    #[arg(long, default_value_t = 6)]
    pub intron_trim: u32,

    /// Shortest intron that is penalized for its size
    #[arg(long, default_value_t = 64_000)]
    pub big_intron_size: u32,

    /// Big intron penalty, applied as -(log2(size) + penalty)
    #[arg(long, default_value_t = -12)]
    pub big_intron_penalty: i32,

    /// Minimum score per aligned base
    #[arg(long, default_value_t = 2.0)]
    pub min_score: f64,

    /// Write unique discordant pairs closer than this
    #[arg(long, default_value_t = 10_000)]
    pub max_discordant_dist: i64,

    /// Unexplained pairs inside one gene closer than this are concordant
    #[arg(long, default_value_t = 0)]
    pub max_gene_dist: i64,

    /// Without an annotation, unexplained pairs closer than this are concordant
    #[arg(long, default_value_t = 0)]
    pub max_fallback_dist: i64,

    /// Maximum edit distance of a single read
    #[arg(long, default_value_t = 15)]
    pub max_edit_dist: u32,

    /// Score bonus at the mode of the fragment size distribution
    #[arg(long, default_value_t = 10)]
    pub score_bonus: i32,
}

impl Args {
    pub fn stranded(&self) -> Stranded {
        if self.first_strand {
            Stranded::FirstStrand
        } else if self.second_strand {
            Stranded::SecondStrand
        } else {
            Stranded::Unstranded
        }
    }

    pub fn score_config(&self) -> ScoreConfig {
        ScoreConfig {
            match_score: self.match_score,
            mismatch: self.mismatch,
            gap_open: self.gap_open,
            gap_ext: self.gap_ext,
            canonical_motifs: self.canonical_motifs.clone(),
            score_gtag: self.score_gtag,
            score_canonical: self.score_canonical,
            score_non_canonical: self.score_non_canonical,
            big_intron_size: self.big_intron_size,
            big_intron_penalty: self.big_intron_penalty,
            min_score: self.min_score,
            max_edit_dist: self.max_edit_dist,
        }
    }

    /// The fallback distance only applies without an annotation.
    pub fn fragment_size_config(&self) -> FragmentSizeConfig {
        FragmentSizeConfig {
            max_dist: self.max_dist,
            max_gene_dist: self.max_gene_dist,
            fallback_dist: if self.gtf.is_some() {
                0
            } else {
                self.max_fallback_dist
            },
            score_bonus: self.score_bonus as f64,
        }
    }

    pub fn pair_config(&self) -> PairConfig {
        PairConfig {
            score_diff: self.score_diff,
            max_repeat: self.max_repeat,
            max_discordant_dist: self.max_discordant_dist,
            min_length: self.min_length,
        }
    }
}
