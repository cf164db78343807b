//! sequel-rs: reconcile genome and junction-fragment alignments of
//! paired-end RNA-seq reads.
//!
//! Each mate is aligned twice, once to the genome and once to a database of
//! short fragments that span known splice junctions. This crate maps the
//! fragment hits back to the genome, scores and filters both sets, pairs
//! the mates and decides, using an empirical fragment size distribution,
//! which placements are concordant.
//!
//! # Library usage
//!
//! ```no_run
//! use sequel_rs::pipeline::{self, RunConfig};
//!
//! // let config: RunConfig = /* paths, thresholds, scoring weights */;
//! // let stats = pipeline::run(&config)?;
//! // pipeline::report(&stats.counts);
//! ```

pub mod annotation;
pub mod bam_io;
pub mod cli;
pub mod estimate_dist;
pub mod fragment_size;
pub mod fragments;
pub mod genome;
pub mod intervals;
pub mod junctions;
pub mod pair_builder;
pub mod pipeline;
pub mod read_pair;
pub mod record;
pub mod resolve;
pub mod scoring;
pub mod seed;
pub mod size_dist;
pub mod splice_trim;
pub mod types;

pub use pair_builder::{OutputCounts, PairConfig};
pub use pipeline::{RunConfig, Stats, run};
pub use record::{Alignment, Cigar, CigarOp};
