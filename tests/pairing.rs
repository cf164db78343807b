/// End-to-end classification of single read pairs through the public API:
/// fragment resolution, per-mate filtering, pairing and the pass-2 decision.
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;
use sequel_rs::bam_io::InputPair;
use sequel_rs::estimate_dist::EstimateDist;
use sequel_rs::fragment_size::{FragmentSize, FragmentSizeConfig};
use sequel_rs::fragments::{FragmentMap, FragmentSet};
use sequel_rs::genome::GenomeDb;
use sequel_rs::intervals::GeneIntervals;
use sequel_rs::junctions::{Junction, PairJunctions};
use sequel_rs::pair_builder::{OutputCounts, PairBuilder, PairConfig, PairResolver};
use sequel_rs::read_pair::{ReadPairFactory, Stranded};
use sequel_rs::record::{Alignment, Cigar, CigarOp, tags};
use sequel_rs::resolve::ResolveFragments;
use sequel_rs::scoring::{ScoreConfig, ScoreFilter};
use sequel_rs::size_dist::SizeDist;
use sequel_rs::splice_trim::SpliceTrimmer;
use sequel_rs::types::Strand;

// ── helpers ──────────────────────────────────────────────────────────────────

fn aln(name: &str, lft: u32, cigar: &str, reverse: bool) -> Alignment {
    let cigar: Cigar = cigar.parse().unwrap();
    let len = cigar.query_len() as usize;
    Alignment {
        name: name.as_bytes().to_vec(),
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

fn size_dist() -> SizeDist {
    let mut d = SizeDist::new(0.99, 1000);
    for s in 200..450 {
        d.add_fragment(s);
    }
    d.normalize();
    d
}

/// `n` copies of one placement, `step` bases apart.
fn placements(lft: u32, step: u32, n: u32, reverse: bool) -> Vec<Alignment> {
    (0..n)
        .map(|i| aln("p", lft + i * step, "100M", reverse))
        .collect()
}

/// Shared read-only state of one pass-2 worker.
struct World {
    genome: GenomeDb,
    resolver: ResolveFragments,
    trimmer: SpliceTrimmer,
    junctions: PairJunctions,
    estimator: EstimateDist,
    intervals: GeneIntervals,
    dist: SizeDist,
}

impl World {
    fn new(genome_len: usize) -> Self {
        let mut junctions = PairJunctions::new(8, 500);
        junctions.add_junction(Junction {
            tid: 0,
            lft: 1149,
            rgt: 2150,
            strand: Strand::Plus,
        });
        junctions.prepare();
        let mut trimmer = SpliceTrimmer::new(6);
        trimmer.add_junction(0, 1149, 2150);
        trimmer.merge();
        Self {
            genome: GenomeDb::from_sequences(vec![vec![b'A'; genome_len]]),
            resolver: ResolveFragments::new(FragmentMap::default(), Vec::<String>::new(), ["chr1"])
                .unwrap(),
            trimmer,
            junctions,
            estimator: EstimateDist::default(),
            intervals: GeneIntervals::default(),
            dist: size_dist(),
        }
    }
}

/// Run one input pair through a pass-2 worker; returns what it wrote and
/// how it counted the pair.
fn classify(
    world: &World,
    ref1: Vec<Alignment>,
    ref2: Vec<Alignment>,
) -> (Vec<Alignment>, OutputCounts) {
    let scorer = ScoreFilter::new(&ScoreConfig::default(), &world.genome).unwrap();
    let builder = PairBuilder {
        resolver: &world.resolver,
        trimmer: &world.trimmer,
        scorer: &scorer,
        factory: ReadPairFactory::new(Stranded::Unstranded),
        config: PairConfig::default(),
    };
    let sizer = FragmentSize {
        junctions: &world.junctions,
        estimator: &world.estimator,
        intervals: &world.intervals,
        config: FragmentSizeConfig::default(),
    };
    let mut worker = PairResolver::new(builder, sizer, &world.dist);
    worker
        .process(InputPair {
            ref1,
            ref2,
            ..Default::default()
        })
        .unwrap();
    let mut output = Vec::new();
    worker.swap_output(&mut output);
    (output, worker.counts)
}

// ── tests ────────────────────────────────────────────────────────────────────

#[test]
fn intron_spanning_pair_is_unique_and_primary() {
    let world = World::new(3000);
    // 50 exonic bases before the intron and 100 after it
    let m1 = aln("p", 1000, "100M", false);
    let m2 = aln("p", 2250, "100M", true);
    let (output, counts) = classify(&world, vec![m1], vec![m2]);

    assert_eq!(counts.unique_pair, 1);
    assert_eq!(counts.total, 1);
    assert_eq!(output.len(), 2);
    for r in &output {
        assert_eq!(r.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(1));
        assert_eq!(r.int_tag(Tag::HIT_INDEX), Some(1));
        assert!(!r.flags.is_secondary());
        assert!(r.flags.is_properly_segmented());
    }
    assert!(output[0].flags.is_first_segment());
    assert!(output[1].flags.is_last_segment());
    assert_eq!(output[0].mate_lft, Some(2250));
    assert_eq!(output[0].tlen, 1350);
    assert_eq!(output[1].tlen, -1350);
}

#[test]
fn distant_mates_are_left_unaligned() {
    let world = World::new(2_001_200);
    let m1 = aln("p", 1000, "100M", false);
    let m2 = aln("p", 2_001_000, "100M", true);
    let (output, counts) = classify(&world, vec![m1], vec![m2]);

    assert_eq!(counts.unique_pair, 0);
    assert_eq!(counts.repeat_pair, 0);
    assert_eq!(counts.discordant_single, 0);
    assert_eq!(counts.discordant_pair, 1);
    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|r| r.flags.is_unmapped()));
    assert!(output[0].flags.is_first_segment());
    assert!(output[1].flags.is_last_segment());
}

#[test]
fn close_discordant_pair_is_written_once() {
    let world = World::new(10_000);
    // mates 5 kb apart: too far for the distribution, near enough to write
    let m1 = aln("p", 1000, "100M", false);
    let m2 = aln("p", 6000, "100M", true);
    let (output, counts) = classify(&world, vec![m1], vec![m2]);

    assert_eq!(counts.discordant_single, 1);
    assert_eq!(output.len(), 2);
    for r in &output {
        assert!(!r.flags.is_unmapped());
        assert!(!r.flags.is_properly_segmented());
        assert_eq!(r.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(1));
    }
}

#[test]
fn lone_mate_is_a_singleton() {
    let world = World::new(3000);
    let (output, counts) = classify(&world, vec![aln("p", 500, "100M", false)], Vec::new());

    assert_eq!(counts.r1_single, 1);
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(1));
    assert_eq!(output[0].int_tag(Tag::HIT_INDEX), Some(1));
}

#[test]
fn equal_concordant_placements_are_ranked_repeats() {
    let world = World::new(30_000);
    let m1 = placements(3000, 10_000, 2, false);
    let m2 = placements(3200, 10_000, 2, true);
    let (output, counts) = classify(&world, m1, m2);

    assert_eq!(counts.repeat_pair, 1);
    assert_eq!(counts.unique_pair, 0);
    assert_eq!(output.len(), 4);
    for (i, r) in output.iter().enumerate() {
        let rank = i as i64 / 2 + 1;
        assert!(!r.flags.is_unmapped());
        assert_eq!(r.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(2));
        assert_eq!(r.int_tag(Tag::HIT_INDEX), Some(rank));
        assert_eq!(r.flags.is_secondary(), rank > 1);
    }
    assert_eq!(output[0].lft, 3000);
    assert_eq!(output[1].lft, 3200);
    assert_eq!(output[2].lft, 13_000);
    assert_eq!(output[3].lft, 13_200);
}

#[test]
fn too_many_concordant_placements_become_placeholders() {
    let world = World::new(120_000);
    let m1 = placements(3000, 10_000, 11, false);
    let m2 = placements(3200, 10_000, 11, true);
    let (output, counts) = classify(&world, m1, m2);

    assert_eq!(counts.xrepeat_pair, 1);
    assert_eq!(counts.repeat_pair, 0);
    assert_eq!(output.len(), 2);
    for r in &output {
        assert!(r.flags.is_unmapped());
        assert_eq!(r.int_tag(tags::zr()), Some(1));
    }
    assert!(output[0].flags.is_first_segment());
    assert!(output[1].flags.is_last_segment());
}

#[test]
fn several_discordant_pairs_are_left_unaligned() {
    let world = World::new(10_000);
    // both placements of mate 2 are near mate 1 but outside the distribution
    let m1 = vec![aln("p", 1000, "100M", false)];
    let m2 = vec![aln("p", 6000, "100M", true), aln("p", 6500, "100M", true)];
    let (output, counts) = classify(&world, m1, m2);

    assert_eq!(counts.discordant_pair, 1);
    assert_eq!(counts.discordant_single, 0);
    assert_eq!(output.len(), 2);
    for r in &output {
        assert!(r.flags.is_unmapped());
        assert_eq!(r.int_tag(tags::zr()), None);
    }
}

#[test]
fn lone_mate_with_two_placements_is_a_repeat() {
    let world = World::new(3000);
    let (output, counts) = classify(&world, placements(300, 1000, 2, false), Vec::new());

    assert_eq!(counts.r1_repeat, 1);
    assert_eq!(output.len(), 2);
    for (i, r) in output.iter().enumerate() {
        assert_eq!(r.int_tag(Tag::ALIGNMENT_HIT_COUNT), Some(2));
        assert_eq!(r.int_tag(Tag::HIT_INDEX), Some(i as i64 + 1));
        assert_eq!(r.flags.is_secondary(), i > 0);
    }
}

#[test]
fn lone_mate_with_too_many_placements_is_a_placeholder() {
    let world = World::new(30_000);
    let (output, counts) = classify(&world, Vec::new(), placements(300, 2000, 11, true));

    assert_eq!(counts.r2_xrepeat, 1);
    assert_eq!(output.len(), 1);
    assert!(output[0].flags.is_unmapped());
    assert!(output[0].flags.is_last_segment());
    assert_eq!(output[0].int_tag(tags::zr()), Some(1));
}

#[test]
fn resolve_inserts_one_skip_per_crossed_boundary() {
    let mut map = FragmentMap::default();
    let mut set = FragmentSet::new(3, "chr1", Strand::Minus);
    let blocks = [(100, 139), (500, 539), (900, 939), (1500, 1539)];
    for (lft, rgt) in blocks {
        set.add_block(lft, rgt);
    }
    map.insert(set);
    let rf = ResolveFragments::new(map, ["3"], ["chr1"]).unwrap();

    for start in 0..100u32 {
        for len in [30u32, 45, 60] {
            if start + len > 160 {
                continue;
            }
            let rgt = start + len - 1;
            let out = rf.resolve(aln("q", start, &format!("{len}M"), false)).unwrap();

            let first = (start / 40) as usize;
            let last = (rgt / 40) as usize;
            let k = last - first;
            if k == 0 {
                assert!(out.filtered);
                continue;
            }
            let skips: Vec<u32> = out
                .cigar
                .ops
                .iter()
                .filter(|(_, op)| *op == CigarOp::RefSkip)
                .map(|&(n, _)| n)
                .collect();
            assert_eq!(skips.len(), k, "start {start} len {len}");
            for (i, n) in skips.iter().enumerate() {
                let (_, prev_rgt) = blocks[first + i];
                let (next_lft, _) = blocks[first + i + 1];
                assert_eq!(*n, next_lft - prev_rgt - 1);
            }
            let genome_lft = blocks[first].0 + start % 40;
            assert_eq!(out.lft, genome_lft);
            let skipped: u32 = skips.iter().sum();
            assert_eq!(out.rgt(), genome_lft + len + skipped - 1);
            assert_eq!(out.int_tag(tags::zj()), Some(3));
            assert_eq!(out.xs_strand(), Strand::Minus);
        }
    }
}
