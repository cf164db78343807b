//! Two-pass driver.
//!
//! Pass 1 measures the fragment size distribution from pairs with a single
//! plausible placement. Pass 2 reopens the inputs, classifies every read
//! pair against the frozen distribution and writes the merged alignments.

use crate::annotation::GeneModel;
use crate::bam_io::{BamOutput, InputPair, PairedReader, reference_names};
use crate::cli::Args;
use crate::estimate_dist::EstimateDist;
use crate::fragment_size::{FragmentSize, FragmentSizeConfig};
use crate::fragments::FragmentMap;
use crate::genome::GenomeDb;
use crate::intervals::GeneIntervals;
use crate::junctions::{Junction, PairJunctions};
use crate::pair_builder::{OutputCounts, PairBuilder, PairConfig, PairEstimator, PairResolver};
use crate::read_pair::{ReadPairFactory, Stranded};
use crate::record::Alignment;
use crate::resolve::ResolveFragments;
use crate::scoring::{ScoreConfig, ScoreFilter};
use crate::size_dist::SizeDist;
use crate::splice_trim::SpliceTrimmer;
use crate::types::{HashMap, HashMapExt, RefId};
use anyhow::{Result, anyhow, bail};
use crossfire::mpmc;
use noodles::sam;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::info;

const ESTIMATE_BATCH: usize = 5_000;
const RESOLVE_BATCH: usize = 10_000;
const PROGRESS_EVERY: usize = 1_000_000;

/// Everything the run needs, detached from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub ref1: PathBuf,
    pub tx1: PathBuf,
    pub ref2: PathBuf,
    pub tx2: PathBuf,
    pub genome: PathBuf,
    pub fragments: PathBuf,
    pub gtf: Option<PathBuf>,
    pub output: String,
    pub frag_sizes: Option<PathBuf>,
    pub threads: usize,
    pub stranded: Stranded,
    pub confidence: f64,
    pub max_fragment: usize,
    pub min_exon: u32,
    pub intron_trim: u32,
    pub max_iter: usize,
    pub obs: i64,
    pub min_obs: u64,
    pub score: ScoreConfig,
    pub sizes: FragmentSizeConfig,
    pub pairs: PairConfig,
}

impl From<&Args> for RunConfig {
    fn from(args: &Args) -> Self {
        Self {
            ref1: args.ref1.clone(),
            tx1: args.juncs1.clone(),
            ref2: args.ref2.clone(),
            tx2: args.juncs2.clone(),
            genome: args.genome.clone(),
            fragments: args.fragments.clone(),
            gtf: args.gtf.clone(),
            output: args.output.clone(),
            frag_sizes: args.frag_sizes.clone(),
            threads: args.threads.max(1),
            stranded: args.stranded(),
            confidence: args.confidence,
            max_fragment: args.max_fragment,
            min_exon: args.min_exon,
            intron_trim: args.intron_trim,
            max_iter: args.max_iter,
            obs: args.obs,
            min_obs: args.min_obs,
            score: args.score_config(),
            sizes: args.fragment_size_config(),
            pairs: args.pair_config(),
        }
    }
}

impl RunConfig {
    pub fn bam_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.bam", self.output))
    }

    pub fn dist_path(&self) -> PathBuf {
        PathBuf::from(format!("{}-dist.txt", self.output))
    }

    fn open_inputs(&self) -> Result<PairedReader> {
        PairedReader::open(&self.ref1, &self.tx1, &self.ref2, &self.tx2)
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    /// Observations behind the fragment size distribution.
    pub observations: u64,
    pub read_groups: usize,
    pub counts: OutputCounts,
}

/// Read-only indices shared by every worker of both passes.
struct Indices {
    genome_header: sam::Header,
    resolver: ResolveFragments,
    trimmer: SpliceTrimmer,
    junctions: PairJunctions,
    intervals: GeneIntervals,
    estimator: EstimateDist,
}

impl Indices {
    fn load(
        config: &RunConfig,
        genome_header: sam::Header,
        fragment_header: &sam::Header,
    ) -> Result<Self> {
        let model = match &config.gtf {
            Some(path) => GeneModel::load(path)?,
            None => GeneModel::default(),
        };
        let frags = FragmentMap::from_path(&config.fragments)?;

        let genome_refs = reference_names(&genome_header);
        let mut tids: HashMap<String, RefId> = HashMap::with_capacity(genome_refs.len());
        for (tid, name) in genome_refs.iter().enumerate() {
            tids.insert(name.clone(), tid);
        }
        let tid_of = |name: &str| tids.get(name).copied();

        let resolver =
            ResolveFragments::new(frags, reference_names(fragment_header), &genome_refs)?;

        let started = Instant::now();
        let mut trimmer = SpliceTrimmer::new(config.intron_trim);
        let mut junctions = PairJunctions::new(config.pairs.min_length, config.max_iter);
        for set in resolver.fragment_map().iter() {
            let Some(tid) = tid_of(set.chrom.as_str()) else {
                continue;
            };
            for (lft, rgt) in set.junctions() {
                trimmer.add_junction(tid, lft, rgt);
                junctions.add_junction(Junction {
                    tid,
                    lft,
                    rgt,
                    strand: set.strand,
                });
            }
        }
        for junc in model.junctions() {
            let Some(tid) = tid_of(junc.chrom) else {
                continue;
            };
            trimmer.add_junction(tid, junc.lft, junc.rgt);
            junctions.add_junction(Junction {
                tid,
                lft: junc.lft,
                rgt: junc.rgt,
                strand: junc.strand,
            });
        }
        junctions.prepare();
        trimmer.merge();
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built the splice junction maps"
        );

        let intervals = GeneIntervals::new(&model, tid_of);
        let estimator = EstimateDist::new(&model, config.min_exon, tid_of);

        Ok(Self {
            genome_header,
            resolver,
            trimmer,
            junctions,
            intervals,
            estimator,
        })
    }

    fn builder<'a>(&'a self, scorer: &'a ScoreFilter<'a>, config: &RunConfig) -> PairBuilder<'a> {
        PairBuilder {
            resolver: &self.resolver,
            trimmer: &self.trimmer,
            scorer,
            factory: ReadPairFactory::new(config.stranded),
            config: config.pairs,
        }
    }

    fn sizer(&self, config: &RunConfig) -> FragmentSize<'_> {
        FragmentSize {
            junctions: &self.junctions,
            estimator: &self.estimator,
            intervals: &self.intervals,
            config: config.sizes,
        }
    }
}

pub fn run(config: &RunConfig) -> Result<Stats> {
    let (genome_header, fragment_header) = {
        let reader = config.open_inputs()?;
        (reader.genome_header().clone(), reader.fragment_header().clone())
    };
    let genome = GenomeDb::load(&config.genome, reference_names(&genome_header))?;
    let indices = Indices::load(config, genome_header, &fragment_header)?;
    let scorer = ScoreFilter::new(&config.score, &genome)?;

    let dist = match &config.frag_sizes {
        Some(path) => SizeDist::load_from_path(config.confidence, path)?,
        None => {
            let dist = estimate_sizes(config, &indices, &scorer)?;
            let path = config.dist_path();
            dist.save_to_path(&path)?;
            info!(path = %path.display(), "Saved fragment size distribution");
            dist
        }
    };

    let (read_groups, counts) = resolve_pairs(config, &indices, &scorer, &dist)?;
    Ok(Stats {
        observations: dist.count(),
        read_groups,
        counts,
    })
}

/// Split `batch` into `n` contiguous slices, the first ones one longer when
/// it does not divide evenly.
fn split_batch(mut batch: Vec<InputPair>, n: usize) -> Vec<Vec<InputPair>> {
    let per = batch.len() / n;
    let mut extra = batch.len() % n;
    let mut chunks = Vec::with_capacity(n);
    for _ in 0..n {
        let mut len = per;
        if extra > 0 {
            len += 1;
            extra -= 1;
        }
        let rest = batch.split_off(len);
        chunks.push(std::mem::replace(&mut batch, rest));
    }
    chunks
}

fn join_worker(handle: thread::ScopedJoinHandle<'_, Result<()>>) -> Result<()> {
    handle
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?
}

fn estimate_sizes(
    config: &RunConfig,
    indices: &Indices,
    scorer: &ScoreFilter<'_>,
) -> Result<SizeDist> {
    let mut reader = config.open_inputs()?;
    let mut workers: Vec<PairEstimator<'_>> = (0..config.threads)
        .map(|_| {
            PairEstimator::new(
                indices.builder(scorer, config),
                indices.sizer(config),
                SizeDist::new(config.confidence, config.max_fragment),
            )
        })
        .collect();

    let started = Instant::now();
    let mut batch = Vec::with_capacity(ESTIMATE_BATCH);
    let mut total = 0usize;
    let mut observed = 0usize;
    while reader.load_batch(ESTIMATE_BATCH, &mut batch)? > 0 {
        let prev = total;
        total += batch.len();
        let chunks = split_batch(std::mem::take(&mut batch), workers.len());

        thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = workers
                .iter_mut()
                .zip(chunks)
                .map(|(worker, chunk)| {
                    scope.spawn(move || -> Result<()> {
                        for input in chunk {
                            worker.process(input)?;
                        }
                        Ok(())
                    })
                })
                .collect();
            for handle in handles {
                join_worker(handle)?;
            }
            Ok(())
        })?;

        observed = workers.iter().map(|w| w.num_passed).sum();
        if config.obs > 0 && observed as i64 >= config.obs {
            break;
        }
        if total / PROGRESS_EVERY > prev / PROGRESS_EVERY {
            let used: usize = workers.iter().map(|w| w.num_used).sum();
            info!(
                observations = observed,
                unique_groups = used,
                processed = total,
                elapsed_s = started.elapsed().as_secs(),
                "Estimating fragment sizes"
            );
        }
    }
    info!(
        processed = total,
        observations = observed,
        elapsed_s = started.elapsed().as_secs(),
        "Finished fragment size estimation"
    );

    let mut dist = SizeDist::new(config.confidence, config.max_fragment);
    let mut passed = 0u64;
    for worker in &workers {
        passed += worker.num_passed as u64;
        dist += &worker.dist;
    }
    if passed < config.min_obs {
        bail!(
            "only observed {passed} fragment sizes, at least {} are required",
            config.min_obs
        );
    }
    dist.normalize();
    Ok(dist)
}

/// Output pools of one batch, one per worker.
type Pools = Vec<Vec<Alignment>>;

fn resolve_pairs(
    config: &RunConfig,
    indices: &Indices,
    scorer: &ScoreFilter<'_>,
    dist: &SizeDist,
) -> Result<(usize, OutputCounts)> {
    let mut reader = config.open_inputs()?;
    let n = config.threads.saturating_sub(1).max(1);
    let mut workers: Vec<PairResolver<'_>> = (0..n)
        .map(|_| PairResolver::new(indices.builder(scorer, config), indices.sizer(config), dist))
        .collect();
    let output = BamOutput::create(&config.bam_path(), indices.genome_header.clone())?;

    crossfire::detect_backoff_cfg();
    let (tx_pools, rx_pools) = mpmc::bounded_blocking::<Pools>(1);
    let (tx_free, rx_free) = mpmc::unbounded_blocking::<Pools>();

    // one spare set of pools circulates between the workers and the writer
    tx_free
        .send((0..n).map(|_| Vec::new()).collect())
        .map_err(|_| anyhow!("output writer stopped"))?;

    let started = Instant::now();
    let mut total = 0usize;
    thread::scope(|scope| -> Result<()> {
        let writer = scope.spawn(move || -> Result<()> {
            let mut output = output;
            while let Ok(mut pools) = rx_pools.recv() {
                for pool in pools.iter_mut() {
                    output.write(pool)?;
                    pool.clear();
                }
                if tx_free.send(pools).is_err() {
                    break;
                }
            }
            output.finish()
        });

        let driven = (|| -> Result<()> {
            let mut batch = Vec::with_capacity(RESOLVE_BATCH);
            while reader.load_batch(RESOLVE_BATCH, &mut batch)? > 0 {
                let prev = total;
                total += batch.len();
                let chunks = split_batch(std::mem::take(&mut batch), n);

                thread::scope(|inner| -> Result<()> {
                    let handles: Vec<_> = workers
                        .iter_mut()
                        .zip(chunks)
                        .map(|(worker, chunk)| {
                            inner.spawn(move || -> Result<()> {
                                for input in chunk {
                                    worker.process(input)?;
                                }
                                Ok(())
                            })
                        })
                        .collect();
                    for handle in handles {
                        join_worker(handle)?;
                    }
                    Ok(())
                })?;

                // blocks until the previous batch is written
                let mut pools = rx_free
                    .recv()
                    .map_err(|_| anyhow!("output writer stopped"))?;
                for (worker, pool) in workers.iter_mut().zip(pools.iter_mut()) {
                    worker.swap_output(pool);
                }
                tx_pools
                    .send(pools)
                    .map_err(|_| anyhow!("output writer stopped"))?;

                if total / PROGRESS_EVERY > prev / PROGRESS_EVERY {
                    let unique: usize = workers.iter().map(|w| w.counts.unique_pair).sum();
                    let tested: usize = workers.iter().map(|w| w.counts.total).sum();
                    info!(
                        unique,
                        tested,
                        processed = total,
                        elapsed_s = started.elapsed().as_secs(),
                        "Merging pairs"
                    );
                }
            }
            Ok(())
        })();
        drop(tx_pools);

        let written = writer
            .join()
            .map_err(|_| anyhow!("output writer panicked"))?;
        written?;
        driven
    })?;

    let mut counts = OutputCounts::default();
    for worker in &workers {
        counts += &worker.counts;
    }
    info!(
        processed = total,
        elapsed_s = started.elapsed().as_secs(),
        "Finished merging pairs"
    );
    Ok((total, counts))
}

/// Write `counts` as one line per category.
pub fn report(counts: &OutputCounts) {
    for (label, count) in counts.labeled() {
        info!("{label:<24}{count:>12}");
    }
}
