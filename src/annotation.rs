//! Gene models from GTF/GFF3 exon features.
//!
//! Coordinates are 0-based inclusive throughout: a GTF exon at `1000..=1099`
//! is stored as `lft = 999, rgt = 1098`.

use crate::types::{HashMap, HashMapExt, Pos, Strand};
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Gtf,
    Gff3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Exon {
    pub lft: Pos,
    pub rgt: Pos,
}

impl Exon {
    pub fn length(&self) -> u32 {
        self.rgt - self.lft + 1
    }

    pub fn overlaps(&self, other: &Exon) -> bool {
        self.lft <= other.rgt && other.lft <= self.rgt
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub id: String,
    pub strand: Strand,
    pub exons: Vec<Exon>,
}

impl Transcript {
    pub fn lft(&self) -> Pos {
        self.exons.first().map_or(0, |e| e.lft)
    }

    pub fn rgt(&self) -> Pos {
        self.exons.last().map_or(0, |e| e.rgt)
    }

    pub fn length(&self) -> u32 {
        self.exons.iter().map(Exon::length).sum()
    }

    /// Introns as `(last base of exon i-1, first base of exon i)`.
    pub fn junctions(&self) -> impl Iterator<Item = (Pos, Pos)> + '_ {
        self.exons.windows(2).map(|w| (w[0].rgt, w[1].lft))
    }
}

#[derive(Debug, Clone)]
pub struct Gene {
    pub id: String,
    pub strand: Strand,
    pub lft: Pos,
    pub rgt: Pos,
    pub transcripts: Vec<Transcript>,
}

/// Genes of one reference sequence, sorted by `(lft, rgt)`.
#[derive(Debug, Clone)]
pub struct RefGenes {
    pub name: String,
    pub genes: Vec<Gene>,
}

/// An annotated intron on a named reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelJunction<'a> {
    pub chrom: &'a str,
    pub lft: Pos,
    pub rgt: Pos,
    pub strand: Strand,
}

#[derive(Debug, Clone, Default)]
pub struct GeneModel {
    refs: Vec<RefGenes>,
}

impl GeneModel {
    pub fn load(path: &Path) -> Result<Self> {
        let model = match detect_format(path)? {
            InputFormat::Gtf => load_gtf(path),
            InputFormat::Gff3 => load_gff3(path),
        }
        .with_context(|| format!("failed to load annotation {}", path.display()))?;
        info!(
            path = %path.display(),
            references = model.refs.len(),
            genes = model.gene_count(),
            "Loaded gene model"
        );
        Ok(model)
    }

    pub fn refs(&self) -> &[RefGenes] {
        &self.refs
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn gene_count(&self) -> usize {
        self.refs.iter().map(|r| r.genes.len()).sum()
    }

    pub fn junctions(&self) -> impl Iterator<Item = ModelJunction<'_>> + '_ {
        self.refs.iter().flat_map(|r| {
            r.genes
                .iter()
                .flat_map(|g| g.transcripts.iter())
                .flat_map(move |t| {
                    t.junctions().map(move |(lft, rgt)| ModelJunction {
                        chrom: &r.name,
                        lft,
                        rgt,
                        strand: t.strand,
                    })
                })
        })
    }
}

/// Collects exons keyed by transcript, then groups them into genes.
#[derive(Debug, Default)]
pub struct GeneModelBuilder {
    transcripts: HashMap<String, PendingTranscript>,
}

#[derive(Debug)]
struct PendingTranscript {
    chrom: String,
    gene_id: String,
    strand: Strand,
    exons: Vec<Exon>,
}

impl GeneModelBuilder {
    pub fn new() -> Self {
        Self {
            transcripts: HashMap::new(),
        }
    }

    /// Add one exon in 0-based inclusive coordinates.
    pub fn add_exon(
        &mut self,
        chrom: &str,
        gene_id: &str,
        transcript_id: &str,
        strand: Strand,
        lft: Pos,
        rgt: Pos,
    ) {
        self.transcripts
            .entry(transcript_id.to_string())
            .or_insert_with(|| PendingTranscript {
                chrom: chrom.to_string(),
                gene_id: gene_id.to_string(),
                strand,
                exons: Vec::new(),
            })
            .exons
            .push(Exon { lft, rgt });
    }

    pub fn finish(self) -> GeneModel {
        // chrom -> gene id -> gene
        let mut by_ref: HashMap<String, HashMap<String, Gene>> = HashMap::new();
        for (id, mut pending) in self.transcripts {
            pending.exons.sort_unstable();
            pending.exons.dedup();
            let tx = Transcript {
                id,
                strand: pending.strand,
                exons: pending.exons,
            };
            let gene = by_ref
                .entry(pending.chrom)
                .or_default()
                .entry(pending.gene_id.clone())
                .or_insert_with(|| Gene {
                    id: pending.gene_id,
                    strand: tx.strand,
                    lft: tx.lft(),
                    rgt: tx.rgt(),
                    transcripts: Vec::new(),
                });
            gene.lft = gene.lft.min(tx.lft());
            gene.rgt = gene.rgt.max(tx.rgt());
            gene.transcripts.push(tx);
        }

        let mut refs: Vec<RefGenes> = by_ref
            .into_iter()
            .map(|(name, genes)| {
                let mut genes: Vec<Gene> = genes.into_values().collect();
                for g in &mut genes {
                    g.transcripts
                        .sort_unstable_by(|a, b| (a.lft(), a.rgt(), &a.id).cmp(&(b.lft(), b.rgt(), &b.id)));
                }
                genes.sort_unstable_by(|a, b| (a.lft, a.rgt, &a.id).cmp(&(b.lft, b.rgt, &b.id)));
                RefGenes { name, genes }
            })
            .collect();
        refs.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        GeneModel { refs }
    }
}

pub fn detect_format(path: &Path) -> Result<InputFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "gtf" => Ok(InputFormat::Gtf),
        "gff" | "gff3" => Ok(InputFormat::Gff3),
        _ => Err(anyhow!(
            "unable to detect annotation format from extension: .{}",
            ext
        )),
    }
}

/// GTF exons carry `gene_id` and `transcript_id` directly.
fn load_gtf(path: &Path) -> Result<GeneModel> {
    let reader = File::open(path)?;
    let mut reader = noodles::gtf::io::Reader::new(BufReader::new(reader));
    let mut builder = GeneModelBuilder::new();

    for result in reader.record_bufs() {
        let record = result?;
        let feature_type: &[u8] = record.ty().as_ref();
        if feature_type != b"exon" {
            continue;
        }

        let (lft, rgt) = zero_based(record.start().get(), record.end().get())?;
        let attrs = record.attributes();
        let (Some(gene_id), Some(transcript_id)) = (
            get_record_buf_attribute(attrs, b"gene_id"),
            get_record_buf_attribute(attrs, b"transcript_id"),
        ) else {
            debug!(start = lft, "Skipping exon without gene_id/transcript_id");
            continue;
        };

        builder.add_exon(
            &record.reference_sequence_name().to_string(),
            &gene_id,
            &transcript_id,
            convert_strand(record.strand()),
            lft,
            rgt,
        );
    }

    Ok(builder.finish())
}

/// GFF3 exons name their transcript through `Parent`; the transcript's own
/// `Parent` names the gene. Transcripts without a gene are their own gene.
fn load_gff3(path: &Path) -> Result<GeneModel> {
    let reader = File::open(path)?;
    let mut reader = noodles::gff::io::Reader::new(BufReader::new(reader));

    struct RawExon {
        chrom: String,
        parent: String,
        strand: Strand,
        lft: Pos,
        rgt: Pos,
    }

    let mut tx2gene: HashMap<String, String> = HashMap::new();
    let mut exons = Vec::new();

    for result in reader.record_bufs() {
        let record = result?;
        let feature_type: &[u8] = record.ty().as_ref();
        let attrs = record.attributes();
        if feature_type == b"exon" {
            let Some(parent) = get_record_buf_attribute(attrs, b"Parent") else {
                continue;
            };
            let (lft, rgt) = zero_based(record.start().get(), record.end().get())?;
            exons.push(RawExon {
                chrom: record.reference_sequence_name().to_string(),
                parent,
                strand: convert_strand(record.strand()),
                lft,
                rgt,
            });
        } else if let (Some(id), Some(parent)) = (
            get_record_buf_attribute(attrs, b"ID"),
            get_record_buf_attribute(attrs, b"Parent"),
        ) {
            tx2gene.insert(id, parent);
        }
    }

    let mut builder = GeneModelBuilder::new();
    for e in exons {
        let gene_id = tx2gene.get(&e.parent).unwrap_or(&e.parent);
        builder.add_exon(&e.chrom, gene_id, &e.parent, e.strand, e.lft, e.rgt);
    }
    Ok(builder.finish())
}

fn zero_based(start: usize, end: usize) -> Result<(Pos, Pos)> {
    let lft = Pos::try_from(start - 1).map_err(|_| anyhow!("annotation start out of range"))?;
    let rgt = Pos::try_from(end - 1).map_err(|_| anyhow!("annotation end out of range"))?;
    Ok((lft, rgt))
}

fn get_record_buf_attribute(
    attrs: &noodles::gff::feature::record_buf::Attributes,
    key: &[u8],
) -> Option<String> {
    let value = attrs.get(key)?;
    value.iter().next().map(|v| v.to_string())
}

fn convert_strand(strand: noodles::gff::feature::record::Strand) -> Strand {
    use noodles::gff::feature::record::Strand as GffStrand;
    match strand {
        GffStrand::Forward => Strand::Plus,
        GffStrand::Reverse => Strand::Minus,
        GffStrand::None | GffStrand::Unknown => Strand::Both,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builder_groups_and_sorts() {
        let mut b = GeneModelBuilder::new();
        b.add_exon("chr1", "g2", "t3", Strand::Minus, 5000, 5100);
        b.add_exon("chr1", "g1", "t1", Strand::Plus, 300, 400);
        b.add_exon("chr1", "g1", "t1", Strand::Plus, 100, 200);
        b.add_exon("chr1", "g1", "t2", Strand::Plus, 100, 250);
        b.add_exon("chr1", "g1", "t2", Strand::Plus, 600, 700);
        let model = b.finish();

        assert_eq!(model.refs().len(), 1);
        let genes = &model.refs()[0].genes;
        assert_eq!(genes.len(), 2);
        assert_eq!(genes[0].id, "g1");
        assert_eq!((genes[0].lft, genes[0].rgt), (100, 700));
        assert_eq!(genes[0].transcripts.len(), 2);
        assert_eq!(genes[0].transcripts[0].exons[0], Exon { lft: 100, rgt: 200 });
        assert_eq!(genes[1].strand, Strand::Minus);

        let juncs: Vec<_> = model.junctions().map(|j| (j.lft, j.rgt, j.strand)).collect();
        assert_eq!(juncs.len(), 2);
        assert!(juncs.contains(&(200, 300, Strand::Plus)));
        assert!(juncs.contains(&(250, 600, Strand::Plus)));
    }

    #[test]
    fn load_gtf_exons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.gtf");
        let mut f = File::create(&path).unwrap();
        let rows = [
            ("gene", 1000, 3000, "+"),
            ("exon", 1000, 1149, "+"),
            ("exon", 2151, 3000, "+"),
        ];
        for (ty, start, end, strand) in rows {
            writeln!(
                f,
                "chr1\ttest\t{ty}\t{start}\t{end}\t.\t{strand}\t.\tgene_id \"G1\"; transcript_id \"T1\";"
            )
            .unwrap();
        }
        drop(f);

        let model = GeneModel::load(&path).unwrap();
        assert_eq!(model.gene_count(), 1);
        let tx = &model.refs()[0].genes[0].transcripts[0];
        assert_eq!(tx.exons.len(), 2);
        assert_eq!(tx.exons[0], Exon { lft: 999, rgt: 1148 });
        let j: Vec<_> = model.junctions().collect();
        assert_eq!(j[0].chrom, "chr1");
        assert_eq!((j[0].lft, j[0].rgt), (1148, 2150));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(detect_format(Path::new("genes.bed")).is_err());
    }
}
