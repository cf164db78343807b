use crate::types::{HashMap, HashMapExt, RefId};
use anyhow::{Result, anyhow};
use needletail::parse_fastx_file;
use std::path::Path;
use tracing::info;

/// Reference base lookup by genome alignment reference id.
pub trait ReferenceSource: Sync {
    fn sequence(&self, tid: RefId) -> Option<&[u8]>;

    /// Base at a 0-based position; `N` past the end or for unknown references.
    fn base(&self, tid: RefId, pos: usize) -> u8 {
        self.sequence(tid)
            .and_then(|s| s.get(pos).copied())
            .unwrap_or(b'N')
    }
}

/// Genome sequences indexed by the reference ids of the genome alignments.
#[derive(Debug, Default)]
pub struct GenomeDb {
    seqs: Vec<Vec<u8>>,
}

impl GenomeDb {
    /// Load a FASTA file and order its records by `ref_names`, the reference
    /// names of the genome alignment header.
    pub fn load<I, S>(path: &Path, ref_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut reader = parse_fastx_file(path)
            .map_err(|e| anyhow!("failed to open FASTA {}: {}", path.display(), e))?;
        let mut by_name: HashMap<String, Vec<u8>> = HashMap::new();

        while let Some(result) = reader.next() {
            let record = result.map_err(|e| anyhow!("failed to parse FASTA record: {}", e))?;
            // the id runs up to the first whitespace
            let id = record.id();
            let end = id
                .iter()
                .position(|b| b.is_ascii_whitespace())
                .unwrap_or(id.len());
            let name = String::from_utf8_lossy(&id[..end]).into_owned();
            let mut seq = record.seq().to_vec();
            seq.make_ascii_uppercase();
            by_name.insert(name, seq);
        }

        let mut seqs = Vec::new();
        for name in ref_names {
            let name = name.as_ref();
            let seq = by_name
                .remove(name)
                .ok_or_else(|| anyhow!("reference {name} is missing from {}", path.display()))?;
            seqs.push(seq);
        }
        info!(path = %path.display(), references = seqs.len(), "Loaded genome");
        Ok(Self { seqs })
    }

    pub fn from_sequences(seqs: Vec<Vec<u8>>) -> Self {
        Self { seqs }
    }
}

impl ReferenceSource for GenomeDb {
    fn sequence(&self, tid: RefId) -> Option<&[u8]> {
        self.seqs.get(tid).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_orders_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.fa");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, ">chr2 second\nacgt\n>chr1\nGGGG\nCC").unwrap();
        drop(f);

        let db = GenomeDb::load(&path, ["chr1", "chr2"]).unwrap();
        assert_eq!(db.sequence(0), Some(&b"GGGGCC"[..]));
        assert_eq!(db.sequence(1), Some(&b"ACGT"[..]));
        assert_eq!(db.base(1, 3), b'T');
        assert_eq!(db.base(1, 4), b'N');
        assert_eq!(db.base(7, 0), b'N');

        assert!(GenomeDb::load(&path, ["chr3"]).is_err());
    }
}
