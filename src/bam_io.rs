//! Name-sorted BAM input grouped by read, and BAM output.

use crate::record::Alignment;
use anyhow::{Context, Result};
use noodles::{bam, sam};
use sam::alignment::RecordBuf;
use sam::alignment::io::Write as _;
use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;

/// All alignments of one read name: genome and fragment hits of each mate.
#[derive(Debug, Default)]
pub struct InputPair {
    pub ref1: Vec<Alignment>,
    pub tx1: Vec<Alignment>,
    pub ref2: Vec<Alignment>,
    pub tx2: Vec<Alignment>,
}

impl InputPair {
    pub fn is_empty(&self) -> bool {
        self.ref1.is_empty() && self.tx1.is_empty() && self.ref2.is_empty() && self.tx2.is_empty()
    }
}

/// Compare read names treating digit runs as numbers, the way `samtools
/// sort -n` orders them.
pub fn natural_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            while i < a.len() && a[i] == b'0' {
                i += 1;
            }
            while j < b.len() && b[j] == b'0' {
                j += 1;
            }
            let (si, sj) = (i, j);
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let ord = (i - si)
                .cmp(&(j - sj))
                .then_with(|| a[si..i].cmp(&b[sj..j]));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            if a[i] != b[j] {
                return a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

pub fn reference_names(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect()
}

/// One BAM stream read a name group at a time.
pub struct GroupedReader {
    reader: bam::io::Reader<noodles::bgzf::io::Reader<File>>,
    header: sam::Header,
    buf: RecordBuf,
    next: Option<Alignment>,
}

impl GroupedReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = bam::io::reader::Builder
            .build_from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let header = reader
            .read_header()
            .with_context(|| format!("failed to read header of {}", path.display()))?;
        let mut grouped = Self {
            reader,
            header,
            buf: RecordBuf::default(),
            next: None,
        };
        grouped.advance()?;
        Ok(grouped)
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    fn advance(&mut self) -> Result<()> {
        self.next = match self.reader.read_record_buf(&self.header, &mut self.buf)? {
            0 => None,
            _ => Some(Alignment::from_record_buf(&self.buf)),
        };
        Ok(())
    }

    pub fn next_name(&self) -> Option<&[u8]> {
        self.next.as_ref().map(|r| r.name.as_slice())
    }

    /// Move every record named `name` into `out`.
    pub fn take_group(&mut self, name: &[u8], out: &mut Vec<Alignment>) -> Result<()> {
        while self.next_name() == Some(name) {
            if let Some(r) = self.next.take() {
                out.push(r);
            }
            self.advance()?;
        }
        Ok(())
    }
}

/// Joins the four name-sorted inputs (genome and fragment alignments of
/// each mate) read by read. Names missing from some streams yield empty
/// groups there.
pub struct PairedReader {
    ref1: GroupedReader,
    tx1: GroupedReader,
    ref2: GroupedReader,
    tx2: GroupedReader,
}

impl PairedReader {
    pub fn open(ref1: &Path, tx1: &Path, ref2: &Path, tx2: &Path) -> Result<Self> {
        Ok(Self {
            ref1: GroupedReader::open(ref1)?,
            tx1: GroupedReader::open(tx1)?,
            ref2: GroupedReader::open(ref2)?,
            tx2: GroupedReader::open(tx2)?,
        })
    }

    /// Header of the mate-1 genome alignments.
    pub fn genome_header(&self) -> &sam::Header {
        self.ref1.header()
    }

    /// Header of the mate-1 fragment alignments.
    pub fn fragment_header(&self) -> &sam::Header {
        self.tx1.header()
    }

    fn readers(&self) -> [&GroupedReader; 4] {
        [&self.ref1, &self.tx1, &self.ref2, &self.tx2]
    }

    pub fn next_pair(&mut self) -> Result<Option<InputPair>> {
        let Some(name) = self
            .readers()
            .into_iter()
            .filter_map(GroupedReader::next_name)
            .min_by(|a, b| natural_cmp(a, b))
            .map(<[u8]>::to_vec)
        else {
            return Ok(None);
        };

        let mut pair = InputPair::default();
        self.ref1.take_group(&name, &mut pair.ref1)?;
        self.tx1.take_group(&name, &mut pair.tx1)?;
        self.ref2.take_group(&name, &mut pair.ref2)?;
        self.tx2.take_group(&name, &mut pair.tx2)?;
        Ok(Some(pair))
    }

    /// Read up to `n` input pairs into `batch`; returns how many were read.
    pub fn load_batch(&mut self, n: usize, batch: &mut Vec<InputPair>) -> Result<usize> {
        batch.clear();
        while batch.len() < n {
            match self.next_pair()? {
                Some(pair) => batch.push(pair),
                None => break,
            }
        }
        Ok(batch.len())
    }
}

pub struct BamOutput {
    writer: bam::io::Writer<noodles::bgzf::io::Writer<File>>,
    header: sam::Header,
}

impl BamOutput {
    pub fn create(path: &Path, header: sam::Header) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = bam::io::Writer::new(file);
        writer.write_header(&header)?;
        Ok(Self { writer, header })
    }

    pub fn write(&mut self, records: &[Alignment]) -> Result<()> {
        for r in records {
            let record = r.to_record_buf()?;
            self.writer.write_alignment_record(&self.header, &record)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.try_finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order() {
        assert_eq!(natural_cmp(b"read2", b"read10"), Ordering::Less);
        assert_eq!(natural_cmp(b"read10", b"read10"), Ordering::Equal);
        assert_eq!(natural_cmp(b"read010", b"read10"), Ordering::Equal);
        assert_eq!(natural_cmp(b"a", b"b"), Ordering::Less);
        assert_eq!(natural_cmp(b"read1", b"read1a"), Ordering::Less);
        assert_eq!(natural_cmp(b"r9:5", b"r9:40"), Ordering::Less);
    }
}
