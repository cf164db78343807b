//! Junction-fragment database.
//!
//! Each line describes one fragment: a run of exonic blocks concatenated into
//! a synthetic sequence that reads were aligned against.
//!
//! ```text
//! id <TAB> chrom <TAB> strand <TAB> block_count <TAB> lft,lft,... <TAB> rgt,rgt,...
//! ```
//!
//! Genome coordinates are 0-based inclusive.

use crate::types::{HashMap, HashMapExt, Pos, Strand};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// One exonic block: genome range and its range inside the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentBlock {
    pub lft: Pos,
    pub rgt: Pos,
    pub r_lft: Pos,
    pub r_rgt: Pos,
}

impl FragmentBlock {
    /// True if fragment-relative `pos` falls in this block.
    pub fn contains(&self, pos: Pos) -> bool {
        pos >= self.r_lft && pos <= self.r_rgt
    }

    pub fn length(&self) -> u32 {
        self.rgt - self.lft + 1
    }
}

#[derive(Debug, Clone)]
pub struct FragmentSet {
    pub id: u32,
    pub chrom: String,
    pub strand: Strand,
    pub blocks: Vec<FragmentBlock>,
}

impl FragmentSet {
    pub fn new(id: u32, chrom: impl Into<String>, strand: Strand) -> Self {
        Self {
            id,
            chrom: chrom.into(),
            strand,
            blocks: Vec::new(),
        }
    }

    /// Append the next genome block; its fragment-relative range follows
    /// the previous block.
    pub fn add_block(&mut self, lft: Pos, rgt: Pos) {
        let r_lft = self.blocks.last().map_or(0, |b| b.r_rgt + 1);
        let len = rgt - lft + 1;
        self.blocks.push(FragmentBlock {
            lft,
            rgt,
            r_lft,
            r_rgt: r_lft + len - 1,
        });
    }

    pub fn lft(&self) -> Pos {
        self.blocks.iter().map(|b| b.lft).min().unwrap_or(0)
    }

    pub fn rgt(&self) -> Pos {
        self.blocks.iter().map(|b| b.rgt).max().unwrap_or(0)
    }

    /// Length of the concatenated fragment sequence.
    pub fn length(&self) -> u32 {
        self.blocks.last().map_or(0, |b| b.r_rgt + 1)
    }

    /// Introns between consecutive blocks as (donor, acceptor) positions:
    /// the last base of one block and the first base of the next.
    pub fn junctions(&self) -> impl Iterator<Item = (Pos, Pos)> + '_ {
        self.blocks.windows(2).map(|w| (w[0].rgt, w[1].lft))
    }
}

#[derive(Debug, Default)]
pub struct FragmentMap {
    sets: Vec<FragmentSet>,
    by_id: HashMap<u32, usize>,
}

impl FragmentMap {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open fragment database {}", path.display()))?;
        let map = Self::from_reader(BufReader::new(file))?;
        info!(path = %path.display(), fragments = map.len(), "Loaded fragment database");
        Ok(map)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut map = FragmentMap {
            sets: Vec::new(),
            by_id: HashMap::new(),
        };
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(set) = parse_line(&line, lineno + 1) {
                map.insert(set);
            }
        }
        Ok(map)
    }

    pub fn insert(&mut self, set: FragmentSet) {
        if let Some(&idx) = self.by_id.get(&set.id) {
            warn!(id = set.id, "Duplicate fragment id, keeping the last definition");
            self.sets[idx] = set;
        } else {
            self.by_id.insert(set.id, self.sets.len());
            self.sets.push(set);
        }
    }

    pub fn get(&self, id: u32) -> Option<&FragmentSet> {
        self.by_id.get(&id).map(|&idx| &self.sets[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FragmentSet> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn parse_line(line: &str, lineno: usize) -> Option<FragmentSet> {
    let fields: Vec<&str> = line.trim_end().split('\t').collect();
    if fields.len() != 6 {
        debug!(line = lineno, fields = fields.len(), "Skipping fragment line");
        return None;
    }

    let Ok(id) = fields[0].parse::<u32>() else {
        warn!(line = lineno, id = fields[0], "Invalid fragment id");
        return None;
    };
    let strand = Strand::from_char(fields[2].bytes().next().unwrap_or(b'.'));
    let mut set = FragmentSet::new(id, fields[1], strand);

    let lfts = fields[4].split(',').filter(|s| !s.is_empty());
    let rgts = fields[5].split(',').filter(|s| !s.is_empty());
    for (l, r) in lfts.zip(rgts) {
        match (l.parse::<Pos>(), r.parse::<Pos>()) {
            (Ok(lft), Ok(rgt)) if lft <= rgt => set.add_block(lft, rgt),
            _ => warn!(line = lineno, lft = l, rgt = r, "Invalid fragment block"),
        }
    }

    let expected = fields[3].parse::<usize>().ok();
    if expected != Some(set.blocks.len()) {
        warn!(
            line = lineno,
            id,
            expected = fields[3],
            found = set.blocks.len(),
            "Fragment block count mismatch"
        );
    }
    Some(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_coordinates_follow_blocks() {
        let mut set = FragmentSet::new(7, "chr1", Strand::Plus);
        set.add_block(100, 199);
        set.add_block(1200, 1249);
        assert_eq!(set.blocks[0].r_lft, 0);
        assert_eq!(set.blocks[0].r_rgt, 99);
        assert_eq!(set.blocks[1].r_lft, 100);
        assert_eq!(set.blocks[1].r_rgt, 149);
        assert_eq!(set.length(), 150);
        assert_eq!(set.lft(), 100);
        assert_eq!(set.rgt(), 1249);
        assert_eq!(set.junctions().collect::<Vec<_>>(), vec![(199, 1200)]);
    }

    #[test]
    fn parse_database() {
        let text = "0\tchr1\t+\t2\t100,1200\t199,1249\n\
                    1\tchr2\t-\t3\t10,50,90\t19,59,99\n\
                    bad line\n\
                    x\tchr1\t+\t1\t1\t2\n\
                    2\tchr1\t.\t3\t5,40\t9,49\n";
        let map = FragmentMap::from_reader(text.as_bytes()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(1).unwrap().strand, Strand::Minus);
        assert_eq!(map.get(1).unwrap().blocks.len(), 3);
        // count mismatch is kept best-effort
        assert_eq!(map.get(2).unwrap().blocks.len(), 2);
        assert_eq!(map.get(2).unwrap().strand, Strand::Both);
        assert!(map.get(9).is_none());
    }
}
