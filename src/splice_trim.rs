//! Clip alignment ends that run a few bases past a known splice site.

use crate::record::Alignment;
use crate::types::{HashMap, HashMapExt, Pos, RefId};

#[derive(Debug, Default)]
struct SpliceSites {
    /// Donors: last exonic base before an intron.
    lfts: Vec<Pos>,
    /// Acceptors: first exonic base after an intron.
    rgts: Vec<Pos>,
}

#[derive(Debug)]
pub struct SpliceTrimmer {
    min_dist: u32,
    refs: HashMap<RefId, SpliceSites>,
}

impl SpliceTrimmer {
    pub fn new(min_dist: u32) -> Self {
        Self {
            min_dist,
            refs: HashMap::new(),
        }
    }

    pub fn add_junction(&mut self, tid: RefId, lft: Pos, rgt: Pos) {
        let sites = self.refs.entry(tid).or_default();
        sites.lfts.push(lft);
        sites.rgts.push(rgt);
    }

    /// Sort and de-duplicate the sites. Call once after the last
    /// `add_junction`.
    pub fn merge(&mut self) {
        for sites in self.refs.values_mut() {
            sites.lfts.sort_unstable();
            sites.lfts.dedup();
            sites.rgts.sort_unstable();
            sites.rgts.dedup();
        }
    }

    /// Bases to clip from the front and the back of `r`.
    ///
    /// The front is clipped up to the farthest acceptor within `min_dist` of
    /// the start, the back back to the farthest donor within `min_dist` of
    /// the end.
    pub fn clip_amounts(&self, r: &Alignment) -> (u32, u32) {
        let Some(sites) = r.tid.and_then(|tid| self.refs.get(&tid)) else {
            return (0, 0);
        };
        let rgt = r.rgt() as i64;
        let front = self.count_bases(r.lft as i64, &sites.rgts);
        let back_start = rgt - self.min_dist as i64 - 1;
        let back = match self.count_bases(back_start, &sites.lfts) {
            0 => 0,
            n => self.min_dist - n + 1,
        };
        (front, back)
    }

    /// Clip `r` in place; returns whether any bases were clipped.
    pub fn trim(&self, r: &mut Alignment) -> bool {
        let (front, back) = self.clip_amounts(r);
        if front > 0 {
            r.clip_front(front);
        }
        if back > 0 {
            r.clip_back(back);
        }
        front > 0 || back > 0
    }

    fn count_bases(&self, p: i64, sites: &[Pos]) -> u32 {
        let min_dist = self.min_dist as i64;
        let start = sites.partition_point(|&s| (s as i64) < p);
        let in_range = sites[start..]
            .iter()
            .take_while(|&&s| s as i64 - p <= min_dist)
            .last();
        in_range.map_or(0, |&s| (s as i64 - p) as u32)
    }
}
