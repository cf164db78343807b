//! Empirical fragment-size distribution.

use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::AddAssign;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SizeDist {
    /// Cumulative mass that defines the upper cutoff, e.g. 0.99.
    confidence: f64,
    counts: Vec<u64>,
    normed: Vec<f64>,
    count: u64,
    cutoff: usize,
    max_height: f64,
}

impl SizeDist {
    pub fn new(confidence: f64, max_size: usize) -> Self {
        Self {
            confidence,
            counts: vec![0; max_size + 1],
            normed: Vec::new(),
            count: 0,
            cutoff: 0,
            max_height: 0.0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.counts.len().saturating_sub(1)
    }

    /// Record one fragment; sizes outside `[0, max_size]` are ignored.
    pub fn add_fragment(&mut self, size: i64) {
        if size < 0 || size as usize > self.max_size() {
            return;
        }
        self.counts[size as usize] += 1;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Smallest size whose cumulative normalized mass reaches the confidence
    /// level. Every size at or above it has height 0.
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Peak normalized height below the cutoff.
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Normalized height of a fragment of `size` bases.
    pub fn height(&self, size: i64) -> f64 {
        if size < 0 || size as usize >= self.cutoff {
            return 0.0;
        }
        self.normed.get(size as usize).copied().unwrap_or(0.0)
    }

    /// Convert counts into heights summing to 1 and fix the cutoff.
    pub fn normalize(&mut self) {
        let sum: u64 = self.counts.iter().sum();
        self.normed = vec![0.0; self.counts.len()];
        self.max_height = 0.0;
        self.cutoff = 0;
        if sum == 0 {
            info!("Fragment size distribution is empty");
            return;
        }

        let mut cumulative = 0.0;
        let mut cutoff = None;
        for (i, &c) in self.counts.iter().enumerate() {
            let h = c as f64 / sum as f64;
            self.normed[i] = h;
            cumulative += h;
            if cumulative >= self.confidence {
                cutoff.get_or_insert(i);
            } else {
                self.max_height = self.max_height.max(h);
            }
        }
        self.cutoff = cutoff.unwrap_or(self.counts.len() - 1);
        info!(
            cutoff = self.cutoff,
            max_height = self.max_height,
            observations = self.count,
            "Normalized fragment size distribution"
        );
    }

    /// Write the table `size, count, cumulative count, height, cumulative
    /// height` for sizes `1..=max_size`.
    pub fn save_normed<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "size\tcount\tcumulative\tnormalized\tcumulative")?;
        let mut x = 0.0;
        let mut y = 0u64;
        for i in 1..self.counts.len() {
            let h = self.normed.get(i).copied().unwrap_or(0.0);
            x += h;
            y += self.counts[i];
            writeln!(out, "{}\t{}\t{}\t{}\t{}", i, self.counts[i], y, h, x)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        self.save_normed(BufWriter::new(file))
    }

    /// Read back a table written by [`SizeDist::save_normed`].
    pub fn load<R: BufRead>(confidence: f64, reader: R) -> Result<Self> {
        let mut dist = SizeDist::new(confidence, 0);
        let mut cutoff = None;

        for (lineno, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return Err(anyhow!("line {}: expected 5 columns", lineno + 1));
            }
            let parse_err = || anyhow!("line {}: malformed size distribution row", lineno + 1);
            let i: usize = fields[0].parse().map_err(|_| parse_err())?;
            let c: u64 = fields[1].parse().map_err(|_| parse_err())?;
            let h: f64 = fields[3].parse().map_err(|_| parse_err())?;
            let x: f64 = fields[4].parse().map_err(|_| parse_err())?;

            if dist.normed.len() <= i {
                dist.normed.resize(i + 1, 0.0);
                dist.counts.resize(i + 1, 0);
            }
            if x >= confidence {
                cutoff.get_or_insert(i);
            } else {
                dist.max_height = dist.max_height.max(h);
            }
            dist.normed[i] = h;
            dist.counts[i] = c;
            dist.count += c;
        }
        dist.cutoff = cutoff.unwrap_or(dist.normed.len().saturating_sub(1));
        info!(
            cutoff = dist.cutoff,
            max_height = dist.max_height,
            observations = dist.count,
            "Loaded fragment size distribution"
        );
        Ok(dist)
    }

    pub fn load_from_path(confidence: f64, path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::load(confidence, BufReader::new(file))
            .with_context(|| format!("failed to read {}", path.display()))
    }
}

impl AddAssign<&SizeDist> for SizeDist {
    fn add_assign(&mut self, other: &SizeDist) {
        if self.counts.len() < other.counts.len() {
            self.counts.resize(other.counts.len(), 0);
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.count += other.count;
    }
}
