//! Score discretization: monotonic lower-bound tables, per-site configuration,
//! and a quantile helper for deriving tables from observed scores.

use crate::config::ConfigError;
use crate::util::open_with_backoff;
use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufReader;
use std::path::Path;

/// Which post kind a boundary table applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PostKind {
    Questions,
    Answers,
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostKind::Questions => f.write_str("questions"),
            PostKind::Answers => f.write_str("answers"),
        }
    }
}

/// Maps a score onto an ordinal bucket given non-decreasing lower bounds `B[0..k-1]`.
///
/// `v < B[0]` lands in bucket 0; otherwise the bucket is the largest `i` with `B[i] <= v`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreBucketer {
    bounds: Vec<i64>,
}

impl ScoreBucketer {
    pub fn new(bounds: Vec<i64>) -> Result<Self, String> {
        if bounds.is_empty() {
            return Err("empty boundary list".to_string());
        }
        if let Some(w) = bounds.windows(2).find(|w| w[0] > w[1]) {
            return Err(format!("bounds must be non-decreasing ({} > {})", w[0], w[1]));
        }
        Ok(Self { bounds })
    }

    pub fn bounds(&self) -> &[i64] {
        &self.bounds
    }

    pub fn bucket(&self, value: i64) -> usize {
        // number of bounds <= value; the table is sorted so this is a partition point
        let at_or_below = self.bounds.partition_point(|b| *b <= value);
        at_or_below.saturating_sub(1)
    }
}

#[derive(Deserialize)]
struct SiteTables {
    questions: Option<Vec<i64>>,
    answers: Option<Vec<i64>>,
}

/// Per-(site, kind) bucketers. A missing entry means "no dscore attribute", not bucket 0.
#[derive(Clone, Debug, Default)]
pub struct BoundaryTables {
    tables: AHashMap<(String, PostKind), ScoreBucketer>,
}

impl BoundaryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, site: impl AsRef<str>, kind: PostKind, bounds: Vec<i64>) -> Result<(), ConfigError> {
        let site = normalize_site(site.as_ref());
        let bucketer = ScoreBucketer::new(bounds).map_err(|reason| ConfigError::InvalidBoundaryTable {
            site: site.clone(),
            kind,
            reason,
        })?;
        self.tables.insert((site, kind), bucketer);
        Ok(())
    }

    /// Builder-style variant of `insert`.
    pub fn with(mut self, site: impl AsRef<str>, kind: PostKind, bounds: Vec<i64>) -> Result<Self, ConfigError> {
        self.insert(site, kind, bounds)?;
        Ok(self)
    }

    pub fn get(&self, site: &str, kind: PostKind) -> Option<&ScoreBucketer> {
        self.tables.get(&(normalize_site(site), kind))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load `{ "<site>": { "questions": [..], "answers": [..] } }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let f = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        let raw: BTreeMap<String, SiteTables> = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse boundary tables {}", path.display()))?;
        let mut out = Self::new();
        for (site, t) in raw {
            if let Some(q) = t.questions {
                out.insert(&site, PostKind::Questions, q)?;
            }
            if let Some(a) = t.answers {
                out.insert(&site, PostKind::Answers, a)?;
            }
        }
        Ok(out)
    }
}

fn normalize_site(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Lower bounds at the `k/buckets` quantiles (k = 0..=buckets) of the strictly positive scores.
/// Returns an empty vector when no positive score was observed.
pub fn quantile_bounds(scores: &[i64], buckets: usize) -> Vec<i64> {
    let mut positive: Vec<i64> = scores.iter().copied().filter(|s| *s > 0).collect();
    if positive.is_empty() || buckets == 0 {
        return Vec::new();
    }
    positive.sort_unstable();
    let last = positive.len() - 1;
    (0..=buckets)
        .map(|k| positive[last * k / buckets])
        .collect()
}
