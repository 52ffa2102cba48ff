use crate::bucket::{BoundaryTables, PostKind};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// On-disk encoding of the dump files (`Posts.*`, `Comments.*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Xml,
    Csv,
}

impl InputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            InputFormat::Xml => "xml",
            InputFormat::Csv => "csv",
        }
    }
}

impl FromStr for InputFormat {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xml" => Ok(InputFormat::Xml),
            "csv" => Ok(InputFormat::Csv),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Where rendered documents go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutFormat {
    /// One `.txt` file per document.
    Txt,
    /// One zstd-compressed JSONL archive per site (and shard).
    JsonlZst,
    /// Render and count, but write nothing.
    None,
}

impl FromStr for OutFormat {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "txt" => Ok(OutFormat::Txt),
            "jsonl_zst" | "jsonl.zst" | "lm_dataformat" => Ok(OutFormat::JsonlZst),
            "none" => Ok(OutFormat::None),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Worker partition: this run owns slice `index` of `count` contiguous question-id slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShardSpec {
    pub count: usize,
    pub index: usize,
}

impl ShardSpec {
    /// File-name suffix distinguishing shard outputs, e.g. `_2`.
    pub fn suffix(&self) -> String {
        format!("_{}", self.index)
    }
}

/// Fatal startup problems. Never raised once a stream is being consumed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown format: {0:?}")]
    UnknownFormat(String),
    #[error("invalid shard spec: index {index} with {count} shard(s)")]
    InvalidShard { index: usize, count: usize },
    #[error("attribute_move_probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),
    #[error("boundary table for {site}/{kind} is required but not configured")]
    MissingBoundaryTable { site: String, kind: PostKind },
    #[error("boundary table for {site}/{kind} is invalid: {reason}")]
    InvalidBoundaryTable { site: String, kind: PostKind, reason: String },
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct PairerOptions {
    pub dumps_dir: PathBuf,
    pub out_dir: PathBuf,

    // inclusion / rendering policy
    pub min_score: i64,
    pub max_responses: usize,
    pub max_comments: usize,
    pub attribute_move_probability: f64,
    pub seed: Option<u64>,            // None: fresh base seed per run
    pub boundary_tables: BoundaryTables,
    pub require_dscore: bool,         // fail at startup if a site lacks tables

    pub in_format: InputFormat,
    pub out_format: OutFormat,
    pub shards: Option<ShardSpec>,

    pub parallelism: Option<usize>,   // Some(N) to set rayon threads, None to use default
    pub site_concurrency: usize,      // limit number of sites processed concurrently
    pub progress: bool,
    pub progress_label: Option<String>,
    pub status_every: u64,            // log a status line every N rendered questions

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for PairerOptions {
    fn default() -> Self {
        Self {
            dumps_dir: PathBuf::from("dumps"),
            out_dir: PathBuf::from("out"),
            min_score: 3,
            max_responses: 3,
            max_comments: 5,
            attribute_move_probability: 0.5,
            seed: None,
            boundary_tables: BoundaryTables::default(),
            require_dscore: false,
            in_format: InputFormat::Xml,
            out_format: OutFormat::JsonlZst,
            shards: None,
            parallelism: None,
            site_concurrency: 1,
            progress: true,
            progress_label: None,
            status_every: 100_000,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl PairerOptions {
    pub fn with_dumps_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dumps_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_min_score(mut self, score: i64) -> Self {
        self.min_score = score;
        self
    }
    pub fn with_max_responses(mut self, n: usize) -> Self {
        self.max_responses = n;
        self
    }
    pub fn with_max_comments(mut self, n: usize) -> Self {
        self.max_comments = n;
        self
    }
    pub fn with_attribute_move_probability(mut self, p: f64) -> Self {
        self.attribute_move_probability = p;
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn with_boundary_tables(mut self, tables: BoundaryTables) -> Self {
        self.boundary_tables = tables;
        self
    }
    pub fn with_require_dscore(mut self, yes: bool) -> Self {
        self.require_dscore = yes;
        self
    }
    pub fn with_in_format(mut self, fmt: InputFormat) -> Self {
        self.in_format = fmt;
        self
    }
    pub fn with_out_format(mut self, fmt: OutFormat) -> Self {
        self.out_format = fmt;
        self
    }
    pub fn with_shards(mut self, count: usize, index: usize) -> Self {
        self.shards = Some(ShardSpec { count, index });
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_site_concurrency(mut self, n: usize) -> Self {
        self.site_concurrency = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_status_every(mut self, n: u64) -> Self {
        self.status_every = n;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// Startup validation for one site. Everything here is fatal; nothing is checked mid-stream.
    pub fn validate(&self, site: &str) -> Result<(), ConfigError> {
        if let Some(spec) = self.shards {
            if spec.count == 0 || spec.index >= spec.count {
                return Err(ConfigError::InvalidShard { index: spec.index, count: spec.count });
            }
        }
        let p = self.attribute_move_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidProbability(p));
        }
        if self.require_dscore {
            for kind in [PostKind::Questions, PostKind::Answers] {
                if self.boundary_tables.get(site, kind).is_none() {
                    return Err(ConfigError::MissingBoundaryTable { site: site.to_string(), kind });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}
