use crate::assembler::{SiteReport, ThreadAssembler};
use crate::bucket::{quantile_bounds, BoundaryTables, PostKind};
use crate::comments::CommentIndex;
use crate::concurrency::for_each_site_limited;
use crate::config::{InputFormat, OutFormat, PairerOptions};
use crate::paths::{discover_sites, SitePaths};
use crate::progress::{set_global_multiprogress, ProgressScope};
use crate::record::{classify, RecordKind, RowSchema};
use crate::rows::for_each_row;
use crate::serialize::DocumentSerializer;
use crate::shard::{ShardAssignment, ShardPlanner};
use crate::sink::{DocumentSink, JsonlZstSink, NullSink, TxtDirSink};
use crate::tokenize::Tokenizer;
use crate::util::{create_with_backoff, init_tracing_once};
use ahash::AHashSet;
use anyhow::{Context, Result};
use indicatif::MultiProgress;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pipeline handle: options plus the optional tokenizer used for token statistics.
#[derive(Clone)]
pub struct QaPairer {
    pub(crate) opts: PairerOptions,
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

/// Outcome of a multi-site run. One failing site never stops the others.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<SiteReport>,
    pub failed: Vec<(String, anyhow::Error)>,
}

/// Suggested boundary tables for one site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScoreQuantiles {
    pub questions: Vec<i64>,
    pub answers: Vec<i64>,
}

impl Default for QaPairer {
    fn default() -> Self {
        Self::new()
    }
}

impl QaPairer {
    pub fn new() -> Self {
        Self { opts: PairerOptions::default(), tokenizer: None }
    }

    pub fn from_options(opts: PairerOptions) -> Self {
        Self { opts, tokenizer: None }
    }

    pub fn options(&self) -> &PairerOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn dumps_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_dumps_dir(dir); self }
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn min_score(mut self, score: i64) -> Self { self.opts = self.opts.with_min_score(score); self }
    pub fn max_responses(mut self, n: usize) -> Self { self.opts = self.opts.with_max_responses(n); self }
    pub fn max_comments(mut self, n: usize) -> Self { self.opts = self.opts.with_max_comments(n); self }
    pub fn attribute_move_probability(mut self, p: f64) -> Self { self.opts = self.opts.with_attribute_move_probability(p); self }
    pub fn seed(mut self, seed: u64) -> Self { self.opts = self.opts.with_seed(seed); self }
    pub fn boundary_tables(mut self, tables: BoundaryTables) -> Self { self.opts = self.opts.with_boundary_tables(tables); self }
    pub fn require_dscore(mut self, yes: bool) -> Self { self.opts = self.opts.with_require_dscore(yes); self }
    pub fn in_format(mut self, fmt: InputFormat) -> Self { self.opts = self.opts.with_in_format(fmt); self }
    pub fn out_format(mut self, fmt: OutFormat) -> Self { self.opts = self.opts.with_out_format(fmt); self }
    pub fn shards(mut self, count: usize, index: usize) -> Self { self.opts = self.opts.with_shards(count, index); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn site_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_site_concurrency(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn status_every(mut self, n: u64) -> Self { self.opts = self.opts.with_status_every(n); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }
    pub fn tokenizer(mut self, t: Arc<dyn Tokenizer>) -> Self { self.tokenizer = Some(t); self }

    fn apply_parallelism(&self) {
        if let Some(n) = self.opts.parallelism {
            if n > 0 {
                rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok();
            }
        }
    }

    fn label(&self, site: &str, pass: &str) -> String {
        match self.opts.progress_label.as_deref() {
            Some(l) => format!("{l} {site}: {pass}"),
            None => format!("{site}: {pass}"),
        }
    }

    fn build_comment_index(&self, paths: &SitePaths) -> Result<CommentIndex> {
        if self.opts.max_comments == 0 {
            return Ok(CommentIndex::empty());
        }
        let Some(path) = paths.comments.as_deref() else {
            tracing::warn!(site = %paths.site, "no comments dump found; documents will carry no comments");
            return Ok(CommentIndex::empty());
        };
        let pb = ProgressScope::for_file(self.opts.progress, self.label(&paths.site, "comments"), path);
        let index = CommentIndex::from_dump(path, self.opts.in_format, self.opts.read_buffer_bytes, Some(&pb))
            .with_context(|| format!("index comments for {}", paths.site))?;
        pb.finish(format!("{}: {} comments on {} posts", paths.site, index.comments(), index.posts()));
        tracing::info!(site = %paths.site, comments = index.comments(), posts = index.posts(), "comment index built");
        Ok(index)
    }

    /// Pre-pass over the posts dump recording question ids in stream order.
    fn plan_shard(&self, paths: &SitePaths) -> Result<Option<ShardAssignment>> {
        let Some(spec) = self.opts.shards else { return Ok(None) };
        let pb = ProgressScope::for_file(self.opts.progress, self.label(&paths.site, "shard pre-pass"), &paths.posts);
        let mut planner = ShardPlanner::new();
        for_each_row(
            &paths.posts,
            self.opts.in_format,
            RowSchema::Posts,
            self.opts.read_buffer_bytes,
            |delta| pb.inc_bytes(delta),
            |row| {
                if let Ok(rec) = classify(&row) {
                    if rec.kind == RecordKind::Question {
                        planner.observe(rec.id);
                    }
                }
                Ok(())
            },
        )?;
        pb.finish(format!("{}: {} questions", paths.site, planner.len()));
        planner.assign(spec).map(Some)
    }

    fn open_sink(&self, site: &str, stem: &str) -> Result<Box<dyn DocumentSink>> {
        let out = &self.opts.out_dir;
        let buf = self.opts.write_buffer_bytes;
        Ok(match self.opts.out_format {
            OutFormat::Txt => {
                let dir = out.join(stem);
                Box::new(TxtDirSink::create(&dir, buf).with_context(|| format!("create {}", dir.display()))?)
            }
            OutFormat::JsonlZst => Box::new(
                JsonlZstSink::create(out, stem, buf).with_context(|| format!("open archive for {site}"))?,
            ),
            OutFormat::None => Box::new(NullSink),
        })
    }

    fn write_stats(&self, stem: &str, report: &SiteReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.opts.out_dir)?;
        let path = self.opts.out_dir.join(format!("{stem}_stats.json"));
        let f = create_with_backoff(&path, 16, 50).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, report)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(path)
    }

    /// Run one site end to end: comment index, optional shard pre-pass, main pass, stats.
    pub fn process_site(&self, site: &str) -> Result<SiteReport> {
        init_tracing_once();
        self.apply_parallelism();
        self.opts.validate(site)?;

        let paths = SitePaths::locate(&self.opts.dumps_dir, site, self.opts.in_format)?;
        let serializer = DocumentSerializer::new(
            self.opts.max_responses,
            self.opts.max_comments,
            self.opts.attribute_move_probability,
        )
        .with_site_tables(&self.opts.boundary_tables, site);
        if self.opts.boundary_tables.get(site, PostKind::Questions).is_none() {
            tracing::debug!(site, "no boundary tables; documents carry no dscore");
        }

        let comments = self.build_comment_index(&paths)?;
        let shard = self.plan_shard(&paths)?;
        let stem = match self.opts.shards {
            Some(spec) => format!("{site}{}", spec.suffix()),
            None => site.to_string(),
        };
        let sink = self.open_sink(site, &stem)?;

        let seed = self.opts.seed.unwrap_or_else(rand::random);
        tracing::info!(site, seed, posts = %paths.posts.display(), "pairing questions and answers");

        let mut assembler = ThreadAssembler::new(site, serializer, sink)
            .min_score(self.opts.min_score)
            .comments(Arc::new(comments))
            .tokenizer(self.tokenizer.clone())
            .shard(shard)
            .seed(seed)
            .status_every(self.opts.status_every);

        let pb = ProgressScope::for_file(self.opts.progress, self.label(site, "posts"), &paths.posts);
        for_each_row(
            &paths.posts,
            self.opts.in_format,
            RowSchema::Posts,
            self.opts.read_buffer_bytes,
            |delta| pb.inc_bytes(delta),
            |row| {
                assembler.process(&row);
                Ok(())
            },
        )?;
        pb.finish(format!("{site}: {} documents", assembler.stats().questions));

        let (report, _sink) = assembler.finish()?;
        let stats_path = self.write_stats(&stem, &report)?;
        tracing::info!(site, stats = %stats_path.display(), "site done");
        Ok(report)
    }

    /// Run several sites, at most `site_concurrency` at once. `"all"` expands to every
    /// site found under `dumps_dir`.
    pub fn process_sites<I, S>(&self, sites: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        init_tracing_once();
        self.apply_parallelism();

        let mut names: Vec<String> = Vec::new();
        for s in sites {
            let s = s.as_ref().trim();
            if s.eq_ignore_ascii_case("all") {
                names.extend(discover_sites(&self.opts.dumps_dir, self.opts.in_format));
            } else if !s.is_empty() {
                names.push(s.to_string());
            }
        }
        let mut seen = AHashSet::new();
        names.retain(|n| seen.insert(n.clone()));
        if names.is_empty() {
            tracing::warn!(dumps = %self.opts.dumps_dir.display(), "no sites to process");
            return BatchReport::default();
        }
        tracing::info!(sites = names.len(), concurrency = self.opts.site_concurrency, "processing sites");

        if self.opts.progress && self.opts.site_concurrency > 1 {
            set_global_multiprogress(Arc::new(MultiProgress::new()));
        }

        let collected = Mutex::new(BatchReport::default());
        for_each_site_limited(&names, self.opts.site_concurrency, |site| {
            match self.process_site(site) {
                Ok(report) => collected.lock().completed.push(report),
                Err(e) => {
                    tracing::error!(site, error = %format!("{e:#}"), "site failed");
                    collected.lock().failed.push((site.to_string(), e));
                }
            }
        });

        let mut batch = collected.into_inner();
        let order = |s: &str| names.iter().position(|n| n == s).unwrap_or(usize::MAX);
        batch.completed.sort_by_key(|r| order(&r.site));
        batch
    }

    /// Scan a site's posts and suggest `buckets + 1` lower bounds per post kind.
    pub fn score_quantiles(&self, site: &str, buckets: usize) -> Result<ScoreQuantiles> {
        init_tracing_once();
        let paths = SitePaths::locate(&self.opts.dumps_dir, site, self.opts.in_format)?;
        let pb = ProgressScope::for_file(self.opts.progress, self.label(site, "score quantiles"), &paths.posts);
        let (mut questions, mut answers) = (Vec::new(), Vec::new());
        for_each_row(
            &paths.posts,
            self.opts.in_format,
            RowSchema::Posts,
            self.opts.read_buffer_bytes,
            |delta| pb.inc_bytes(delta),
            |row| {
                if let Ok(rec) = classify(&row) {
                    match (rec.kind, rec.score) {
                        (RecordKind::Question, Some(s)) => questions.push(s),
                        (RecordKind::Answer, Some(s)) => answers.push(s),
                        _ => {}
                    }
                }
                Ok(())
            },
        )?;
        pb.finish(format!("{site}: {} questions, {} answers", questions.len(), answers.len()));
        Ok(ScoreQuantiles {
            questions: quantile_bounds(&questions, buckets),
            answers: quantile_bounds(&answers, buckets),
        })
    }
}
