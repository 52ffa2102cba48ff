//! Parent-post-id → comment texts, built in one full pass before the main pass and
//! read-only afterwards.

use crate::config::InputFormat;
use crate::html::HtmlTextExtractor;
use crate::progress::ProgressScope;
use crate::record::{classify, Record, RecordKind, RowSchema};
use crate::rows::for_each_row;
use crate::util::strip_mentions;
use ahash::AHashMap;
use anyhow::Result;
use std::path::Path;

/// Accumulates comments in arrival order. Call `build()` to freeze.
pub struct CommentIndexBuilder {
    by_post: AHashMap<u64, Vec<String>>,
    extractor: HtmlTextExtractor,
    comments: u64,
    skipped: u64,
}

impl Default for CommentIndexBuilder {
    fn default() -> Self {
        Self {
            by_post: AHashMap::new(),
            extractor: HtmlTextExtractor::plain(),
            comments: 0,
            skipped: 0,
        }
    }
}

impl CommentIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comment markup → plain text without mentions. `None` if nothing is left.
    pub fn clean(&self, markup: &str) -> Option<String> {
        let text = strip_mentions(&self.extractor.text(markup));
        let text = text.trim();
        if text.is_empty() { None } else { Some(text.to_string()) }
    }

    /// Append an already-cleaned comment text under `post_id`.
    pub fn push(&mut self, post_id: u64, text: impl Into<String>) {
        self.by_post.entry(post_id).or_default().push(text.into());
        self.comments += 1;
    }

    /// Add a classified comment record. Non-comments and empty comments are ignored.
    pub fn add_record(&mut self, rec: &Record) {
        if rec.kind != RecordKind::Comment {
            return;
        }
        let (Some(post_id), Some(body)) = (rec.parent_id, rec.body.as_deref()) else {
            self.skipped += 1;
            return;
        };
        match self.clean(body) {
            Some(text) => self.push(post_id, text),
            None => self.skipped += 1,
        }
    }

    pub fn build(self) -> CommentIndex {
        tracing::debug!(
            posts = self.by_post.len(),
            comments = self.comments,
            skipped = self.skipped,
            "comment index frozen"
        );
        CommentIndex { by_post: self.by_post, comments: self.comments }
    }
}

/// Frozen comment index.
#[derive(Debug, Default)]
pub struct CommentIndex {
    by_post: AHashMap<u64, Vec<String>>,
    comments: u64,
}

impl CommentIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Comments of `post_id` in arrival order, or `None` if it has none.
    pub fn get(&self, post_id: u64) -> Option<&[String]> {
        self.by_post.get(&post_id).map(Vec::as_slice)
    }

    /// The first `limit` comments of `post_id` (possibly empty).
    pub fn first(&self, post_id: u64, limit: usize) -> &[String] {
        match self.get(post_id) {
            Some(all) => &all[..all.len().min(limit)],
            None => &[],
        }
    }

    pub fn posts(&self) -> usize {
        self.by_post.len()
    }

    pub fn comments(&self) -> u64 {
        self.comments
    }

    /// Full pass over a comments dump. Malformed rows are logged and skipped.
    pub fn from_dump(
        path: &Path,
        format: InputFormat,
        read_buf_bytes: usize,
        progress: Option<&ProgressScope>,
    ) -> Result<Self> {
        let mut builder = CommentIndexBuilder::new();
        let mut malformed = 0u64;
        for_each_row(
            path,
            format,
            RowSchema::Comments,
            read_buf_bytes,
            |delta| {
                if let Some(p) = progress {
                    p.inc_bytes(delta);
                }
            },
            |row| {
                match classify(&row) {
                    Ok(rec) => builder.add_record(&rec),
                    Err(e) => {
                        malformed += 1;
                        tracing::debug!(error = %e, "skipping malformed comment row");
                    }
                }
                Ok(())
            },
        )?;
        if malformed > 0 {
            tracing::warn!(malformed, path = %path.display(), "malformed comment rows skipped");
        }
        Ok(builder.build())
    }
}
