//! Incremental question/answer assembly.
//!
//! Questions that declare answers wait in the pending table. Every answer that
//! references a pending question bumps its counter, whether or not the answer is
//! kept; when the counter reaches the declared count the question is removed and
//! rendered exactly once. Answers whose parent is not pending are dropped.

use crate::comments::CommentIndex;
use crate::config::ShardSpec;
use crate::record::{classify, RawRecord, Record, RecordKind};
use crate::serialize::{document_name, DocumentSerializer};
use crate::shard::ShardAssignment;
use crate::sink::{write_document, DocumentSink, WriteOutcome};
use crate::stats::PairerStats;
use crate::tokenize::Tokenizer;
use ahash::AHashMap;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAnswer {
    pub id: u64,
    pub body: Option<String>,
    pub score: Option<i64>,
    /// Encounter order within the run; breaks score ties.
    pub seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingQuestion {
    pub id: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<String>,
    pub score: Option<i64>,
    pub declared_answers: u32,
    pub accepted_answer_id: Option<u64>,
    pub parsed_answers: u32,
    pub stored_answers: AHashMap<u64, StoredAnswer>,
}

impl PendingQuestion {
    pub fn from_record(rec: Record) -> Self {
        Self {
            id: rec.id,
            declared_answers: rec.declared_answers(),
            title: rec.title,
            body: rec.body,
            tags: rec.tags,
            score: rec.score,
            accepted_answer_id: rec.accepted_answer_id,
            parsed_answers: 0,
            stored_answers: AHashMap::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.parsed_answers == self.declared_answers
    }
}

/// Question id → pending question. Lookups never create entries.
#[derive(Debug, Default)]
pub struct PendingTable {
    map: AHashMap<u64, PendingQuestion>,
}

impl PendingTable {
    pub fn get(&self, id: u64) -> Option<&PendingQuestion> {
        self.map.get(&id)
    }
    pub fn get_mut(&mut self, id: u64) -> Option<&mut PendingQuestion> {
        self.map.get_mut(&id)
    }
    pub fn contains(&self, id: u64) -> bool {
        self.map.contains_key(&id)
    }
    /// Returns the previous entry for the id, if any.
    pub fn insert(&mut self, q: PendingQuestion) -> Option<PendingQuestion> {
        self.map.insert(q.id, q)
    }
    pub fn remove(&mut self, id: u64) -> Option<PendingQuestion> {
        self.map.remove(&id)
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Tracked,
    NoAnswers,
    OutsideShard,
    NotAQuestion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerDisposition {
    /// The parent's accepted answer; stored whatever its score.
    Accepted,
    AboveThreshold,
    /// Counted towards completion but not stored.
    BelowThreshold,
    /// No pending parent.
    Orphan,
    NotAnAnswer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Untracked,
    Pending,
    /// Completed with no stored answers: removed, nothing written.
    DroppedEmpty,
    Written { name: String, lossy: bool },
    WriteFailed { name: String },
}

/// End-of-run summary for one site (and shard).
#[derive(Clone, Debug, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub shard: Option<ShardSpec>,
    pub stats: PairerStats,
    /// Questions still waiting for answers when the stream ended.
    pub pending_left: usize,
    /// Shard ids assigned by the pre-pass but never seen by the main pass.
    pub missing_shard_ids: Vec<u64>,
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

pub struct ThreadAssembler<S: DocumentSink> {
    site: String,
    min_score: i64,
    serializer: DocumentSerializer,
    comments: Arc<CommentIndex>,
    sink: S,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    shard: Option<ShardAssignment>,
    pending: PendingTable,
    stats: PairerStats,
    seed: u64,
    next_seq: u64,
    status_every: u64,
}

impl<S: DocumentSink> ThreadAssembler<S> {
    pub fn new(site: impl Into<String>, serializer: DocumentSerializer, sink: S) -> Self {
        Self {
            site: site.into(),
            min_score: 3,
            serializer,
            comments: Arc::new(CommentIndex::empty()),
            sink,
            tokenizer: None,
            shard: None,
            pending: PendingTable::default(),
            stats: PairerStats::default(),
            seed: 0,
            next_seq: 0,
            status_every: 0,
        }
    }

    pub fn min_score(mut self, score: i64) -> Self { self.min_score = score; self }
    pub fn comments(mut self, index: Arc<CommentIndex>) -> Self { self.comments = index; self }
    pub fn tokenizer(mut self, t: Option<Arc<dyn Tokenizer>>) -> Self { self.tokenizer = t; self }
    pub fn shard(mut self, assignment: Option<ShardAssignment>) -> Self { self.shard = assignment; self }
    pub fn seed(mut self, seed: u64) -> Self { self.seed = seed; self }
    /// Log a status line every `n` rendered documents (0 disables).
    pub fn status_every(mut self, n: u64) -> Self { self.status_every = n; self }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn stats(&self) -> &PairerStats {
        &self.stats
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Random source for one document, derived from (seed, site, question id) only, so a
    /// document renders the same regardless of stream position or sharding.
    pub fn document_rng(&self, question_id: u64) -> ChaCha8Rng {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&self.seed.to_le_bytes());
        seed[8..16].copy_from_slice(&fnv1a(&self.site).to_le_bytes());
        seed[16..24].copy_from_slice(&question_id.to_le_bytes());
        ChaCha8Rng::from_seed(seed)
    }

    /// Start tracking a question, unless it is outside this shard or declares no answers.
    pub fn accept_question(&mut self, rec: Record) -> Admission {
        if rec.kind != RecordKind::Question {
            return Admission::NotAQuestion;
        }
        if let Some(shard) = self.shard.as_mut() {
            if !shard.admits(rec.id) {
                self.stats.questions_outside_shard += 1;
                return Admission::OutsideShard;
            }
        }
        self.stats.questions_seen += 1;
        if rec.declared_answers() == 0 {
            self.stats.questions_without_answers += 1;
            return Admission::NoAnswers;
        }
        if let Some(prev) = self.pending.insert(PendingQuestion::from_record(rec)) {
            tracing::warn!(
                site = %self.site,
                id = prev.id,
                parsed = prev.parsed_answers,
                "question id seen twice; earlier entry replaced"
            );
        }
        Admission::Tracked
    }

    /// Merge an answer into its pending parent. Does not check completion.
    pub fn add_answer(&mut self, rec: &Record) -> AnswerDisposition {
        if rec.kind != RecordKind::Answer {
            return AnswerDisposition::NotAnAnswer;
        }
        let Some(q) = rec.parent_id.and_then(|p| self.pending.get_mut(p)) else {
            self.stats.orphan_answers += 1;
            return AnswerDisposition::Orphan;
        };

        let disposition = if q.accepted_answer_id == Some(rec.id) {
            AnswerDisposition::Accepted
        } else if rec.score.is_some_and(|s| s >= self.min_score) {
            AnswerDisposition::AboveThreshold
        } else {
            AnswerDisposition::BelowThreshold
        };

        if disposition == AnswerDisposition::BelowThreshold {
            self.stats.below_threshold_answers += 1;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            q.stored_answers.insert(
                rec.id,
                StoredAnswer { id: rec.id, body: rec.body.clone(), score: rec.score, seq },
            );
        }
        q.parsed_answers += 1;
        disposition
    }

    /// Evict and render `question_id` if every declared answer has been seen.
    pub fn check_completion(&mut self, question_id: u64) -> Completion {
        match self.pending.get(question_id) {
            None => return Completion::Untracked,
            Some(q) if !q.is_complete() => return Completion::Pending,
            Some(_) => {}
        }
        let Some(q) = self.pending.remove(question_id) else {
            return Completion::Untracked;
        };
        if q.stored_answers.is_empty() {
            self.stats.empty_evictions += 1;
            return Completion::DroppedEmpty;
        }
        self.render_and_write(&q)
    }

    fn render_and_write(&mut self, q: &PendingQuestion) -> Completion {
        let mut rng = self.document_rng(q.id);
        let doc = self.serializer.render(q, &self.comments, &mut rng);
        let name = document_name(&self.site, q.id);

        let completion = match write_document(&mut self.sink, &name, &doc.text) {
            Ok(outcome) => {
                let lossy = outcome == WriteOutcome::WrittenLossy;
                if lossy {
                    self.stats.lossy_writes += 1;
                }
                Completion::Written { name, lossy }
            }
            Err(e) => {
                self.stats.write_failures += 1;
                tracing::warn!(site = %self.site, name = %name, error = %e, "failed to write document");
                return Completion::WriteFailed { name };
            }
        };

        let tokens = self.tokenizer.as_ref().map(|t| t.count(&doc.text) as u64);
        self.stats.record_document(&doc.tags, doc.answers, tokens);
        if self.status_every > 0 && self.stats.questions % self.status_every == 0 {
            self.stats.log_status(&self.site);
        }
        completion
    }

    /// Classify one raw row and route it. Malformed rows are logged and skipped.
    pub fn process(&mut self, raw: &RawRecord) -> Option<Completion> {
        let rec = match classify(raw) {
            Ok(r) => r,
            Err(e) => {
                self.stats.malformed_records += 1;
                tracing::warn!(site = %self.site, error = %e, "skipping malformed record");
                return None;
            }
        };
        match rec.kind {
            RecordKind::Question => {
                self.accept_question(rec);
                None
            }
            RecordKind::Answer => {
                self.add_answer(&rec);
                rec.parent_id.map(|p| self.check_completion(p))
            }
            RecordKind::Comment | RecordKind::Other => None,
        }
    }

    /// Flush the sink and summarize the run. Returns the sink for callers that need it.
    pub fn finish(mut self) -> Result<(SiteReport, S)> {
        self.sink
            .finish()
            .with_context(|| format!("finish sink for {}", self.site))?;

        if !self.pending.is_empty() {
            tracing::info!(
                site = %self.site,
                pending = self.pending.len(),
                "questions never completed (declared answers not all present in the dump)"
            );
        }
        let missing = self.shard.as_ref().map(|s| s.missing_ids()).unwrap_or_default();
        if !missing.is_empty() {
            tracing::warn!(
                site = %self.site,
                count = missing.len(),
                ids = ?missing,
                "shard ids from the pre-pass were not seen in the main pass; is the source stream deterministic?"
            );
        }
        self.stats.log_status(&self.site);

        let report = SiteReport {
            site: self.site,
            shard: self.shard.as_ref().map(|s| s.spec()),
            stats: self.stats,
            pending_left: self.pending.len(),
            missing_shard_ids: missing,
        };
        Ok((report, self.sink))
    }
}
