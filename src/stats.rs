//! Per-assembler run statistics. Owned by one assembler; never global.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Default, Serialize)]
pub struct PairerStats {
    /// Documents rendered (questions with at least one stored answer).
    pub questions: u64,
    /// Answers included in rendered documents.
    pub answers: u64,
    pub tag_counts: HashMap<String, u64>,
    pub tag_tokens: HashMap<String, u64>,
    pub total_tokens: u64,

    // anomalies and skips, counted rather than raised
    pub questions_seen: u64,
    pub questions_without_answers: u64,
    pub questions_outside_shard: u64,
    pub orphan_answers: u64,
    pub below_threshold_answers: u64,
    pub empty_evictions: u64,
    pub malformed_records: u64,
    pub render_failures: u64,
    pub write_failures: u64,
    pub lossy_writes: u64,
}

impl PairerStats {
    pub fn answers_per_question(&self) -> f64 {
        if self.questions == 0 { 0.0 } else { self.answers as f64 / self.questions as f64 }
    }

    /// Record one rendered document: its tags and (optionally) its token count.
    pub fn record_document(&mut self, tags: &[String], answers: usize, tokens: Option<u64>) {
        self.questions += 1;
        self.answers += answers as u64;
        for tag in tags {
            *self.tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        if let Some(n) = tokens {
            self.total_tokens += n;
            for tag in tags {
                *self.tag_tokens.entry(tag.clone()).or_insert(0) += n;
            }
        }
    }

    /// Most common tags, descending by count, ties by name.
    pub fn top_tags(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.tag_counts, n)
    }

    pub fn top_tag_tokens(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.tag_tokens, n)
    }

    pub fn log_status(&self, site: &str) {
        tracing::info!(
            site,
            questions = self.questions,
            answers = self.answers,
            answers_per_question = %format!("{:.2}", self.answers_per_question()),
            total_tokens = self.total_tokens,
            "status"
        );
        let tags: Vec<String> = self.top_tags(20).into_iter().map(|(t, c)| format!("{t}:{c}")).collect();
        if !tags.is_empty() {
            tracing::info!(site, common_tags = ?tags, "common tags");
        }
    }
}

fn top_n(m: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut v: Vec<(String, u64)> = m.iter().map(|(k, c)| (k.clone(), *c)).collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(n);
    v
}
