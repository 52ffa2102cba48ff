//! Rendering of a completed thread into one training document.
//!
//! Every block is wrapped as
//!
//! ```text
//! <| q tags=rust,serde |>
//! ...inner text...
//! <|/ q dscore=3 |>
//! ```
//!
//! Each attribute independently lands in the opening or the closing marker
//! (`attribute_move_probability` is the chance of the closing one), and each group is
//! shuffled. The random source is always passed in by the caller.

use crate::assembler::{PendingQuestion, StoredAnswer};
use crate::bucket::{BoundaryTables, PostKind, ScoreBucketer};
use crate::comments::CommentIndex;
use crate::html::HtmlTextExtractor;
use crate::util::{collapse_newlines, strip_mentions};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::cmp::Reverse;
use std::sync::OnceLock;

static TAG_SPLIT_RE: OnceLock<Regex> = OnceLock::new();

/// Split a raw tag string such as `<rust><serde>` or `|rust|serde|` into tag names.
pub fn split_tags(raw: &str) -> Vec<String> {
    let re = TAG_SPLIT_RE.get_or_init(|| Regex::new(r"[<>|]+").expect("static regex"));
    re.split(raw)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `{site}_{id padded to 10 digits}.txt`
pub fn document_name(site: &str, question_id: u64) -> String {
    format!("{site}_{question_id:010}.txt")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub key: &'static str,
    pub value: String,
}

impl Attribute {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self { key, value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDocument {
    pub text: String,
    /// Tags in source order (not the shuffled attribute order).
    pub tags: Vec<String>,
    /// Answers included in the document.
    pub answers: usize,
}

#[derive(Clone, Debug)]
pub struct DocumentSerializer {
    extractor: HtmlTextExtractor,
    max_responses: usize,
    max_comments: usize,
    move_probability: f64,
    question_buckets: Option<ScoreBucketer>,
    answer_buckets: Option<ScoreBucketer>,
}

impl DocumentSerializer {
    pub fn new(max_responses: usize, max_comments: usize, move_probability: f64) -> Self {
        Self {
            extractor: HtmlTextExtractor::new(),
            max_responses,
            max_comments,
            move_probability: if move_probability.is_finite() { move_probability.clamp(0.0, 1.0) } else { 0.0 },
            question_buckets: None,
            answer_buckets: None,
        }
    }

    pub fn with_extractor(mut self, extractor: HtmlTextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_question_buckets(mut self, b: Option<ScoreBucketer>) -> Self {
        self.question_buckets = b;
        self
    }

    pub fn with_answer_buckets(mut self, b: Option<ScoreBucketer>) -> Self {
        self.answer_buckets = b;
        self
    }

    /// Pick up this site's boundary tables, if any.
    pub fn with_site_tables(self, tables: &BoundaryTables, site: &str) -> Self {
        let q = tables.get(site, PostKind::Questions).cloned();
        let a = tables.get(site, PostKind::Answers).cloned();
        self.with_question_buckets(q).with_answer_buckets(a)
    }

    /// Markup → text with code blocks preserved and mentions removed.
    pub fn render_markup(&self, markup: &str) -> String {
        strip_mentions(&self.extractor.text(markup)).trim().to_string()
    }

    /// Wrap `inner` in `name` markers, placing and ordering attributes at random.
    pub fn wrap<R: Rng + ?Sized>(&self, name: &str, inner: &str, attrs: Vec<Attribute>, rng: &mut R) -> String {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for attr in attrs {
            if rng.gen_bool(self.move_probability) {
                after.push(attr);
            } else {
                before.push(attr);
            }
        }
        before.shuffle(rng);
        after.shuffle(rng);
        format!("{}\n{}\n{}", marker("<| ", name, &before), inner, marker("<|/ ", name, &after))
    }

    /// Up to `max_responses` answers by descending score; ties keep encounter order.
    pub fn select_answers<'a>(&self, q: &'a PendingQuestion) -> Vec<&'a StoredAnswer> {
        let mut answers: Vec<&StoredAnswer> = q.stored_answers.values().collect();
        answers.sort_by_key(|a| (Reverse(a.score.unwrap_or(0)), a.seq));
        answers.truncate(self.max_responses);
        answers
    }

    fn dscore(&self, buckets: Option<&ScoreBucketer>, score: Option<i64>) -> Option<Attribute> {
        let (b, s) = (buckets?, score?);
        Some(Attribute::new("dscore", b.bucket(s).to_string()))
    }

    fn push_comments<R: Rng + ?Sized>(&self, blocks: &mut Vec<String>, comments: &CommentIndex, post_id: u64, rng: &mut R) {
        for c in comments.first(post_id, self.max_comments) {
            blocks.push(self.wrap("c", c, Vec::new(), rng));
        }
    }

    pub fn render<R: Rng + ?Sized>(&self, q: &PendingQuestion, comments: &CommentIndex, rng: &mut R) -> RenderedDocument {
        let tags = q.tags.as_deref().map(split_tags).unwrap_or_default();
        let mut shuffled = tags.clone();
        shuffled.shuffle(rng);
        let tags_attr = (!shuffled.is_empty()).then(|| Attribute::new("tags", shuffled.join(",")));

        let title = q.title.as_deref().map(|t| self.render_markup(t)).unwrap_or_default();
        let body = q.body.as_deref().map(|b| self.render_markup(b)).unwrap_or_default();
        let question_inner = match (title.is_empty(), body.is_empty()) {
            (false, false) => format!("{title}\n\n{body}"),
            (false, true) => title,
            _ => body,
        };

        let mut blocks = Vec::new();
        let mut attrs: Vec<Attribute> = tags_attr.iter().cloned().collect();
        attrs.extend(self.dscore(self.question_buckets.as_ref(), q.score));
        blocks.push(self.wrap("q", &question_inner, attrs, rng));
        self.push_comments(&mut blocks, comments, q.id, rng);

        let selected = self.select_answers(q);
        for a in &selected {
            let inner = a.body.as_deref().map(|b| self.render_markup(b)).unwrap_or_default();
            let mut attrs: Vec<Attribute> = tags_attr.iter().cloned().collect();
            attrs.extend(self.dscore(self.answer_buckets.as_ref(), a.score));
            blocks.push(self.wrap("a", &inner, attrs, rng));
            self.push_comments(&mut blocks, comments, a.id, rng);
        }

        RenderedDocument {
            text: collapse_newlines(&blocks.join("\n")),
            tags,
            answers: selected.len(),
        }
    }
}

fn marker(open: &str, name: &str, attrs: &[Attribute]) -> String {
    let mut s = String::from(open);
    s.push_str(name);
    for a in attrs {
        s.push(' ');
        s.push_str(a.key);
        s.push('=');
        s.push_str(&a.value);
    }
    s.push_str(" |>");
    s
}
