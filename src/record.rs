//! Row classification: raw attribute maps in, typed `Record`s out.

use ahash::AHashMap;
use thiserror::Error;

const QUESTION_MARKER: &str = "1";
const ANSWER_MARKER: &str = "2";

/// Which dump a row came from. Posts and comments have different field sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowSchema {
    Posts,
    Comments,
}

/// One input row exactly as the lexer produced it.
#[derive(Clone, Debug)]
pub struct RawRecord {
    pub schema: RowSchema,
    fields: AHashMap<String, String>,
}

impl RawRecord {
    pub fn new(schema: RowSchema) -> Self {
        Self { schema, fields: AHashMap::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Field value, with empty strings reported as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Question,
    Answer,
    Comment,
    Other,
}

/// Normalized projection of a row. Absent and empty fields are both `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub id: u64,
    pub parent_id: Option<u64>,
    pub score: Option<i64>,
    pub body: Option<String>,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub answer_count: Option<u32>,
    pub accepted_answer_id: Option<u64>,
}

impl Record {
    fn bare(kind: RecordKind, id: u64) -> Self {
        Self {
            kind,
            id,
            parent_id: None,
            score: None,
            body: None,
            title: None,
            tags: None,
            answer_count: None,
            accepted_answer_id: None,
        }
    }

    /// Declared answers; a missing count means none.
    pub fn declared_answers(&self) -> u32 {
        self.answer_count.unwrap_or(0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("{kind:?} row is missing required field {field}")]
    MissingField { kind: RecordKind, field: &'static str },
    #[error("field {field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

fn parse_num<T: std::str::FromStr>(raw: &RawRecord, field: &'static str) -> Result<Option<T>, ClassifyError> {
    match raw.get(field) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ClassifyError::InvalidNumber { field, value: v.to_string() }),
    }
}

fn require<T>(v: Option<T>, kind: RecordKind, field: &'static str) -> Result<T, ClassifyError> {
    v.ok_or(ClassifyError::MissingField { kind, field })
}

fn text(raw: &RawRecord, field: &str) -> Option<String> {
    raw.get(field).map(str::to_string)
}

/// Classify a row and project the fields its kind needs.
pub fn classify(raw: &RawRecord) -> Result<Record, ClassifyError> {
    if raw.schema == RowSchema::Comments {
        let kind = RecordKind::Comment;
        let id = require(parse_num(raw, "Id")?, kind, "Id")?;
        let mut rec = Record::bare(kind, id);
        rec.parent_id = Some(require(parse_num(raw, "PostId")?, kind, "PostId")?);
        rec.score = parse_num(raw, "Score")?;
        rec.body = text(raw, "Text");
        return Ok(rec);
    }

    let kind = match raw.get("PostTypeId") {
        Some(QUESTION_MARKER) => RecordKind::Question,
        Some(ANSWER_MARKER) => RecordKind::Answer,
        _ => RecordKind::Other,
    };
    if kind == RecordKind::Other {
        // Ids of unrelated post types are not needed; keep going even if absent.
        let id = parse_num(raw, "Id").unwrap_or(None).unwrap_or(0);
        return Ok(Record::bare(kind, id));
    }

    let id = require(parse_num(raw, "Id")?, kind, "Id")?;
    let mut rec = Record::bare(kind, id);
    rec.score = parse_num(raw, "Score")?;
    rec.body = text(raw, "Body");
    match kind {
        RecordKind::Question => {
            rec.title = text(raw, "Title");
            rec.tags = text(raw, "Tags");
            rec.answer_count = parse_num(raw, "AnswerCount")?;
            rec.accepted_answer_id = parse_num(raw, "AcceptedAnswerId")?;
        }
        RecordKind::Answer => {
            rec.parent_id = Some(require(parse_num(raw, "ParentId")?, kind, "ParentId")?);
        }
        _ => {}
    }
    Ok(rec)
}
