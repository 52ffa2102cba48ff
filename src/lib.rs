mod config;
mod paths;
mod rows;
mod record;
mod html;
mod bucket;

mod serialize;
mod comments;
mod assembler;
mod shard;
mod sink;
mod tokenize;
mod stats;

mod progress;
mod concurrency;
mod util;
mod mem;
mod pipeline;

pub use crate::config::{ConfigError, InputFormat, OutFormat, PairerOptions, ShardSpec};
pub use crate::pipeline::{BatchReport, QaPairer, ScoreQuantiles};
pub use crate::paths::{discover_sites, SitePaths};

pub use crate::record::{classify, ClassifyError, RawRecord, Record, RecordKind, RowSchema};
pub use crate::rows::{for_each_row, for_each_row_quiet};
pub use crate::html::HtmlTextExtractor;
pub use crate::bucket::{quantile_bounds, BoundaryTables, PostKind, ScoreBucketer};
pub use crate::serialize::{document_name, split_tags, Attribute, DocumentSerializer, RenderedDocument};
pub use crate::comments::{CommentIndex, CommentIndexBuilder};
pub use crate::assembler::{
    Admission, AnswerDisposition, Completion, PendingQuestion, PendingTable, SiteReport, StoredAnswer,
    ThreadAssembler,
};
pub use crate::shard::{split_even, ShardAssignment, ShardPlanner};
pub use crate::sink::{
    lossy_reencode, write_document, DocumentSink, JsonlZstSink, MemorySink, NullSink, SinkError, TxtDirSink,
    WriteOutcome,
};
pub use crate::tokenize::{Tokenizer, WhitespaceTokenizer};
pub use crate::stats::PairerStats;

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, ProgressScope};

// Expose memory helpers for adaptive throttling from the binary.
pub use crate::mem::{available_memory_fraction, is_low_memory};

//export robust file ops and text helpers from util so binaries can import from crate root.
pub use crate::util::{collapse_newlines, create_with_backoff, init_tracing_once, open_with_backoff, replace_file_atomic_backoff, strip_mentions};
