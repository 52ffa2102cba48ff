//! Output sinks for rendered documents, plus the one-shot lossy retry on encoding errors.

use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zstd::stream::write::Encoder as ZstdEncoder;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot encode document {name}: {reason}")]
    Encoding { name: String, reason: String },
    #[error("sink already finished")]
    Finished,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable storage for named text blobs.
pub trait DocumentSink {
    fn write(&mut self, name: &str, text: &str) -> Result<(), SinkError>;

    /// Flush and make everything written so far durable. Called once at end of run.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: DocumentSink + ?Sized> DocumentSink for Box<S> {
    fn write(&mut self, name: &str, text: &str) -> Result<(), SinkError> {
        (**self).write(name, text)
    }
    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// How a document made it into the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The first attempt hit an encoding error; the lossy re-encoding was accepted.
    WrittenLossy,
}

/// Replace characters that byte-oriented sinks and downstream tools choke on
/// (NUL, other non-whitespace C0 controls, U+FFFE/U+FFFF) with U+FFFD.
pub fn lossy_reencode(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => c,
            c if (c as u32) < 0x20 || c == '\u{7f}' => char::REPLACEMENT_CHARACTER,
            '\u{fffe}' | '\u{ffff}' => char::REPLACEMENT_CHARACTER,
            c => c,
        })
        .collect()
}

/// Write once; on an encoding error retry exactly once with `lossy_reencode`.
pub fn write_document<S: DocumentSink + ?Sized>(sink: &mut S, name: &str, text: &str) -> Result<WriteOutcome, SinkError> {
    match sink.write(name, text) {
        Ok(()) => Ok(WriteOutcome::Written),
        Err(SinkError::Encoding { reason, .. }) => {
            tracing::debug!(name, reason = %reason, "retrying document with lossy re-encoding");
            sink.write(name, &lossy_reencode(text))?;
            Ok(WriteOutcome::WrittenLossy)
        }
        Err(e) => Err(e),
    }
}

fn check_encodable(name: &str, text: &str) -> Result<(), SinkError> {
    if text.contains('\0') {
        return Err(SinkError::Encoding { name: name.to_string(), reason: "text contains NUL".to_string() });
    }
    Ok(())
}

/// One `.txt` file per document under `dir`.
pub struct TxtDirSink {
    dir: PathBuf,
    write_buf: usize,
}

impl TxtDirSink {
    pub fn create(dir: &Path, write_buf: usize) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf(), write_buf: write_buf.max(8 * 1024) })
    }
}

impl DocumentSink for TxtDirSink {
    fn write(&mut self, name: &str, text: &str) -> Result<(), SinkError> {
        check_encodable(name, text)?;
        let path = self.dir.join(name);
        let f = create_with_backoff(&path, 16, 50)?;
        let mut w = BufWriter::with_capacity(self.write_buf, f);
        w.write_all(text.as_bytes())?;
        w.flush()?;
        Ok(())
    }
}

/// lm_dataformat-style archive: one `{"text", "meta": {"name"}}` JSON line per document,
/// zstd-compressed into a staging file and promoted atomically by `finish()`.
pub struct JsonlZstSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    enc: Option<ZstdEncoder<'static, BufWriter<File>>>,
}

impl JsonlZstSink {
    /// Writes `<dir>/<stem>.jsonl.zst`, staged under `<dir>/_staging/`.
    pub fn create(dir: &Path, stem: &str, write_buf: usize) -> anyhow::Result<Self> {
        let staging = dir.join("_staging");
        let tmp_path = staging.join(format!("{stem}.jsonl.zst.inprogress"));
        let final_path = dir.join(format!("{stem}.jsonl.zst"));
        let f = create_staged(&staging, &tmp_path)?;
        let enc = ZstdEncoder::new(BufWriter::with_capacity(write_buf.max(8 * 1024), f), 3)?;
        Ok(Self { tmp_path, final_path, enc: Some(enc) })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

/// A sibling sink finishing concurrently may remove the empty staging dir between
/// `create_dir_all` and the create; that case is retried.
fn create_staged(staging: &Path, tmp_path: &Path) -> io::Result<File> {
    let mut attempt = 0;
    loop {
        fs::create_dir_all(staging)?;
        match create_with_backoff(tmp_path, 16, 50) {
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < 3 => attempt += 1,
            res => return res,
        }
    }
}

impl DocumentSink for JsonlZstSink {
    fn write(&mut self, name: &str, text: &str) -> Result<(), SinkError> {
        check_encodable(name, text)?;
        let enc = self.enc.as_mut().ok_or(SinkError::Finished)?;
        let line = json!({ "text": text, "meta": { "name": name } });
        serde_json::to_writer(&mut *enc, &line).map_err(io::Error::from)?;
        enc.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        let Some(enc) = self.enc.take() else { return Ok(()) };
        let mut inner = enc.finish()?;
        inner.flush()?;
        drop(inner);
        replace_file_atomic_backoff(&self.tmp_path, &self.final_path)?;
        // other sites may still be staging here; only an empty dir goes
        if let Some(staging) = self.tmp_path.parent() {
            let _ = fs::remove_dir(staging);
        }
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl DocumentSink for NullSink {
    fn write(&mut self, _name: &str, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps documents in memory, in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub docs: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentSink for MemorySink {
    fn write(&mut self, name: &str, text: &str) -> Result<(), SinkError> {
        self.docs.push((name.to_string(), text.to_string()));
        Ok(())
    }
}
