//! Forward-only row streaming over dump files (`Posts.*`, `Comments.*`).
//!
//! XML rows (`<row Id=".." .../>`) are lexed with quick-xml, CSV rows with the csv crate
//! (header row = field names). A `.zst` suffix means the file is zstd-compressed.
//! Every call re-opens the file from the start, so a source can be read more than once.

use crate::config::InputFormat;
use crate::mem::maybe_throttle_low_memory;
use crate::record::{RawRecord, RowSchema};
use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use zstd::stream::read::Decoder;

/// Why a pass over a file stopped early.
enum Halt {
    /// The file could not be opened or its decoder set up; nothing was read.
    Open(anyhow::Error),
    /// The file itself could not be read or lexed any further.
    Source(anyhow::Error),
    /// The row callback failed; that is the caller's error, not the file's.
    Callback(anyhow::Error),
}

#[inline]
fn warn_source_skip(path: &Path, e: &anyhow::Error) {
    let abs = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    tracing::warn!(
        path = %abs.display(),
        error = %e,
        "stopped reading dump after a read/lex error; rows before the error were processed"
    );
}

/// A `Read` wrapper that counts (compressed) bytes read.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}
impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

fn is_zst(path: &Path) -> bool {
    path.extension().map(|e| e.eq_ignore_ascii_case("zst")).unwrap_or(false)
}

/// Stream every row of `path`, calling `on_row` for each and `on_progress(delta_bytes)`
/// as the underlying file is consumed.
///
/// A file that cannot be opened is an error. Read or lex failures after that are logged
/// and end the pass over that file without an error. Errors returned by `on_row` abort
/// the pass and are returned to the caller.
pub fn for_each_row(
    path: &Path,
    format: InputFormat,
    schema: RowSchema,
    read_buf_bytes: usize,
    mut on_progress: impl FnMut(u64),
    mut on_row: impl FnMut(RawRecord) -> Result<()>,
) -> Result<()> {
    match for_each_row_attempt(path, format, schema, read_buf_bytes, &mut on_progress, &mut on_row) {
        Ok(()) => Ok(()),
        Err(Halt::Open(e)) | Err(Halt::Callback(e)) => Err(e),
        Err(Halt::Source(e)) => {
            warn_source_skip(path, &e);
            Ok(())
        }
    }
}

/// Convenience: stream rows without progress reporting.
pub fn for_each_row_quiet(
    path: &Path,
    format: InputFormat,
    schema: RowSchema,
    read_buf_bytes: usize,
    on_row: impl FnMut(RawRecord) -> Result<()>,
) -> Result<()> {
    for_each_row(path, format, schema, read_buf_bytes, |_| {}, on_row)
}

fn for_each_row_attempt(
    path: &Path,
    format: InputFormat,
    schema: RowSchema,
    read_buf_bytes: usize,
    on_progress: &mut impl FnMut(u64),
    on_row: &mut impl FnMut(RawRecord) -> Result<()>,
) -> Result<(), Halt> {
    let file = open_with_backoff(path, 16, 50)
        .with_context(|| format!("open {}", path.display()))
        .map_err(Halt::Open)?;
    let meta = file.metadata().with_context(|| format!("stat {}", path.display())).map_err(Halt::Open)?;
    if !meta.is_file() {
        return Err(Halt::Open(anyhow::anyhow!("{} is not a regular file", path.display())));
    }
    let counter = Arc::new(AtomicU64::new(0));
    let cnt = CountingReader { inner: file, counter: counter.clone() };
    let cap = read_buf_bytes.max(8 * 1024);

    let reader: Box<dyn BufRead> = if is_zst(path) {
        let mut decoder = Decoder::new(cnt).map_err(|e| Halt::Open(e.into()))?;
        decoder.window_log_max(31).map_err(|e| Halt::Open(e.into()))?;
        Box::new(BufReader::with_capacity(cap, decoder))
    } else {
        Box::new(BufReader::with_capacity(cap, cnt))
    };

    let mut last = 0u64;
    let mut emit = |row: RawRecord| -> Result<(), Halt> {
        let cur = counter.load(Ordering::Relaxed);
        if cur > last {
            on_progress(cur - last);
            last = cur;
        }
        on_row(row).map_err(Halt::Callback)?;
        maybe_throttle_low_memory(0.10);
        Ok(())
    };

    match format {
        InputFormat::Xml => lex_xml(reader, schema, path, &mut emit)?,
        InputFormat::Csv => lex_csv(reader, schema, path, &mut emit)?,
    }

    let cur = counter.load(Ordering::Relaxed);
    if cur > last {
        on_progress(cur - last);
    }
    Ok(())
}

fn row_from_xml(tag: &BytesStart<'_>, schema: RowSchema) -> Result<RawRecord> {
    let mut rec = RawRecord::new(schema);
    for attr in tag.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?;
        rec.insert(key, value.into_owned());
    }
    Ok(rec)
}

fn lex_xml(
    reader: Box<dyn BufRead>,
    schema: RowSchema,
    path: &Path,
    emit: &mut impl FnMut(RawRecord) -> Result<(), Halt>,
) -> Result<(), Halt> {
    let mut xml = quick_xml::Reader::from_reader(reader);
    let mut buf = Vec::with_capacity(16 * 1024);
    let mut row_no = 0u64;
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(tag)) | Ok(Event::Start(tag)) if tag.name().as_ref() == b"row" => {
                row_no += 1;
                match row_from_xml(&tag, schema) {
                    Ok(row) => emit(row)?,
                    Err(e) => tracing::warn!(path = %path.display(), row = row_no, error = %e, "skipping malformed row"),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Halt::Source(anyhow::Error::new(e).context(format!(
                    "xml lex error at byte {} of {}",
                    xml.buffer_position(),
                    path.display()
                ))))
            }
        }
        buf.clear();
    }
    Ok(())
}

fn lex_csv(
    reader: Box<dyn BufRead>,
    schema: RowSchema,
    path: &Path,
    emit: &mut impl FnMut(RawRecord) -> Result<(), Halt>,
) -> Result<(), Halt> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .with_context(|| format!("read csv header of {}", path.display()))
        .map_err(Halt::Source)?
        .clone();

    for (i, rec) in rdr.records().enumerate() {
        let rec = match rec {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(Halt::Source(e.into())),
            Err(e) => {
                tracing::warn!(path = %path.display(), row = i + 1, error = %e, "skipping malformed row");
                continue;
            }
        };
        let mut row = RawRecord::new(schema);
        for (key, value) in headers.iter().zip(rec.iter()) {
            row.insert(key, value);
        }
        emit(row)?;
    }
    Ok(())
}
