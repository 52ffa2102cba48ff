#![allow(dead_code)]

use qapair::{RawRecord, RowSchema};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// One `<row .../>` element from attribute pairs. Values are XML-escaped here so
/// fixtures can be written with raw HTML bodies.
pub fn xml_row(attrs: &[(&str, &str)]) -> String {
    let mut s = String::from("  <row");
    for (k, v) in attrs {
        let v = v
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\n', "&#xA;");
        s.push_str(&format!(" {k}=\"{v}\""));
    }
    s.push_str(" />");
    s
}

/// Write a `<posts>`/`<comments>` dump file, zstd-compressed when the name ends in `.zst`.
pub fn write_xml_dump(path: &Path, root: &str, rows: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    body.push_str(&format!("<{root}>\n"));
    for r in rows {
        body.push_str(r);
        body.push('\n');
    }
    body.push_str(&format!("</{root}>\n"));

    let f = File::create(path).unwrap();
    if path.extension().and_then(|e| e.to_str()) == Some("zst") {
        let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
    } else {
        let mut f = f;
        f.write_all(body.as_bytes()).unwrap();
    }
}

pub fn post(attrs: &[(&str, &str)]) -> RawRecord {
    attrs.iter().fold(RawRecord::new(RowSchema::Posts), |r, (k, v)| r.with(*k, *v))
}

pub fn comment(attrs: &[(&str, &str)]) -> RawRecord {
    attrs.iter().fold(RawRecord::new(RowSchema::Comments), |r, (k, v)| r.with(*k, *v))
}

/// Posts of the `cooking` fixture site, in stream order:
/// - q1 declares 3 answers (accepted a4), tagged eggs/boiling; completes on a7.
/// - q2 declares no answers.
/// - a3 (score 5) and a4 (accepted, score -2) are stored; a7 (score 1) is only counted.
/// - q5 declares 1 answer; its only answer a6 is below threshold, so it is dropped.
/// - a8 answers a question that never appears (orphan).
/// - q9 declares 2 answers but only a10 arrives, so it is still pending at the end.
/// - q11 declares 1 answer; a12 completes it.
pub fn cooking_posts() -> Vec<String> {
    vec![
        xml_row(&[
            ("Id", "1"), ("PostTypeId", "1"), ("AcceptedAnswerId", "4"), ("Score", "10"),
            ("Body", "<p>How long?</p>"), ("Title", "Boil an egg?"),
            ("Tags", "<eggs><boiling>"), ("AnswerCount", "3"),
        ]),
        xml_row(&[("Id", "2"), ("PostTypeId", "1"), ("Score", "1"), ("Title", "Unanswered"), ("AnswerCount", "0")]),
        xml_row(&[("Id", "3"), ("PostTypeId", "2"), ("ParentId", "1"), ("Score", "5"), ("Body", "<p>Seven minutes.</p>")]),
        xml_row(&[("Id", "4"), ("PostTypeId", "2"), ("ParentId", "1"), ("Score", "-2"), ("Body", "<p>Hard boil.</p>")]),
        xml_row(&[
            ("Id", "5"), ("PostTypeId", "1"), ("Score", "2"), ("Title", "Salt?"),
            ("Body", "<p>Why salt?</p>"), ("Tags", "<salt>"), ("AnswerCount", "1"),
        ]),
        xml_row(&[("Id", "6"), ("PostTypeId", "2"), ("ParentId", "5"), ("Score", "0"), ("Body", "<p>Taste.</p>")]),
        xml_row(&[("Id", "7"), ("PostTypeId", "2"), ("ParentId", "1"), ("Score", "1"), ("Body", "<p>Ask a chef.</p>")]),
        xml_row(&[("Id", "8"), ("PostTypeId", "2"), ("ParentId", "99"), ("Score", "50"), ("Body", "<p>Lost.</p>")]),
        xml_row(&[("Id", "9"), ("PostTypeId", "1"), ("Score", "4"), ("Title", "Knives"), ("Tags", "<knives>"), ("AnswerCount", "2")]),
        xml_row(&[("Id", "10"), ("PostTypeId", "2"), ("ParentId", "9"), ("Score", "4"), ("Body", "<p>Sharpen.</p>")]),
        xml_row(&[("Id", "11"), ("PostTypeId", "1"), ("Score", "7"), ("Title", "Rice"), ("Body", "<pre><code>1 cup rice\n2 cups water\n</code></pre>"), ("Tags", "<rice>"), ("AnswerCount", "1")]),
        xml_row(&[("Id", "12"), ("PostTypeId", "2"), ("ParentId", "11"), ("Score", "3"), ("Body", "<p>Use a <code>lid</code>.</p>")]),
        xml_row(&[("Id", "13"), ("PostTypeId", "5"), ("Body", "wiki excerpt")]),
    ]
}

pub fn cooking_comments() -> Vec<String> {
    vec![
        xml_row(&[("Id", "1"), ("PostId", "1"), ("Score", "0"), ("Text", "@bob try <b>salt</b>")]),
        xml_row(&[("Id", "2"), ("PostId", "3"), ("Score", "2"), ("Text", "Agreed.")]),
        xml_row(&[("Id", "3"), ("PostId", "3"), ("Score", "0"), ("Text", "@carol")]),
    ]
}

/// A dumps directory under a fresh temp dir holding the `cooking` site.
/// Returns the dumps directory.
pub fn make_dumps_basic() -> PathBuf {
    let base = tempfile::tempdir().unwrap().into_path();
    let dumps = base.join("dumps");
    write_xml_dump(&dumps.join("cooking").join("Posts.xml"), "posts", &cooking_posts());
    write_xml_dump(&dumps.join("cooking").join("Comments.xml"), "comments", &cooking_comments());
    dumps
}

/// Read a `.jsonl.zst` archive into JSON values.
pub fn read_jsonl_zst(path: &Path) -> Vec<serde_json::Value> {
    let f = File::open(path).unwrap();
    let mut dec = zstd::stream::read::Decoder::new(f).unwrap();
    let mut s = String::new();
    dec.read_to_string(&mut s).unwrap();
    s.lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Sorted file names in a directory.
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut v: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    v.sort();
    v
}

pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    BufReader::new(f).lines().map(|l| l.unwrap()).collect()
}
