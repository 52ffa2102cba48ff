#[path = "common/mod.rs"]
mod common;

use common::*;
use qapair::{split_even, OutFormat, QaPairer, ShardPlanner, ShardSpec};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[test]
fn even_split_gives_extra_items_to_leading_slices() {
    assert_eq!(split_even(10, 3), vec![0..4, 4..7, 7..10]);
    assert_eq!(split_even(2, 4), vec![0..1, 1..2, 2..2, 2..2]);
    assert_eq!(split_even(0, 2), vec![0..0, 0..0]);
}

#[test]
fn assignment_tracks_unseen_ids() {
    let planner = ShardPlanner::collect([40, 10, 30, 20, 50]);
    assert!(planner.assign(ShardSpec { count: 2, index: 2 }).is_err());
    assert!(planner.assign(ShardSpec { count: 0, index: 0 }).is_err());

    let mut first = planner.assign(ShardSpec { count: 2, index: 0 }).unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.admits(40));
    assert!(!first.admits(20));
    assert!(first.admits(30));
    assert_eq!(first.missing_ids(), vec![10]);

    let mut second = planner.assign(ShardSpec { count: 2, index: 1 }).unwrap();
    assert!(second.admits(20) && second.admits(50));
    assert!(second.missing_ids().is_empty());
}

fn answer_row(id: u64, parent: u64, score: i64, body: &str) -> String {
    let (id, parent, score) = (id.to_string(), parent.to_string(), score.to_string());
    xml_row(&[
        ("Id", id.as_str()),
        ("PostTypeId", "2"),
        ("ParentId", parent.as_str()),
        ("Score", score.as_str()),
        ("Body", body),
    ])
}

/// 40 questions with a mix of answer counts; answers arrive interleaved a few
/// questions later so several questions are pending at once.
fn write_busy_site(dumps: &Path) {
    let mut rows = Vec::new();
    let mut next_id = 1000u64;
    let mut waiting: Vec<(u64, u32)> = Vec::new();
    for i in 0..40u64 {
        let qid = i * 3 + 1;
        let answers = (i % 4) as u32;
        let (id, score) = (qid.to_string(), (i as i64 - 5).to_string());
        let (title, body) = (format!("question {i}"), format!("<p>body of {i}</p>"));
        let (tags, count) = (format!("<t{}><common>", i % 5), answers.to_string());
        rows.push(xml_row(&[
            ("Id", id.as_str()),
            ("PostTypeId", "1"),
            ("Score", score.as_str()),
            ("Title", title.as_str()),
            ("Body", body.as_str()),
            ("Tags", tags.as_str()),
            ("AnswerCount", count.as_str()),
        ]));
        waiting.push((qid, answers));
        if waiting.len() > 3 {
            let (parent, n) = waiting.remove(0);
            for k in 0..n {
                next_id += 1;
                rows.push(answer_row(next_id, parent, k as i64 * 2 + 1, &format!("<p>answer {k} to {parent}</p>")));
            }
        }
    }
    for (parent, n) in waiting {
        for k in 0..n {
            next_id += 1;
            rows.push(answer_row(next_id, parent, 4, &format!("<p>late answer {k}</p>")));
        }
    }
    write_xml_dump(&dumps.join("busy").join("Posts.xml"), "posts", &rows);
}

fn read_docs(dir: &Path) -> BTreeMap<String, String> {
    list_names(dir)
        .into_iter()
        .map(|n| {
            let text = fs::read_to_string(dir.join(&n)).unwrap();
            (n, text)
        })
        .collect()
}

#[test]
fn union_of_shards_equals_unsharded_run() {
    let base = tempfile::tempdir().unwrap();
    let dumps = base.path().join("dumps");
    write_busy_site(&dumps);

    let pairer = QaPairer::new()
        .dumps_dir(&dumps)
        .out_format(OutFormat::Txt)
        .seed(2024)
        .max_comments(0)
        .progress(false);

    let whole_out = base.path().join("whole");
    let whole = pairer.clone().out_dir(&whole_out).process_site("busy").unwrap();
    let expected = read_docs(&whole_out.join("busy"));
    assert!(!expected.is_empty());
    assert_eq!(whole.stats.questions as usize, expected.len());

    let shard_out = base.path().join("sharded");
    let mut union = BTreeMap::new();
    let mut rendered = 0;
    for index in 0..3 {
        let report = pairer.clone().out_dir(&shard_out).shards(3, index).process_site("busy").unwrap();
        assert!(report.missing_shard_ids.is_empty());
        assert_eq!(report.shard, Some(ShardSpec { count: 3, index }));
        rendered += report.stats.questions;
        for (name, text) in read_docs(&shard_out.join(format!("busy_{index}"))) {
            assert!(union.insert(name, text).is_none(), "a document was rendered by two shards");
        }
        assert!(shard_out.join(format!("busy_{index}_stats.json")).exists());
    }
    assert_eq!(rendered, whole.stats.questions);
    assert_eq!(union, expected);
}
