#[path = "common/mod.rs"]
mod common;

use common::*;
use qapair::{
    classify, document_name, split_tags, CommentIndex, CommentIndexBuilder, DocumentSerializer, PendingQuestion,
    ScoreBucketer, StoredAnswer,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

fn question(tags: &str, score: Option<i64>) -> PendingQuestion {
    let mut attrs = vec![
        ("Id", "1"),
        ("PostTypeId", "1"),
        ("Title", "Boil an egg?"),
        ("Body", "<p>How long?</p>"),
        ("Tags", tags),
        ("AnswerCount", "2"),
    ];
    let score_text = score.map(|s| s.to_string());
    if let Some(s) = score_text.as_deref() {
        attrs.push(("Score", s));
    }
    PendingQuestion::from_record(classify(&post(&attrs)).unwrap())
}

fn add_answer(q: &mut PendingQuestion, id: u64, score: Option<i64>, body: &str) {
    let seq = q.stored_answers.len() as u64;
    q.stored_answers.insert(id, StoredAnswer { id, body: Some(body.to_string()), score, seq });
}

fn egg_thread() -> (PendingQuestion, CommentIndex) {
    let mut q = question("<eggs>", Some(10));
    add_answer(&mut q, 3, Some(5), "<p>Seven minutes.</p>");
    add_answer(&mut q, 4, Some(-2), "<p>Hard boil.</p>");
    let mut comments = CommentIndexBuilder::new();
    comments.push(1, "try salt");
    comments.push(3, "Agreed.");
    (q, comments.build())
}

/// (block name, sorted attributes) for each block, read back from the marker lines.
fn blocks(text: &str) -> Vec<(String, BTreeSet<String>)> {
    let mut out: Vec<(String, BTreeSet<String>)> = Vec::new();
    for line in text.lines() {
        let (closing, rest) = if let Some(r) = line.strip_prefix("<|/ ") {
            (true, r)
        } else if let Some(r) = line.strip_prefix("<| ") {
            (false, r)
        } else {
            continue;
        };
        let mut parts = rest.trim_end_matches(" |>").split(' ');
        let name = parts.next().unwrap().to_string();
        let attrs: Vec<String> = parts.map(str::to_string).collect();
        if closing {
            let last = out.last_mut().unwrap();
            assert_eq!(last.0, name);
            last.1.extend(attrs);
        } else {
            out.push((name, attrs.into_iter().collect()));
        }
    }
    out
}

#[test]
fn renders_exact_document_with_attributes_in_opening_markers() {
    let (q, comments) = egg_thread();
    let ser = DocumentSerializer::new(3, 5, 0.0);
    let doc = ser.render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(7));
    let expected = "<| q tags=eggs |>\nBoil an egg?\n\nHow long?\n<|/ q |>\n\
                    <| c |>\ntry salt\n<|/ c |>\n\
                    <| a tags=eggs |>\nSeven minutes.\n<|/ a |>\n\
                    <| c |>\nAgreed.\n<|/ c |>\n\
                    <| a tags=eggs |>\nHard boil.\n<|/ a |>";
    assert_eq!(doc.text, expected);
    assert_eq!(doc.answers, 2);
    assert_eq!(doc.tags, vec!["eggs".to_string()]);
}

#[test]
fn probability_one_moves_every_attribute_to_the_closing_marker() {
    let (q, comments) = egg_thread();
    let ser = DocumentSerializer::new(3, 0, 1.0);
    let doc = ser.render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(1));
    assert!(doc.text.starts_with("<| q |>\nBoil an egg?"));
    assert!(doc.text.contains("<|/ q tags=eggs |>"));
    assert!(doc.text.contains("<| a |>\nSeven minutes.\n<|/ a tags=eggs |>"));
    assert!(!doc.text.contains("<| c |>"), "max_comments 0 renders no comments");
}

#[test]
fn non_finite_probability_keeps_attributes_in_opening_markers() {
    let (q, comments) = egg_thread();
    let expected = DocumentSerializer::new(3, 0, 0.0).render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(3));
    for p in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let doc = DocumentSerializer::new(3, 0, p).render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(doc.text, expected.text);
    }
}

#[test]
fn fixed_seed_is_byte_identical() {
    let mut q = question("<eggs><boiling><breakfast>", Some(3));
    add_answer(&mut q, 3, Some(5), "<p>Seven minutes.</p>");
    let ser = DocumentSerializer::new(3, 5, 0.5)
        .with_question_buckets(Some(ScoreBucketer::new(vec![0, 1, 2, 4]).unwrap()))
        .with_answer_buckets(Some(ScoreBucketer::new(vec![0, 3]).unwrap()));
    let comments = CommentIndex::empty();
    let a = ser.render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(99));
    let b = ser.render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(99));
    assert_eq!(a, b);
}

#[test]
fn varying_seed_changes_order_but_not_attributes() {
    let mut q = question("<eggs><boiling><breakfast>", Some(3));
    add_answer(&mut q, 3, Some(5), "<p>Seven minutes.</p>");
    add_answer(&mut q, 4, Some(1), "<p>Ten.</p>");
    let ser = DocumentSerializer::new(3, 5, 0.5)
        .with_question_buckets(Some(ScoreBucketer::new(vec![0, 1, 2, 4]).unwrap()))
        .with_answer_buckets(Some(ScoreBucketer::new(vec![0, 3]).unwrap()));
    let comments = CommentIndex::empty();

    let mut texts = BTreeSet::new();
    let mut shapes = BTreeSet::new();
    for seed in 0..32 {
        let doc = ser.render(&q, &comments, &mut ChaCha8Rng::seed_from_u64(seed));
        let parsed = blocks(&doc.text);
        // tag order is shared by every block of a document
        let tag_values: BTreeSet<String> = parsed
            .iter()
            .flat_map(|(_, attrs)| attrs.iter().filter(|a| a.starts_with("tags=")).cloned())
            .collect();
        assert_eq!(tag_values.len(), 1, "{}", doc.text);

        let normalized: Vec<(String, BTreeSet<String>)> = parsed
            .into_iter()
            .map(|(name, attrs)| {
                let attrs: BTreeSet<String> = attrs
                    .into_iter()
                    .map(|a| match a.strip_prefix("tags=") {
                        Some(v) => {
                            let mut t: Vec<&str> = v.split(',').collect();
                            t.sort();
                            format!("tags={}", t.join(","))
                        }
                        None => a,
                    })
                    .collect();
                (name, attrs)
            })
            .collect();
        shapes.insert(normalized);
        texts.insert(doc.text);
    }
    assert_eq!(shapes.len(), 1, "attribute sets must not depend on the seed");
    assert!(texts.len() > 1, "placement/order should vary with the seed");

    let shape = shapes.into_iter().next().unwrap();
    let q_attrs = &shape[0].1;
    assert!(q_attrs.contains("tags=boiling,breakfast,eggs"));
    assert!(q_attrs.contains("dscore=2"));
    assert!(shape[1].1.contains("dscore=1"));
    assert!(shape[2].1.contains("dscore=0"));
}

#[test]
fn missing_table_or_score_means_no_dscore() {
    let mut q = question("<eggs>", None);
    add_answer(&mut q, 3, None, "<p>Seven minutes.</p>");
    let ser = DocumentSerializer::new(3, 5, 0.0)
        .with_question_buckets(Some(ScoreBucketer::new(vec![0, 1]).unwrap()));
    let doc = ser.render(&q, &CommentIndex::empty(), &mut ChaCha8Rng::seed_from_u64(3));
    assert!(!doc.text.contains("dscore"), "{}", doc.text);

    let mut q = question("<eggs>", Some(5));
    add_answer(&mut q, 3, Some(5), "<p>Seven minutes.</p>");
    let doc = ser.render(&q, &CommentIndex::empty(), &mut ChaCha8Rng::seed_from_u64(3));
    assert_eq!(doc.text.matches("dscore").count(), 1, "only the question has a table");
}

#[test]
fn answers_are_ranked_by_score_then_arrival_and_capped() {
    let mut q = question("<eggs>", Some(1));
    add_answer(&mut q, 10, Some(2), "<p>second-a</p>");
    add_answer(&mut q, 11, Some(9), "<p>top</p>");
    add_answer(&mut q, 12, Some(2), "<p>second-b</p>");
    add_answer(&mut q, 13, None, "<p>unscored</p>");
    let ser = DocumentSerializer::new(3, 0, 0.0);

    let picked: Vec<u64> = ser.select_answers(&q).iter().map(|a| a.id).collect();
    assert_eq!(picked, vec![11, 10, 12]);

    let doc = ser.render(&q, &CommentIndex::empty(), &mut ChaCha8Rng::seed_from_u64(0));
    let top = doc.text.find("top").unwrap();
    let a = doc.text.find("second-a").unwrap();
    let b = doc.text.find("second-b").unwrap();
    assert!(top < a && a < b);
    assert!(!doc.text.contains("unscored"));
}

#[test]
fn mentions_and_blank_runs_are_cleaned() {
    let mut q = question("<eggs>", Some(1));
    q.body = Some("<p>@alice thanks, mail me@example.com</p>\n\n\n\n<p>bye</p>".to_string());
    add_answer(&mut q, 3, Some(5), "<p>ok @bob</p>");
    let ser = DocumentSerializer::new(3, 0, 0.0);
    let doc = ser.render(&q, &CommentIndex::empty(), &mut ChaCha8Rng::seed_from_u64(0));
    assert!(doc.text.contains("thanks, mail me@example.com\n\nbye"), "{}", doc.text);
    assert!(!doc.text.contains("@alice"));
    assert!(doc.text.contains("\nok\n"));
    assert!(!doc.text.contains("\n\n\n"));
}

#[test]
fn tag_splitting_and_names() {
    assert_eq!(split_tags("<rust><serde>"), vec!["rust", "serde"]);
    assert_eq!(split_tags("|rust|c++|"), vec!["rust", "c++"]);
    assert!(split_tags("").is_empty());
    assert_eq!(document_name("cooking", 42), "cooking_0000000042.txt");
}

#[test]
fn untagged_question_gets_no_tags_attribute() {
    let mut q = question("", Some(1));
    q.tags = None;
    add_answer(&mut q, 3, Some(5), "<p>fine</p>");
    let doc = DocumentSerializer::new(3, 0, 0.0).render(&q, &CommentIndex::empty(), &mut ChaCha8Rng::seed_from_u64(0));
    assert!(doc.text.starts_with("<| q |>"));
    assert!(doc.tags.is_empty());
}
