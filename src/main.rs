use anyhow::{bail, Result};
use qapair::{BoundaryTables, OutFormat, QaPairer};
use std::path::PathBuf;
use std::sync::Arc;

const DUMPS_ROOT: &str = "./dumps";
const OUT_ROOT: &str = "./out";
const BOUNDARY_TABLES: &str = "./dscore_bounds.json";

fn main() -> Result<()> {
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(8);

    let mut sites: Vec<String> = std::env::args().skip(1).collect();
    if sites.is_empty() {
        sites.push("all".to_string());
    }

    let mut pairer = QaPairer::new()
        .dumps_dir(DUMPS_ROOT)
        .out_dir(OUT_ROOT)
        .out_format(OutFormat::JsonlZst)
        .parallelism(hw)
        .site_concurrency((hw / 2).max(1))
        .min_score(3)
        .max_responses(3)
        .max_comments(5)
        .tokenizer(Arc::new(qapair::WhitespaceTokenizer))
        .progress(true);

    let tables = PathBuf::from(BOUNDARY_TABLES);
    if tables.is_file() {
        pairer = pairer.boundary_tables(BoundaryTables::from_json_file(&tables)?);
    }

    let batch = pairer.process_sites(&sites);
    for r in &batch.completed {
        println!(
            "{}: {} documents, {} answers ({:.2}/question)",
            r.site,
            r.stats.questions,
            r.stats.answers,
            r.stats.answers_per_question()
        );
    }
    if !batch.failed.is_empty() {
        let names: Vec<&str> = batch.failed.iter().map(|(s, _)| s.as_str()).collect();
        bail!("{} site(s) failed: {}", names.len(), names.join(", "));
    }
    Ok(())
}
