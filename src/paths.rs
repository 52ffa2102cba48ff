use crate::config::InputFormat;
use crate::progress::file_size;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Dump files for one site: `<dumps_dir>/<site>/Posts.<ext>[.zst]` and, optionally,
/// `<dumps_dir>/<site>/Comments.<ext>[.zst]`.
#[derive(Clone, Debug)]
pub struct SitePaths {
    pub site: String,
    pub posts: PathBuf,
    pub comments: Option<PathBuf>,
}

fn find_dump(dir: &Path, stem: &str, format: InputFormat) -> Option<PathBuf> {
    let plain = dir.join(format!("{stem}.{}", format.extension()));
    if plain.is_file() {
        return Some(plain);
    }
    let zst = dir.join(format!("{stem}.{}.zst", format.extension()));
    zst.is_file().then_some(zst)
}

impl SitePaths {
    pub fn locate(dumps_dir: &Path, site: &str, format: InputFormat) -> Result<Self> {
        let dir = dumps_dir.join(site);
        let Some(posts) = find_dump(&dir, "Posts", format) else {
            bail!(
                "no Posts.{ext} (or Posts.{ext}.zst) for site {site} under {}",
                dir.display(),
                ext = format.extension()
            );
        };
        let comments = find_dump(&dir, "Comments", format);
        Ok(Self { site: site.to_string(), posts, comments })
    }
}

/// Every site directory under `dumps_dir` holding a posts dump, largest posts file first.
/// `stackoverflow` always leads when present.
pub fn discover_sites(dumps_dir: &Path, format: InputFormat) -> Vec<String> {
    let mut found: Vec<(String, u64)> = Vec::new();
    if !dumps_dir.exists() {
        return Vec::new();
    }
    for ent in WalkDir::new(dumps_dir).min_depth(1).max_depth(1).into_iter().flatten() {
        if !ent.file_type().is_dir() {
            continue;
        }
        let Some(name) = ent.file_name().to_str() else { continue };
        if let Some(posts) = find_dump(ent.path(), "Posts", format) {
            found.push((name.to_string(), file_size(&posts)));
        }
    }
    found.sort_by(|a, b| {
        let so = |s: &str| s != "stackoverflow";
        so(&a.0).cmp(&so(&b.0)).then(b.1.cmp(&a.1)).then_with(|| a.0.cmp(&b.0))
    });
    found.into_iter().map(|(name, _)| name).collect()
}
