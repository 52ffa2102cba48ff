//! Concurrency helper: limit the number of sites processed in parallel.

use rayon::prelude::*;

/// At most `limit` sites in flight. `f` sees every site; it owns its own error handling.
pub fn for_each_site_limited<F>(sites: &[String], limit: usize, f: F)
where
    F: Sync + Fn(&str),
{
    if limit <= 1 {
        for site in sites {
            f(site);
        }
        return;
    }
    for chunk in sites.chunks(limit) {
        chunk.par_iter().for_each(|site| f(site));
    }
}
