use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::state::Link;

/// Return the cached text for `href`, fetching it first if absent.
/// A failed fetch leaves the map untouched.
pub fn ensure<'a>(
    fetcher: &dyn Fetch,
    contents: &'a mut BTreeMap<String, String>,
    href: &str,
) -> Result<&'a str, FetchError> {
    let text = match contents.entry(href.to_string()) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => {
            let body = fetcher.get(href)?;
            e.insert(body)
        }
    };
    Ok(text.as_str())
}

#[derive(Debug)]
pub struct CacheStats {
    pub fetched: usize,
    pub cached: usize,
}

/// Fill the cache for every known link, in discovery order. Stops at the first
/// failed fetch; entries fetched before it stay in `contents`.
pub fn fetch_missing(
    fetcher: &dyn Fetch,
    links: &[Link],
    contents: &mut BTreeMap<String, String>,
) -> Result<CacheStats> {
    let missing = links
        .iter()
        .filter(|l| !contents.contains_key(&l.href))
        .count();
    let mut stats = CacheStats {
        fetched: 0,
        cached: links.len() - missing,
    };
    if missing == 0 {
        info!("All {} links already cached", links.len());
        return Ok(stats);
    }

    let pb = ProgressBar::new(missing as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for link in links {
        if contents.contains_key(&link.href) {
            continue;
        }
        let result = ensure(fetcher, contents, &link.href);
        if let Err(e) = result {
            pb.abandon();
            return Err(e.into());
        }
        stats.fetched += 1;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} already cached)", stats.fetched, stats.cached);
    Ok(stats)
}
