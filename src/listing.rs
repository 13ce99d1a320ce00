use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::state::Link;

/// One `<li>` of the announcement index: relative href, title, date.
static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a href="([^"]+)" target="_blank">([^<]+)</a><span>([0-9]{4}-[0-9]{2}-[0-9]{2})</span></li>"#,
    )
    .unwrap()
});

/// Parse every listing row in page order, resolving hrefs against `origin`.
pub fn parse_listing(html: &str, origin: &str) -> Vec<Link> {
    ROW_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let date = match NaiveDate::parse_from_str(&caps[3], "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => {
                    warn!("Skipping listing row with invalid date {:?}", &caps[3]);
                    return None;
                }
            };
            Some(Link {
                date,
                href: absolutize(origin, &caps[1]),
                title: caps[2].trim().to_string(),
            })
        })
        .collect()
}

fn absolutize(origin: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

/// Walk listing pages newest-first, appending unseen links to `links` as each
/// page is processed. Stops on the first page that contains an already known
/// link or no new link at all. Returns the links added by this call.
pub fn discover_new_links(
    fetcher: &dyn Fetch,
    settings: &Settings,
    links: &mut Vec<Link>,
) -> Result<Vec<Link>, FetchError> {
    let mut added = Vec::new();

    for page in 1..=settings.max_listing_pages {
        let url = settings.listing_page_url(page);
        let html = fetcher.get(&url)?;
        let rows = parse_listing(&html, &settings.origin);

        let mut caught_up = false;
        let mut fresh = 0usize;
        for row in rows {
            if links.iter().any(|l| l.href == row.href) {
                caught_up = true;
            } else {
                info!("New link {} {} {}", row.date, row.title, row.href);
                links.push(row.clone());
                added.push(row);
                fresh += 1;
            }
        }
        debug!("Listing page {}: {} new", page, fresh);

        if caught_up || fresh == 0 {
            break;
        }
    }

    info!("Discovered {} new links ({} total)", added.len(), links.len());
    Ok(added)
}

// ── Tests ──
