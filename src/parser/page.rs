use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

use super::patient::extract_patient;
use crate::state::{Link, Page};

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#c > tbody > tr:nth-child(1) > td").unwrap());
static SOURCE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#c > tbody > tr:nth-child(2) > td > table > tbody > tr > td:nth-child(1)")
        .unwrap()
});
static DATE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#c > tbody > tr:nth-child(2) > td > table > tbody > tr > td:nth-child(2)")
        .unwrap()
});
static PARAGRAPH_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#zoom > p").unwrap());

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*([0-9]{4}-[0-9]{2}-[0-9]{2}).*").unwrap());

const SOURCE_LABEL: &str = "来源：";

fn select_text(doc: &Html, sel: &Selector) -> String {
    doc.select(sel).flat_map(|el| el.text()).collect()
}

/// Drop all whitespace and turn full-width commas into ASCII ones.
pub fn normalize_paragraph(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '，' { ',' } else { c })
        .collect()
}

fn parse_published_date(cell: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(cell)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// Parse one announcement page. Without a publish date the page is marked
/// `ok = false` and its paragraphs are not examined.
pub fn extract_page(url: &str, html: &str) -> Page {
    let doc = Html::parse_document(html);
    let mut page = Page {
        url: url.to_string(),
        title: select_text(&doc, &TITLE_SEL).trim().to_string(),
        source: select_text(&doc, &SOURCE_SEL)
            .replace(SOURCE_LABEL, "")
            .trim()
            .to_string(),
        ..Default::default()
    };

    let Some(date) = parse_published_date(&select_text(&doc, &DATE_SEL)) else {
        warn!("No publish date found on {}", url);
        return page;
    };

    let mut raw = String::new();
    for paragraph in doc.select(&PARAGRAPH_SEL) {
        let text = normalize_paragraph(&paragraph.text().collect::<String>());
        raw.push_str(&text);
        raw.push('\n');
        page.patients.extend(extract_patient(&text, date));
    }

    page.ok = true;
    page.date = Some(date);
    page.raw_content = raw;
    page
}

#[derive(Debug)]
pub struct PageStats {
    pub extracted: usize,
    pub failed: usize,
    pub uncached: usize,
    pub patients: usize,
}

/// Re-derive a page for every cached link. Reads `links` and `contents`,
/// writes `pages`.
pub fn extract_pages(
    links: &[Link],
    contents: &BTreeMap<String, String>,
    pages: &mut BTreeMap<String, Page>,
) -> Result<PageStats> {
    let mut stats = PageStats {
        extracted: 0,
        failed: 0,
        uncached: 0,
        patients: 0,
    };

    let pb = ProgressBar::new(links.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    for link in links {
        pb.inc(1);
        let Some(html) = contents.get(&link.href) else {
            stats.uncached += 1;
            continue;
        };

        let page = extract_page(&link.href, html);
        if page.ok {
            stats.extracted += 1;
        } else {
            stats.failed += 1;
        }
        stats.patients += page.patients.len();
        pages.insert(link.href.clone(), page);
    }

    pb.finish_and_clear();
    if stats.uncached > 0 {
        warn!("{} links have no cached content yet; run the raw stage", stats.uncached);
    }
    info!(
        "Extracted {} pages ({} without a date), {} cases",
        stats.extracted, stats.failed, stats.patients
    );
    Ok(stats)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Gender;

    const URL: &str = "http://sxwjw.shaanxi.gov.cn/art/2020/2/7/art_9_1003.html";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn normalize_strips_spaces_and_commas() {
        assert_eq!(normalize_paragraph("患者4，男， 63岁\u{3000}x\n"), "患者4,男,63岁x");
    }

    #[test]
    fn article_metadata() {
        let page = extract_page(URL, &fixture("article"));
        assert!(page.ok);
        assert_eq!(page.url, URL);
        assert_eq!(page.title, "2月7日陕西省新型冠状病毒感染的肺炎疫情通报");
        assert_eq!(page.source, "陕西省卫生健康委员会");
        assert_eq!(page.date, NaiveDate::from_ymd_opt(2020, 2, 7));
    }

    #[test]
    fn article_cases() {
        let page = extract_page(URL, &fixture("article"));
        assert_eq!(page.patients.len(), 4);

        let ids: Vec<Option<&str>> = page.patients.iter().map(|p| p.id.as_deref()).collect();
        assert_eq!(
            ids,
            vec![
                Some("2020-02-07:4"),
                Some("2020-02-07:3"),
                Some("2020-02-07:6"),
                None
            ]
        );

        let p6 = &page.patients[2];
        assert_eq!(p6.gender, Gender::Female);
        assert_eq!(p6.age, Some(27));
        assert_eq!(p6.live_address, "安康市白河县");
        assert_eq!(p6.treatment, "在白河县医院隔离治疗");

        assert_eq!(page.patients[3].detail, "患者情况详见附件。");
    }

    #[test]
    fn raw_content_holds_every_paragraph() {
        let page = extract_page(URL, &fixture("article"));
        let lines: Vec<&str> = page.raw_content.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("新增确诊病例4例"));
        assert!(page.raw_content.ends_with('\n'));
        assert!(!page.raw_content.contains('，'));
    }

    #[test]
    fn missing_date_fails_whole_page() {
        let page = extract_page(URL, &fixture("article_no_date"));
        assert!(!page.ok);
        assert_eq!(page.date, None);
        assert!(page.patients.is_empty());
        assert!(page.raw_content.is_empty());
        assert_eq!(page.source, "办公室");
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = fixture("article");
        let a = extract_page(URL, &html);
        let b = extract_page(URL, &html);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn stage_skips_uncached_links() {
        let date = NaiveDate::from_ymd_opt(2020, 2, 7).unwrap();
        let links = vec![
            Link {
                date,
                href: URL.into(),
                title: String::new(),
            },
            Link {
                date,
                href: "http://sxwjw.shaanxi.gov.cn/b.html".into(),
                title: String::new(),
            },
        ];
        let contents = BTreeMap::from([(URL.to_string(), fixture("article"))]);
        let mut pages = BTreeMap::new();

        let stats = extract_pages(&links, &contents, &mut pages).unwrap();
        assert_eq!(stats.extracted, 1);
        assert_eq!(stats.uncached, 1);
        assert_eq!(stats.patients, 4);
        assert_eq!(pages.len(), 1);
        assert!(pages.contains_key(URL));
    }
}
