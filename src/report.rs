use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::case_id::CaseId;
use crate::error::CaseIdError;
use crate::state::{Page, Patient};

pub const CSV_HEADER: &str = "#id,address,age,gender,live_address,treatment_address";

/// Tokens removed from a residence before the city is read off it.
const ADDRESS_FILLERS: &[&str] = &["陕西省", "长期在", "居住"];

/// City tokens that need their province spelled out.
const CITY_REMAP: &[(&str, &str)] = &[("武汉", "湖北省武汉")];

/// Pages whose text mentions one of these but yielded no case.
const OUTBREAK_KEYWORDS: &[&str] = &["新冠", "新型冠状", "境外输入"];

pub struct CaseCount {
    pub total: usize,
    pub with_id: usize,
}

pub fn count_cases(pages: &BTreeMap<String, Page>) -> CaseCount {
    let patients = pages.values().flat_map(|p| &p.patients);
    let (total, with_id) = patients.fold((0, 0), |(total, with_id), p| {
        (total + 1, with_id + usize::from(p.id.is_some()))
    });
    CaseCount { total, with_id }
}

/// Identified cases in id order, followed by unparsed ones in page order.
pub fn ordered_cases(pages: &BTreeMap<String, Page>) -> Result<Vec<&Patient>, CaseIdError> {
    let (identified, unparsed): (Vec<&Patient>, Vec<&Patient>) = pages
        .values()
        .flat_map(|p| &p.patients)
        .partition(|p| p.id.is_some());

    let mut keyed = Vec::with_capacity(identified.len());
    for p in identified {
        let id: CaseId = p.id.as_deref().unwrap_or_default().parse()?;
        keyed.push((id, p));
    }
    keyed.sort_by_key(|(id, _)| *id);

    Ok(keyed.into_iter().map(|(_, p)| p).chain(unparsed).collect())
}

/// Returns `(city, cleaned residence)`.
pub fn normalize_address(live_address: &str) -> (String, String) {
    let cleaned = ADDRESS_FILLERS
        .iter()
        .fold(live_address.to_string(), |acc, filler| acc.replace(filler, ""));

    let city = cleaned.split('市').next().unwrap_or_default();
    let city = CITY_REMAP
        .iter()
        .find(|(from, _)| *from == city)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| city.to_string());

    (city, cleaned)
}

fn csv_line(p: &Patient) -> String {
    let (city, cleaned) = normalize_address(&p.live_address);
    format!(
        "{},{},{},{},{},{}",
        p.id.as_deref().unwrap_or_default(),
        city,
        p.age.map(|a| a.to_string()).unwrap_or_default(),
        p.gender.as_str(),
        cleaned,
        p.treatment
    )
}

/// Write one CSV line per identified case to `out`, and the full ordered case
/// list as JSON to `json_path`.
pub fn write_case_report(
    pages: &BTreeMap<String, Page>,
    out: &mut impl Write,
    json_path: &Path,
) -> Result<()> {
    let cases = ordered_cases(pages).context("Cannot order cases")?;

    writeln!(out, "{}", CSV_HEADER)?;
    let mut unparsed = 0usize;
    for p in &cases {
        if p.id.is_none() {
            unparsed += 1;
            continue;
        }
        writeln!(out, "{}", csv_line(p))?;
    }
    if unparsed > 0 {
        warn!("{} unparsed cases left out of the CSV (kept in {:?})", unparsed, json_path);
    }

    let data = serde_json::to_vec_pretty(&cases).context("Failed to serialize cases")?;
    std::fs::write(json_path, data)
        .with_context(|| format!("Failed to write {:?}", json_path))?;
    info!("Wrote {} cases to {:?}", cases.len(), json_path);
    Ok(())
}

/// Pages with no extracted case whose text still looks like a case bulletin.
pub fn unprocessed_pages(pages: &BTreeMap<String, Page>) -> Vec<&Page> {
    pages
        .values()
        .filter(|p| p.patients.is_empty())
        .filter(|p| OUTBREAK_KEYWORDS.iter().any(|k| p.raw_content.contains(k)))
        .collect()
}

// ── Tests ──
