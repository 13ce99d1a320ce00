use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One row of the announcement listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub date: NaiveDate,
    /// Absolute URL; the identity of the link.
    pub href: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Unknown => "unknown",
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// A case narrative. Only `detail` is set when no pattern matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default)]
    pub live_address: String,
    #[serde(default)]
    pub treatment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub ok: bool,
    pub title: String,
    pub source: String,
    pub date: Option<NaiveDate>,
    pub raw_content: String,
    pub patients: Vec<Patient>,
}

/// Everything the pipeline knows. Loaded at start, saved at the end of every run.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    #[serde(default)]
    pub links: Vec<Link>,
    /// href → raw document text, written once per href.
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
    /// href → extracted page.
    #[serde(default)]
    pub pages: BTreeMap<String, Page>,
}

impl PipelineState {
    pub fn has_link(&self, href: &str) -> bool {
        self.links.iter().any(|l| l.href == href)
    }

    /// Cached or extracted hrefs that were never discovered.
    pub fn orphans(&self) -> Vec<&str> {
        let mut orphans: Vec<&str> = self
            .contents
            .keys()
            .chain(self.pages.keys())
            .map(String::as_str)
            .filter(|href| !self.has_link(href))
            .collect();
        orphans.sort_unstable();
        orphans.dedup();
        orphans
    }
}

/// Missing file yields an empty state.
pub fn load(path: &Path) -> Result<PipelineState> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No state at {:?}, starting empty", path);
            return Ok(PipelineState::default());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };

    let state: PipelineState = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse state file {:?}", path))?;

    for href in state.orphans() {
        warn!("{} is cached or extracted but not among known links", href);
    }
    info!(
        "Loaded state: {} links, {} cached, {} pages",
        state.links.len(),
        state.contents.len(),
        state.pages.len()
    );
    Ok(state)
}

/// Write to a sibling temp file, then rename over `path`.
pub fn save(path: &Path, state: &PipelineState) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let data = serde_json::to_vec_pretty(state).context("Failed to serialize state")?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    tmp.write_all(&data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str) -> Link {
        Link {
            date: NaiveDate::from_ymd_opt(2020, 2, 7).unwrap(),
            href: href.to_string(),
            title: "通报".to_string(),
        }
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, PipelineState::default());
    }

    #[test]
    fn save_then_load_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = PipelineState::default();
        state.links.push(link("http://a.test/1.html"));
        state
            .contents
            .insert("http://a.test/1.html".into(), "<html></html>".into());
        state.pages.insert(
            "http://a.test/1.html".into(),
            Page {
                url: "http://a.test/1.html".into(),
                ok: true,
                patients: vec![Patient {
                    detail: "患者1".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        save(&path, &state).unwrap();
        assert_eq!(load(&path).unwrap(), state);
    }

    #[test]
    fn save_replaces_previous_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        std::fs::write(&path, "stale").unwrap();
        let mut state = PipelineState::default();
        state.links.push(link("http://a.test/2.html"));
        save(&path, &state).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("http://a.test/2.html"));
        assert!(written.contains("\n  "), "state should be indented");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn orphans_lists_undiscovered_hrefs() {
        let mut state = PipelineState::default();
        state.links.push(link("http://a.test/known.html"));
        state
            .contents
            .insert("http://a.test/known.html".into(), String::new());
        state
            .contents
            .insert("http://a.test/stray.html".into(), String::new());
        assert_eq!(state.orphans(), vec!["http://a.test/stray.html"]);
    }
}
