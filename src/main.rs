mod cache;
mod case_id;
mod config;
mod error;
mod fetch;
mod listing;
mod parser;
mod report;
mod state;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use crate::config::Settings;
use crate::fetch::{Fetch, HttpFetcher};
use crate::state::PipelineState;

#[derive(Parser)]
#[command(
    name = "sxwjw_cases",
    about = "Harvest case bulletins from the Shaanxi health commission site"
)]
struct Cli {
    /// Stage to run (link, raw, page, count_patients, patient, unprocess, inspect)
    #[arg(env = "STAGE")]
    stage: Option<String>,
    /// State file to use instead of the configured one
    #[arg(long)]
    state: Option<PathBuf>,
    /// Page to fetch and parse for the inspect stage
    #[arg(long)]
    url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Discover new announcement links
    Link,
    /// Fetch raw content for links not cached yet
    Raw,
    /// Extract pages and cases from cached content
    Page,
    CountPatients,
    /// CSV case report plus the JSON case list
    Patient,
    /// Bulletin-looking pages that yielded no case
    Unprocess,
    /// Fetch and parse a single URL without touching state
    Inspect,
}

impl Stage {
    const ALL: [Stage; 7] = [
        Stage::Link,
        Stage::Raw,
        Stage::Page,
        Stage::CountPatients,
        Stage::Patient,
        Stage::Unprocess,
        Stage::Inspect,
    ];

    fn name(self) -> &'static str {
        match self {
            Stage::Link => "link",
            Stage::Raw => "raw",
            Stage::Page => "page",
            Stage::CountPatients => "count_patients",
            Stage::Patient => "patient",
            Stage::Unprocess => "unprocess",
            Stage::Inspect => "inspect",
        }
    }

    fn from_name(name: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.name() == name)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(path) = &cli.state {
        settings.state_path = path.clone();
    }
    let fetcher = HttpFetcher::new(&settings)?;

    let result = run(cli.stage.as_deref(), cli.url.as_deref(), &settings, &fetcher);

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {:.1?}", elapsed);
    }
    result
}

/// Load state, run one stage, then save whatever the stage produced, even
/// when it failed. The stage error wins over a save error.
fn run(
    stage: Option<&str>,
    url: Option<&str>,
    settings: &Settings,
    fetcher: &dyn Fetch,
) -> Result<()> {
    let mut state = state::load(&settings.state_path)?;

    let result = match stage.and_then(Stage::from_name) {
        Some(stage) => run_stage(stage, url, settings, fetcher, &mut state)
            .with_context(|| format!("{} stage failed", stage.name())),
        None => {
            let names: Vec<&str> = Stage::ALL.iter().map(|s| s.name()).collect();
            println!("STAGE = ({})", names.join("|"));
            Ok(())
        }
    };

    let saved = state::save(&settings.state_path, &state)
        .with_context(|| format!("Failed to save state to {:?}", settings.state_path));

    match (result, saved) {
        (Err(stage_err), Err(save_err)) => {
            error!("{:#}", save_err);
            Err(stage_err)
        }
        (result, saved) => result.and(saved),
    }
}

fn run_stage(
    stage: Stage,
    url: Option<&str>,
    settings: &Settings,
    fetcher: &dyn Fetch,
    state: &mut PipelineState,
) -> Result<()> {
    match stage {
        Stage::Link => {
            let added = listing::discover_new_links(fetcher, settings, &mut state.links)?;
            println!("{} new links ({} total)", added.len(), state.links.len());
        }
        Stage::Raw => {
            let stats = cache::fetch_missing(fetcher, &state.links, &mut state.contents)?;
            println!("{} fetched, {} already cached", stats.fetched, stats.cached);
        }
        Stage::Page => {
            let stats =
                parser::page::extract_pages(&state.links, &state.contents, &mut state.pages)?;
            println!(
                "{} pages extracted ({} without a date, {} not cached), {} cases",
                stats.extracted, stats.failed, stats.uncached, stats.patients
            );
        }
        Stage::CountPatients => {
            let count = report::count_cases(&state.pages);
            println!("patients number: {}", count.total);
            println!("has ID: {}", count.with_id);
        }
        Stage::Patient => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            report::write_case_report(&state.pages, &mut out, &settings.patients_path)?;
        }
        Stage::Unprocess => {
            for page in report::unprocessed_pages(&state.pages) {
                println!("{}", serde_json::to_string_pretty(page)?);
            }
        }
        Stage::Inspect => {
            let url = url.context("inspect needs --url")?;
            let html = fetcher.get(url)?;
            let page = parser::page::extract_page(url, &html);
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }
    Ok(())
}
