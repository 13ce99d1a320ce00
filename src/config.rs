use std::path::PathBuf;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "SXWJW";

const DEFAULT_ORIGIN: &str = "http://sxwjw.shaanxi.gov.cn";
const DEFAULT_LISTING_URL: &str =
    "http://sxwjw.shaanxi.gov.cn/col/col9/index.html?uid=572&pageNum={page}";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Persisted pipeline state (links, cached content, extracted pages).
    pub state_path: PathBuf,
    /// Ordered case list written by the `patient` report.
    pub patients_path: PathBuf,
    /// Prefixed to relative hrefs found on listing pages.
    pub origin: String,
    /// Listing page URL; `{page}` is replaced by the 1-based page number.
    pub listing_url: String,
    pub max_listing_pages: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Settings {
    /// Defaults overridden by `SXWJW_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("state_path", "./state.json")?
            .set_default("patients_path", "./patient.json")?
            .set_default("origin", DEFAULT_ORIGIN)?
            .set_default("listing_url", DEFAULT_LISTING_URL)?
            .set_default("max_listing_pages", 999_i64)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("user_agent", concat!("sxwjw_cases/", env!("CARGO_PKG_VERSION")))?
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    pub fn listing_page_url(&self, page: u32) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }
}
