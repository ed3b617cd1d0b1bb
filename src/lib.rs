pub mod analyzer;
pub mod api;
pub mod compare;
pub mod config;
pub mod embedding;
pub mod error;
pub mod scraper;
pub mod store;

use std::sync::Arc;

use crate::analyzer::ContentAnalyzer;
use crate::config::Config;
use crate::embedding::HttpEmbedder;
use crate::error::Result;
use crate::scraper::{FetchOptions, Fetcher};
use crate::store::ScrapeStore;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ScrapeStore,
    pub fetcher: Arc<Fetcher>,
    /// `None` when no embedding provider is configured.
    pub analyzer: Option<Arc<ContentAnalyzer>>,
}

impl AppState {
    /// Opens the store and wires the fetcher and analyzer from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = ScrapeStore::open(&config.database_path)?;
        let fetcher = Fetcher::new(FetchOptions::from_config(&config), store.clone());
        let analyzer = match &config.embedding {
            Some(embedding) => Some(Arc::new(ContentAnalyzer::with_top_keywords(
                Arc::new(HttpEmbedder::new(embedding)?),
                config.top_keywords,
            ))),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            fetcher: Arc::new(fetcher),
            analyzer,
        })
    }
}
