use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::{ContentAnalyzer, GapReport};
use crate::error::{AppError, Result, ScrapeFailureDetails};
use crate::scraper::{Fetcher, ScrapeOutcome, ScrapedPage};
use crate::store::ScrapeStore;

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub your_content: ScrapedPage,
    pub competitor_content: ScrapedPage,
    pub analysis: GapReport,
}

/// Fetches both pages concurrently, analyzes them and stores the analysis.
///
/// Scrapes written before a later failure stay in the store.
pub async fn compare_with_competitor(
    fetcher: &Fetcher,
    analyzer: &ContentAnalyzer,
    store: &ScrapeStore,
    your_url: &str,
    competitor_url: &str,
) -> Result<Comparison> {
    let (yours, competitor) =
        tokio::join!(fetcher.fetch(your_url), fetcher.fetch(competitor_url));
    let (yours, competitor) = (yours?, competitor?);

    let (your_content, competitor_content) = match (yours, competitor) {
        (ScrapeOutcome::Success(a), ScrapeOutcome::Success(b)) => (a, b),
        (yours, competitor) => {
            let details = ScrapeFailureDetails { yours, competitor };
            warn!(your_url, competitor_url, %details, "Comparison aborted");
            return Err(AppError::ScrapeFailed(Box::new(details)));
        }
    };

    let analysis = analyzer
        .generate_gap_report(&your_content.text, &competitor_content.text)
        .await?;

    store.save_analysis(
        your_url,
        competitor_url,
        analysis.similarity_score,
        Some(analysis.top_missing_keywords.as_slice()),
    )?;

    info!(
        your_url,
        competitor_url,
        similarity = analysis.similarity_score,
        missing = analysis.top_missing_keywords.len(),
        "Comparison stored"
    );

    Ok(Comparison {
        your_content,
        competitor_content,
        analysis,
    })
}
