use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Node};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, UserAgent};
use crate::error::{AppError, Result};
use crate::store::ScrapeStore;

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

/// Subtrees whose text never counts as page content.
const STRIPPED_TAGS: [&str; 5] = ["script", "style", "iframe", "nav", "footer"];

/// Longest wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts, at least 1.
    pub max_retries: u32,
    pub headers: HeaderMap,
    /// Wait before retry `n` (0-based) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Pause after every successful fetch.
    pub cooldown: Duration,
    /// Bound on the whole retry loop.
    pub deadline: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            headers: default_headers(&UserAgent::Chrome),
            backoff_base: Duration::from_secs(1),
            cooldown: Duration::from_millis(1500),
            deadline: None,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout,
            max_retries: config.max_retries,
            headers: default_headers(&config.user_agent),
            backoff_base: config.backoff_base,
            cooldown: config.cooldown,
            deadline: config.fetch_deadline,
        }
    }
}

pub fn default_headers(user_agent: &UserAgent) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, user_agent.header_value());
    headers
}

/// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`, capped
/// at [`MAX_BACKOFF`]. `None` when no attempt follows.
pub fn backoff_delay(base: Duration, attempt: u32, max_retries: u32) -> Option<Duration> {
    if attempt.saturating_add(1) >= max_retries {
        return None;
    }
    if base.is_zero() {
        return Some(Duration::ZERO);
    }

    let delay = 2u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(MAX_BACKOFF);
    Some(delay.min(MAX_BACKOFF))
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    /// 1-based attempt that succeeded.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    HttpStatus,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeFailure {
    pub url: String,
    pub kind: FailureKind,
    pub error: String,
    pub last_error: Option<String>,
    pub http_status: Option<u16>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScrapeOutcome {
    Success(ScrapedPage),
    Failed(ScrapeFailure),
}

impl ScrapeOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success(_) => "success",
            ScrapeOutcome::Failed(_) => "failed",
        }
    }
}

/// Why a single attempt failed.
enum AttemptError {
    Transport(String),
    Status(u16, String),
}

/// One GET. Non-2xx responses are errors.
async fn fetch_html(url: &str, options: &FetchOptions) -> std::result::Result<String, AttemptError> {
    let response = CLIENT
        .get(url)
        .headers(options.headers.clone())
        .timeout(options.timeout)
        .send()
        .await
        .map_err(|e| AttemptError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptError::Status(
            status.as_u16(),
            format!("HTTP {} for url ({})", status, url),
        ));
    }

    response
        .text()
        .await
        .map_err(|e| AttemptError::Transport(e.to_string()))
}

/// Visible text of a document: text nodes outside stripped subtrees, each
/// trimmed, joined with single spaces.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let stripped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| STRIPPED_TAGS.contains(&e.name()))
        });
        if stripped {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    parts.join(" ")
}

/// Fetches pages with retries and records every non-empty success in the store.
pub struct Fetcher {
    options: FetchOptions,
    store: ScrapeStore,
}

impl Fetcher {
    pub fn new(options: FetchOptions, store: ScrapeStore) -> Self {
        Self { options, store }
    }

    pub async fn fetch(&self, url: &str) -> Result<ScrapeOutcome> {
        self.fetch_with(url, &self.options).await
    }

    /// Fetch failures come back as `ScrapeOutcome::Failed`; only a store
    /// write error is returned as `Err`.
    pub async fn fetch_with(&self, url: &str, options: &FetchOptions) -> Result<ScrapeOutcome> {
        let outcome = match options.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, fetch_with_retries(url, options)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(url, ?deadline, "Fetch deadline exceeded");
                        ScrapeOutcome::Failed(ScrapeFailure {
                            url: url.to_string(),
                            kind: FailureKind::Timeout,
                            error: format!("Fetch deadline of {:?} exceeded", deadline),
                            last_error: None,
                            http_status: None,
                            attempts: 0,
                        })
                    }
                }
            }
            None => fetch_with_retries(url, options).await,
        };

        if let ScrapeOutcome::Success(page) = &outcome {
            if !page.text.is_empty() {
                self.store.save_scrape(
                    &page.url,
                    &page.text,
                    Some(page.word_count),
                    Some(page.char_count),
                )?;
            }
        }

        Ok(outcome)
    }
}

async fn fetch_with_retries(url: &str, options: &FetchOptions) -> ScrapeOutcome {
    let max_retries = options.max_retries.max(1);
    let mut last_error = None;
    let mut last_status = None;

    for attempt in 0..max_retries {
        let start = Instant::now();
        match fetch_html(url, options).await {
            Ok(html) => {
                let text = extract_text(&html);
                let char_count = text.chars().count();
                let word_count = text.split_whitespace().count();
                info!(
                    url,
                    attempt = attempt + 1,
                    char_count,
                    word_count,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Fetched page"
                );

                tokio::time::sleep(options.cooldown).await;

                return ScrapeOutcome::Success(ScrapedPage {
                    url: url.to_string(),
                    text,
                    char_count,
                    word_count,
                    attempt: attempt + 1,
                });
            }
            Err(AttemptError::Status(code, msg)) => {
                warn!(url, attempt = attempt + 1, status = code, "Fetch attempt failed");
                last_status = Some(code);
                last_error = Some(msg);
            }
            Err(AttemptError::Transport(msg)) => {
                warn!(url, attempt = attempt + 1, error = %msg, "Fetch attempt failed");
                last_error = Some(msg);
            }
        }

        if let Some(delay) = backoff_delay(options.backoff_base, attempt, max_retries) {
            tokio::time::sleep(delay).await;
        }
    }

    let error = match last_status {
        Some(code) => format!("HTTP {} - All {} attempts failed", code, max_retries),
        None => format!("All {} attempts failed", max_retries),
    };

    ScrapeOutcome::Failed(ScrapeFailure {
        url: url.to_string(),
        kind: if last_status.is_some() {
            FailureKind::HttpStatus
        } else {
            FailureKind::Transport
        },
        error,
        last_error,
        http_status: last_status,
        attempts: max_retries,
    })
}

/// Rejects blank URLs before any network work.
pub fn validate_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidRequest("URL must not be empty".to_string()));
    }
    Ok(url)
}
