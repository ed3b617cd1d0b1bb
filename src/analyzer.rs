use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{AppError, Result};

pub const DEFAULT_TOP_KEYWORDS: usize = 5;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("Failed to compile punctuation pattern"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapReport {
    pub similarity_score: f64,
    pub word_count_diff: i64,
    pub top_missing_keywords: Vec<String>,
    pub unique_keywords: Vec<String>,
}

/// Lowercases and drops everything that is neither a word char nor whitespace.
pub fn preprocess_text(text: &str) -> String {
    NON_WORD.replace_all(&text.to_lowercase(), "").into_owned()
}

/// The `top_n` most frequent tokens of an already cleaned text. Equal counts
/// keep first-occurrence order. Function words are not filtered out.
pub fn top_keywords(clean: &str, top_n: usize) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for token in clean.split_whitespace() {
        match positions.get(token) {
            Some(&i) => counts[i].1 += 1,
            None => {
                positions.insert(token, counts.len());
                counts.push((token, 1));
            }
        }
    }

    // sort_by is stable, so ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(top_n)
        .map(|(word, _)| word.to_string())
        .collect()
}

/// Items of `from` that are absent from `other`, in `from`'s order.
fn difference(from: &[String], other: &[String]) -> Vec<String> {
    let other: HashSet<&str> = other.iter().map(String::as_str).collect();
    from.iter()
        .filter(|k| !other.contains(k.as_str()))
        .cloned()
        .collect()
}

fn inner_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

pub struct ContentAnalyzer {
    embedder: Arc<dyn Embedder>,
    top_n: usize,
}

impl ContentAnalyzer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_top_keywords(embedder, DEFAULT_TOP_KEYWORDS)
    }

    pub fn with_top_keywords(embedder: Arc<dyn Embedder>, top_n: usize) -> Self {
        Self {
            embedder,
            top_n: top_n.max(1),
        }
    }

    /// Compares `your_text` against `competitor_text`.
    pub async fn generate_gap_report(
        &self,
        your_text: &str,
        competitor_text: &str,
    ) -> Result<GapReport> {
        let your_clean = preprocess_text(your_text);
        let competitor_clean = preprocess_text(competitor_text);

        let embeddings = self
            .embedder
            .embed(&[your_clean.clone(), competitor_clean.clone()])
            .await?;
        let [yours, theirs] = embeddings.as_slice() else {
            return Err(AppError::EmbeddingError(format!(
                "Expected 2 embeddings, got {}",
                embeddings.len()
            )));
        };
        if yours.len() != theirs.len() {
            return Err(AppError::EmbeddingError(format!(
                "Embedding dimension mismatch: {} vs {}",
                yours.len(),
                theirs.len()
            )));
        }

        let similarity_score = inner_product(yours, theirs);
        if !similarity_score.is_finite() {
            return Err(AppError::AnalysisError(format!(
                "Similarity is not a finite number: {}",
                similarity_score
            )));
        }

        let your_keywords = top_keywords(&your_clean, self.top_n);
        let competitor_keywords = top_keywords(&competitor_clean, self.top_n);

        let word_count_diff = competitor_clean.split_whitespace().count() as i64
            - your_clean.split_whitespace().count() as i64;

        debug!(
            model = self.embedder.model_name(),
            similarity_score, word_count_diff, "Generated gap report"
        );

        Ok(GapReport {
            similarity_score,
            word_count_diff,
            top_missing_keywords: difference(&competitor_keywords, &your_keywords),
            unique_keywords: difference(&your_keywords, &competitor_keywords),
        })
    }
}
