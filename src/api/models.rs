use serde::Deserialize;

#[derive(Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub your_url: String,
    pub competitor_url: String,
}

#[derive(Deserialize)]
pub struct AnalysesQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct ScrapesQuery {
    pub url: String,
    pub limit: Option<u32>,
}
