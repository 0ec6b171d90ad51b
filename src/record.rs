use chrono::{DateTime, Utc};
use serde::Serialize;

/// One scraped wine. `name` is the only required field; a page where the
/// name cannot be resolved produces no record at all.
#[derive(Debug, Clone, Serialize)]
pub struct WineRecord {
    pub url: String,
    pub name: String,
    pub appellation: Option<String>,
    pub rating: Option<u32>,
    pub style: Option<String>,
    pub search_rank: Option<u32>,
    pub avg_price: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Run totals returned after the listing has been worked through.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
}
