use thiserror::Error;

/// Fatal-class errors. Everything else (extraction misses, challenge pages,
/// analytics failures) is absorbed inside the pipeline and never surfaces here.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("navigation to {url} failed after {attempts} attempt(s): {message}")]
    Navigation {
        url: String,
        attempts: u32,
        message: String,
    },
}
