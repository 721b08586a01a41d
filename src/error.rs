//! Error types for track loading, configuration and the fall pipeline.
//!
//! Navigation itself is total: once a [`Track`](crate::gpx::Track) exists,
//! advancing along it cannot fail.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GPX parse error: {0}")]
    Gpx(#[from] ::gpx::errors::GpxError),

    #[error("track needs at least 2 points, got {count}")]
    TooFewPoints { count: usize },

    #[error("no navigable track or route in GPX data")]
    NoTrack,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("fall classifier error: {0}")]
    Classifier(String),
}

pub type Result<T> = std::result::Result<T, Error>;
