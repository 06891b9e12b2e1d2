//! Remote feed access.
//!
//! `RemoteFetcher` is the seam the synchronizers depend on; `FeedClient` is
//! the HTTP implementation used by the binary.

pub mod client;
pub mod error;

pub use client::FeedClient;
pub use error::FetchError;

use async_trait::async_trait;

use crate::models::{CompetitionPayload, EventPayload, SportPayload};

/// Trait that every feed source must implement.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_sports(&self) -> Result<Vec<SportPayload>, FetchError>;

    async fn fetch_competitions(&self) -> Result<Vec<CompetitionPayload>, FetchError>;

    async fn fetch_events(&self) -> Result<Vec<EventPayload>, FetchError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
