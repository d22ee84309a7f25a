//! Feed selection for the ingestion cycle.

use tracing::debug;

use super::store::IngestStore;
use super::types::Feed;
use crate::{GatorError, Result};

/// Picks the next feed to ingest.
///
/// Never-fetched feeds first, then the least recently fetched, ties broken
/// by the least recently updated. The ordering itself lives in the store.
pub struct FeedSelector<'a, S> {
    store: &'a S,
}

impl<'a, S: IngestStore> FeedSelector<'a, S> {
    /// Create a selector over the given store.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Select the next feed.
    ///
    /// Returns `NoFeedsAvailable` when no feeds are registered.
    pub async fn next_feed(&self) -> Result<Feed> {
        let feed = self
            .store
            .next_feed_to_ingest()
            .await?
            .ok_or(GatorError::NoFeedsAvailable)?;

        debug!(
            feed_id = %feed.id,
            url = %feed.url,
            never_fetched = feed.is_never_fetched(),
            "Selected feed"
        );
        Ok(feed)
    }
}
