//! Storage contract used by the ingestion engine.
//!
//! The ingestion cycle only needs a handful of operations from storage.
//! They are collected here so the cycle can run against any backend;
//! [`Database`] is the SQLite implementation.
//!
//! Selecting a feed and marking it fetched are separate calls. A backend
//! shared by several aggregator processes would have to make the pick a
//! claim (select and lock) for two processes not to fetch the same feed.

use std::future::Future;

use uuid::Uuid;

use super::repository::{FeedRepository, PostRepository};
use super::types::{Feed, InsertOutcome, NewPost};
use crate::db::Database;
use crate::Result;

/// Storage operations consumed by the ingestion engine.
pub trait IngestStore: Send + Sync {
    /// The single feed most due for ingestion, or `None` if there are no feeds.
    fn next_feed_to_ingest(&self) -> impl Future<Output = Result<Option<Feed>>> + Send;

    /// Store a post unless its URL is already stored.
    fn create_post(&self, post: &NewPost) -> impl Future<Output = Result<InsertOutcome>> + Send;

    /// Record that the feed was ingested now.
    fn mark_feed_fetched(&self, feed_id: Uuid) -> impl Future<Output = Result<()>> + Send;

    /// Look up a feed by URL.
    fn feed_by_url(&self, url: &str) -> impl Future<Output = Result<Option<Feed>>> + Send;
}

impl IngestStore for Database {
    async fn next_feed_to_ingest(&self) -> Result<Option<Feed>> {
        FeedRepository::new(self.pool()).next_to_fetch().await
    }

    async fn create_post(&self, post: &NewPost) -> Result<InsertOutcome> {
        PostRepository::new(self.pool()).create_or_ignore(post).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<()> {
        FeedRepository::new(self.pool()).mark_fetched(feed_id).await
    }

    async fn feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        FeedRepository::new(self.pool()).get_by_url(url).await
    }
}
