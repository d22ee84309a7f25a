//! Feed ingestion for Gator.
//!
//! This module fetches registered feeds on a schedule and stores their
//! entries as posts, each URL at most once.

pub mod cycle;
pub mod date;
pub mod fetcher;
pub mod repository;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod types;

pub use cycle::{CycleReport, IngestionCycle};
pub use date::{normalize_published, DateLayout};
pub use fetcher::{parse_document, validate_url, FeedFetcher};
pub use repository::{FeedFollowRepository, FeedRepository, PostRepository};
pub use scheduler::Scheduler;
pub use selector::FeedSelector;
pub use store::IngestStore;
pub use types::{
    Feed, FeedFollow, FeedFollowDetails, FeedWithOwner, InsertOutcome, NewFeed, NewPost, Post,
    RawEntry, RawFeedDocument,
};

use tokio::sync::watch;

/// Resolve once the shutdown flag is true.
///
/// If every sender is dropped while the flag is false, shutdown can no
/// longer be requested and this never resolves.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
