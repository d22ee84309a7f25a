//! One ingestion pass: select, fetch, store entries, mark fetched.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::date::normalize_published;
use super::fetcher::FeedFetcher;
use super::selector::FeedSelector;
use super::store::IngestStore;
use super::types::{InsertOutcome, NewPost, RawEntry};
use crate::GatorError;

/// Outcome of one ingestion cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// No feed could be selected.
    NoWork,
    /// The feed's document could not be fetched or decoded. The feed was not marked.
    FetchFailed {
        /// Feed that was selected.
        feed_id: Uuid,
        /// Error message.
        error: String,
    },
    /// The document was processed.
    Completed {
        /// Feed that was ingested.
        feed_id: Uuid,
        /// Entries stored as new posts.
        inserted: usize,
        /// Entries whose URL was already stored.
        duplicates: usize,
        /// Entries that could not be stored.
        failed: usize,
        /// Whether the feed was marked fetched.
        marked: bool,
    },
}

/// Per-entry outcome inside a cycle.
enum EntryOutcome {
    Inserted,
    Duplicate,
    Failed,
}

/// Runs single ingestion cycles against a store.
pub struct IngestionCycle<S> {
    store: S,
    fetcher: FeedFetcher,
}

impl<S: IngestStore> IngestionCycle<S> {
    /// Create a new cycle runner.
    pub fn new(store: S, fetcher: FeedFetcher) -> Self {
        Self { store, fetcher }
    }

    /// Run one cycle.
    ///
    /// Never fails: every error is logged and reflected in the report.
    /// `shutdown` aborts the fetch only; once the document is in hand all
    /// entries are processed and the feed is marked.
    pub async fn run_once(&self, shutdown: &mut watch::Receiver<bool>) -> CycleReport {
        let feed = match FeedSelector::new(&self.store).next_feed().await {
            Ok(feed) => feed,
            Err(GatorError::NoFeedsAvailable) => {
                info!("No feeds to fetch");
                return CycleReport::NoWork;
            }
            Err(e) => {
                error!(error = %e, "Failed to select next feed");
                return CycleReport::NoWork;
            }
        };

        info!(feed_id = %feed.id, url = %feed.url, name = %feed.name, "Fetching feed");

        let document = match self.fetcher.fetch(&feed.url, shutdown).await {
            Ok(document) => document,
            Err(e) => {
                if e.is_fetch_failure() {
                    warn!(feed_id = %feed.id, url = %feed.url, error = %e, "Failed to fetch feed");
                } else {
                    error!(feed_id = %feed.id, url = %feed.url, error = %e, "Unexpected fetch error");
                }
                return CycleReport::FetchFailed {
                    feed_id: feed.id,
                    error: e.to_string(),
                };
            }
        };

        let mut inserted = 0;
        let mut duplicates = 0;
        let mut failed = 0;

        for entry in document.entries {
            match self.store_entry(feed.id, entry).await {
                EntryOutcome::Inserted => inserted += 1,
                EntryOutcome::Duplicate => duplicates += 1,
                EntryOutcome::Failed => failed += 1,
            }
        }

        let marked = match self.store.mark_feed_fetched(feed.id).await {
            Ok(()) => true,
            Err(e) => {
                error!(feed_id = %feed.id, error = %e, "Failed to mark feed fetched");
                false
            }
        };

        info!(
            feed_id = %feed.id,
            inserted,
            duplicates,
            failed,
            "Feed {} collected",
            feed.name
        );

        CycleReport::Completed {
            feed_id: feed.id,
            inserted,
            duplicates,
            failed,
            marked,
        }
    }

    async fn store_entry(&self, feed_id: Uuid, entry: RawEntry) -> EntryOutcome {
        if entry.link.is_empty() {
            warn!(feed_id = %feed_id, title = %entry.title, "Skipping entry without link");
            return EntryOutcome::Failed;
        }

        let published_at = normalize_published(&entry.pub_date);
        let post = NewPost::new(feed_id, entry.link)
            .with_title(entry.title)
            .with_description(entry.description)
            .with_published_at(published_at);

        match self.store.create_post(&post).await {
            Ok(InsertOutcome::Inserted(_)) => {
                debug!(feed_id = %feed_id, url = %post.url, "Stored post");
                EntryOutcome::Inserted
            }
            Ok(InsertOutcome::Duplicate) => {
                debug!(feed_id = %feed_id, url = %post.url, "Post already stored");
                EntryOutcome::Duplicate
            }
            Err(e) => {
                error!(feed_id = %feed_id, url = %post.url, error = %e, "Failed to store post");
                EntryOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetcherConfig;
    use crate::db::{Database, NewUser, UserRepository};
    use crate::feed::{Feed, FeedRepository, NewFeed, PostRepository};
    use crate::Result;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const THREE_ITEMS: &str = r#"<rss><channel><title>T</title>
<item><title>One</title><link>https://example.com/1</link><pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate></item>
<item><title>Two</title><link>https://example.com/2</link><pubDate>yesterday-ish</pubDate></item>
<item><title>Three</title><link>https://example.com/3</link><pubDate>2006-01-03</pubDate></item>
</channel></rss>"#;

    /// Store that refuses to persist one URL.
    struct FlakyStore {
        inner: Database,
        poisoned_url: String,
    }

    impl IngestStore for FlakyStore {
        async fn next_feed_to_ingest(&self) -> Result<Option<Feed>> {
            self.inner.next_feed_to_ingest().await
        }

        async fn create_post(&self, post: &NewPost) -> Result<InsertOutcome> {
            if post.url == self.poisoned_url {
                return Err(GatorError::Database("disk on fire".into()));
            }
            self.inner.create_post(post).await
        }

        async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<()> {
            self.inner.mark_feed_fetched(feed_id).await
        }

        async fn feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
            self.inner.feed_by_url(url).await
        }
    }

    async fn setup(server: &MockServer) -> (Database, Feed) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("alice"))
            .await
            .unwrap();
        let feed = FeedRepository::new(db.pool())
            .create(&NewFeed::new(user.id, "Test", format!("{}/rss", server.uri())))
            .await
            .unwrap();
        (db, feed)
    }

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(&FetcherConfig {
            total_timeout_secs: 5,
            ..FetcherConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_work() {
        let db = Database::open_in_memory().await.unwrap();
        let cycle = IngestionCycle::new(db, fetcher());
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(cycle.run_once(&mut rx).await, CycleReport::NoWork);
    }

    #[tokio::test]
    async fn test_completed_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREE_ITEMS))
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let cycle = IngestionCycle::new(db.clone(), fetcher());
        let (_tx, mut rx) = watch::channel(false);

        let report = cycle.run_once(&mut rx).await;

        assert_eq!(
            report,
            CycleReport::Completed {
                feed_id: feed.id,
                inserted: 3,
                duplicates: 0,
                failed: 0,
                marked: true,
            }
        );
        let posts = PostRepository::new(db.pool()).list_by_feed(feed.id).await.unwrap();
        let dated = posts.iter().filter(|p| p.published_at.is_some()).count();
        assert_eq!(posts.len(), 3);
        assert_eq!(dated, 2);
    }

    #[tokio::test]
    async fn test_second_run_only_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREE_ITEMS))
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let cycle = IngestionCycle::new(db, fetcher());
        let (_tx, mut rx) = watch::channel(false);

        cycle.run_once(&mut rx).await;
        let report = cycle.run_once(&mut rx).await;

        assert_eq!(
            report,
            CycleReport::Completed {
                feed_id: feed.id,
                inserted: 0,
                duplicates: 3,
                failed: 0,
                marked: true,
            }
        );
    }

    #[tokio::test]
    async fn test_entry_failure_is_isolated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREE_ITEMS))
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let store = FlakyStore {
            inner: db.clone(),
            poisoned_url: "https://example.com/2".into(),
        };
        let cycle = IngestionCycle::new(store, fetcher());
        let (_tx, mut rx) = watch::channel(false);

        let report = cycle.run_once(&mut rx).await;

        assert_eq!(
            report,
            CycleReport::Completed {
                feed_id: feed.id,
                inserted: 2,
                duplicates: 0,
                failed: 1,
                marked: true,
            }
        );
        let stored = FeedRepository::new(db.pool())
            .get_by_id(feed.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_entry_without_link_counts_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<rss><channel><item><title>No link</title></item>\
                 <item><link>https://example.com/ok</link></item></channel></rss>",
            ))
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let cycle = IngestionCycle::new(db, fetcher());
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(
            cycle.run_once(&mut rx).await,
            CycleReport::Completed {
                feed_id: feed.id,
                inserted: 1,
                duplicates: 0,
                failed: 1,
                marked: true,
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_feed_unmarked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let cycle = IngestionCycle::new(db.clone(), fetcher());
        let (_tx, mut rx) = watch::channel(false);

        let report = cycle.run_once(&mut rx).await;

        assert!(matches!(report, CycleReport::FetchFailed { feed_id, .. } if feed_id == feed.id));
        let stored = FeedRepository::new(db.pool())
            .get_by_id(feed.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_fetched_at.is_none());
        assert_eq!(stored.updated_at, feed.updated_at);
    }

    #[tokio::test]
    async fn test_empty_document_still_marks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<rss><channel></channel></rss>"),
            )
            .mount(&server)
            .await;
        let (db, feed) = setup(&server).await;
        let cycle = IngestionCycle::new(db.clone(), fetcher());
        let (_tx, mut rx) = watch::channel(false);

        let report = cycle.run_once(&mut rx).await;

        assert!(matches!(
            report,
            CycleReport::Completed {
                inserted: 0,
                marked: true,
                ..
            }
        ));
        assert!(db
            .feed_by_url(&feed.url)
            .await
            .unwrap()
            .unwrap()
            .last_fetched_at
            .is_some());
    }
}
