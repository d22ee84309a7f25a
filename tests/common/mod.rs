//! Test helpers for integration tests.
//!
//! Provides an in-memory app state, a mock feed server and RSS fixtures.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gator::config::FetcherConfig;
use gator::db::{NewUser, User, UserRepository};
use gator::feed::{Feed, FeedRepository, NewFeed};
use gator::{AppState, Config, Database, FeedFetcher, IngestionCycle};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build an RSS document from `(title, link, pubDate)` triples.
pub fn rss(items: &[(&str, &str, &str)]) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel>");
    body.push_str("<title>Fixture</title><link>https://fixture.example.com/</link>");
    body.push_str("<description>Fixture feed</description>");
    for (title, link, pub_date) in items {
        body.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link>\
             <description>About {title}</description><pubDate>{pub_date}</pubDate></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}

/// Start a mock server answering `GET /{route}` with `body`.
pub async fn serve_feed(route: &str, body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{route}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// Open a fresh in-memory database.
pub async fn setup_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// App state over a fresh database with a config that is never written to disk.
pub async fn setup_state() -> AppState {
    AppState::new(setup_db().await, Config::default())
}

/// Create a user.
pub async fn create_user(db: &Database, name: &str) -> User {
    UserRepository::new(db.pool())
        .create(&NewUser::new(name))
        .await
        .unwrap()
}

/// Register a feed owned by `user`.
pub async fn create_feed(db: &Database, user: &User, name: &str, url: &str) -> Feed {
    FeedRepository::new(db.pool())
        .create(&NewFeed::new(user.id, name, url))
        .await
        .unwrap()
}

/// Fetcher with short timeouts.
pub fn test_fetcher() -> FeedFetcher {
    FeedFetcher::new(&FetcherConfig {
        connect_timeout_secs: 2,
        read_timeout_secs: 2,
        total_timeout_secs: 5,
        ..FetcherConfig::default()
    })
    .unwrap()
}

/// Ingestion cycle over `db`.
pub fn cycle(db: &Database) -> IngestionCycle<Database> {
    IngestionCycle::new(db.clone(), test_fetcher())
}

/// A shutdown channel that is never triggered.
pub fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
