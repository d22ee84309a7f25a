//! Feed document fetcher.
//!
//! This module fetches an RSS document over HTTP with resource limits
//! and decodes it into a [`RawFeedDocument`].

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use reqwest::Client;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use super::types::{RawEntry, RawFeedDocument};
use super::wait_for_shutdown;
use crate::config::FetcherConfig;
use crate::error::{GatorError, Result};

/// HTTP fetcher for feed documents.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_feed_size: u64,
}

impl FeedFetcher {
    /// Create a new fetcher from configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| GatorError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Fetch and decode the document at `url`.
    ///
    /// The request is abandoned with a network error as soon as `shutdown`
    /// turns true.
    pub async fn fetch(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RawFeedDocument> {
        if *shutdown.borrow() {
            return Err(GatorError::Network(format!("fetch of {url} cancelled")));
        }

        tokio::select! {
            result = self.fetch_document(url) => result,
            _ = wait_for_shutdown(shutdown) => {
                Err(GatorError::Network(format!("fetch of {url} cancelled")))
            }
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<RawFeedDocument> {
        debug!(url = %url, "Fetching feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatorError::Network(format!("failed to fetch feed: {e}")))?;

        // Check response status
        if !response.status().is_success() {
            return Err(GatorError::Network(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        // Check content length if available
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(GatorError::Network(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatorError::Network(format!("failed to read response: {e}")))?;

        // Check actual size
        if bytes.len() as u64 > self.max_feed_size {
            return Err(GatorError::Network(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        parse_document(&bytes)
    }
}

/// Decode an RSS document body.
///
/// Only unprefixed RSS elements are read. Namespaced siblings such as
/// `<atom:link>` or `<dc:title>` are skipped, and when an element repeats the
/// first non-empty value wins.
///
/// Text fields are HTML-entity-decoded after XML decoding, since feeds
/// commonly escape their HTML twice.
pub fn parse_document(bytes: &[u8]) -> Result<RawFeedDocument> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| GatorError::MalformedDocument(format!("body is not UTF-8: {e}")))?;

    let xml = scrub_html_entities_for_xml(text);
    let mut reader = Reader::from_str(&xml);

    let mut stack: Vec<Node> = Vec::new();
    let mut channel: Option<RawFields> = None;
    let mut item: Option<RawFields> = None;
    let mut items: Vec<RawFields> = Vec::new();
    let mut buf = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| GatorError::MalformedDocument(format!("invalid XML: {e}")))?;

        match event {
            Event::Start(start) => {
                let node = Node::classify(stack.last().copied(), start.name());
                open_node(node, &mut channel, &mut item, &mut buf);
                stack.push(node);
            }
            Event::Empty(start) => {
                let node = Node::classify(stack.last().copied(), start.name());
                open_node(node, &mut channel, &mut item, &mut buf);
                close_node(node, &mut channel, &mut item, &mut items, &mut buf);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    close_node(node, &mut channel, &mut item, &mut items, &mut buf);
                }
            }
            Event::Text(t) if matches!(stack.last(), Some(Node::Field(..))) => {
                match t.unescape() {
                    Ok(unescaped) => buf.push_str(&unescaped),
                    Err(_) => {
                        let raw = String::from_utf8_lossy(&t);
                        buf.push_str(&html_escape::decode_html_entities(&raw));
                    }
                }
            }
            Event::CData(c) if matches!(stack.last(), Some(Node::Field(..))) => {
                buf.push_str(&String::from_utf8_lossy(&c));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(GatorError::MalformedDocument(
            "document ended inside an open element".to_string(),
        ));
    }

    let channel = channel
        .ok_or_else(|| GatorError::MalformedDocument("document has no channel".to_string()))?;

    let entries = items
        .into_iter()
        .map(|item| RawEntry {
            title: decode_text(&item.title),
            link: item.link.trim().to_string(),
            description: decode_text(&item.description),
            pub_date: item.pub_date,
        })
        .collect();

    Ok(RawFeedDocument {
        title: decode_text(&channel.title),
        link: channel.link.trim().to_string(),
        description: decode_text(&channel.description),
        entries,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Channel,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

/// Position of an open element in the RSS tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Root,
    Channel,
    Item,
    Field(Owner, Field),
    Other,
}

impl Node {
    fn classify(parent: Option<Node>, name: QName<'_>) -> Node {
        let Some(parent) = parent else {
            return Node::Root;
        };
        if name.prefix().is_some() {
            return Node::Other;
        }

        let field = match name.local_name().as_ref() {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        };

        match (parent, name.local_name().as_ref(), field) {
            (Node::Root, b"channel", _) => Node::Channel,
            (Node::Channel, b"item", _) => Node::Item,
            (Node::Channel, _, Some(f)) if f != Field::PubDate => Node::Field(Owner::Channel, f),
            (Node::Item, _, Some(f)) => Node::Field(Owner::Item, f),
            _ => Node::Other,
        }
    }
}

#[derive(Debug, Default)]
struct RawFields {
    title: String,
    link: String,
    description: String,
    pub_date: String,
}

impl RawFields {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        }
    }
}

fn open_node(
    node: Node,
    channel: &mut Option<RawFields>,
    item: &mut Option<RawFields>,
    buf: &mut String,
) {
    match node {
        Node::Channel => {
            channel.get_or_insert_with(RawFields::default);
        }
        Node::Item => *item = Some(RawFields::default()),
        Node::Field(..) => buf.clear(),
        _ => {}
    }
}

fn close_node(
    node: Node,
    channel: &mut Option<RawFields>,
    item: &mut Option<RawFields>,
    items: &mut Vec<RawFields>,
    buf: &mut String,
) {
    match node {
        Node::Item => items.extend(item.take()),
        Node::Field(owner, field) => {
            let target = match owner {
                Owner::Channel => channel.as_mut(),
                Owner::Item => item.as_mut(),
            };
            if let Some(fields) = target {
                let slot = fields.slot(field);
                if slot.trim().is_empty() {
                    *slot = std::mem::take(buf);
                }
            }
            buf.clear();
        }
        _ => {}
    }
}

fn decode_text(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// `&nbsp;` is not an XML entity, but feeds embed it raw.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
}

/// Validate a feed URL: http or https with a host.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| GatorError::Validation(format!("invalid URL {url:?}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(GatorError::Validation(format!(
                "unsupported URL scheme: {scheme}"
            )))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(GatorError::Validation(format!("URL has no host: {url}")));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example &amp;amp; Co</title>
    <link>https://example.com/</link>
    <description>News&nbsp;feed</description>
    <item>
      <title>First &amp;quot;post&amp;quot;</title>
      <link>https://example.com/1</link>
      <description><![CDATA[<p>Hello</p>]]></description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <guid>1</guid>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/2</link>
    </item>
  </channel>
</rss>"#;

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            total_timeout_secs: 5,
            ..FetcherConfig::default()
        }
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[test]
    fn test_parse_document() {
        let doc = parse_document(SAMPLE_RSS.as_bytes()).unwrap();

        assert_eq!(doc.title, "Example & Co");
        assert_eq!(doc.link, "https://example.com/");
        assert_eq!(doc.description, "News\u{a0}feed");
        assert_eq!(doc.entries.len(), 2);

        let first = &doc.entries[0];
        assert_eq!(first.title, "First \"post\"");
        assert_eq!(first.link, "https://example.com/1");
        assert_eq!(first.description, "<p>Hello</p>");
        assert_eq!(first.pub_date, "Mon, 02 Jan 2006 15:04:05 -0700");

        let second = &doc.entries[1];
        assert_eq!(second.title, "Second");
        assert_eq!(second.description, "");
        assert_eq!(second.pub_date, "");
    }

    #[test]
    fn test_parse_document_without_items() {
        let doc = parse_document(b"<rss><channel><title>Empty</title></channel></rss>").unwrap();
        assert_eq!(doc.title, "Empty");
        assert!(doc.entries.is_empty());
    }

    #[test]
    fn test_parse_document_missing_channel() {
        let result = parse_document(b"<rss><nothing/></rss>");
        assert!(matches!(result, Err(GatorError::MalformedDocument(_))));
    }

    #[test]
    fn test_parse_document_skips_atom_self_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Lane's Blog</title>
    <link>https://wagslane.dev/</link>
    <description>Recent content</description>
    <atom:link href="https://wagslane.dev/index.xml" rel="self" type="application/rss+xml" />
    <item>
      <title>A post</title>
      <link>https://wagslane.dev/posts/a/</link>
      <pubDate>Sun, 08 Jan 2023 00:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

        let doc = parse_document(xml.as_bytes()).unwrap();

        assert_eq!(doc.title, "Lane's Blog");
        assert_eq!(doc.link, "https://wagslane.dev/");
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].link, "https://wagslane.dev/posts/a/");
    }

    #[test]
    fn test_parse_document_prefers_unprefixed_item_fields() {
        let xml = r#"<rss version="2.0"
     xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Podcast</title>
    <itunes:title>Podcast (iTunes)</itunes:title>
    <item>
      <itunes:title>Episode (iTunes)</itunes:title>
      <title>Episode 1</title>
      <dc:title>Episode (DC)</dc:title>
      <link>https://example.com/ep1</link>
      <media:description type="plain">Media blurb</media:description>
      <description>Show notes</description>
      <dc:date>2024-01-01</dc:date>
      <pubDate>2024-01-02</pubDate>
    </item>
  </channel>
</rss>"#;

        let doc = parse_document(xml.as_bytes()).unwrap();

        assert_eq!(doc.title, "Podcast");
        let entry = &doc.entries[0];
        assert_eq!(entry.title, "Episode 1");
        assert_eq!(entry.link, "https://example.com/ep1");
        assert_eq!(entry.description, "Show notes");
        assert_eq!(entry.pub_date, "2024-01-02");
    }

    #[test]
    fn test_parse_document_first_non_empty_value_wins() {
        let xml = "<rss><channel><title>Feed</title>\
            <item><link/><link>https://example.com/a</link><link>https://example.com/b</link></item>\
            </channel></rss>";

        let doc = parse_document(xml.as_bytes()).unwrap();

        assert_eq!(doc.entries[0].link, "https://example.com/a");
    }

    #[test]
    fn test_parse_document_unclosed_element() {
        let result = parse_document(b"<rss><channel><title>Cut off</title>");
        assert!(matches!(result, Err(GatorError::MalformedDocument(_))));
    }

    #[test]
    fn test_parse_document_invalid_xml() {
        let result = parse_document(b"this is not xml at all <<<");
        assert!(matches!(result, Err(GatorError::MalformedDocument(_))));
    }

    #[test]
    fn test_parse_document_not_utf8() {
        let result = parse_document(&[0x3c, 0x72, 0xff, 0xfe, 0x3e]);
        assert!(matches!(result, Err(GatorError::MalformedDocument(_))));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/rss").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/feed"),
            Err(GatorError::Validation(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(GatorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .and(header("user-agent", "gator"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config()).unwrap();
        let (_tx, mut rx) = no_shutdown();
        let doc = fetcher
            .fetch(&format!("{}/feed.xml", server.uri()), &mut rx)
            .await
            .unwrap();

        assert_eq!(doc.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config()).unwrap();
        let (_tx, mut rx) = no_shutdown();
        let result = fetcher.fetch(&server.uri(), &mut rx).await;

        assert!(matches!(result, Err(GatorError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>nope"))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config()).unwrap();
        let (_tx, mut rx) = no_shutdown();
        let result = fetcher.fetch(&server.uri(), &mut rx).await;

        assert!(matches!(result, Err(GatorError::MalformedDocument(_))));
    }

    #[tokio::test]
    async fn test_fetch_oversize_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
            .mount(&server)
            .await;

        let config = FetcherConfig {
            max_feed_size_bytes: 64,
            ..test_config()
        };
        let fetcher = FeedFetcher::new(&config).unwrap();
        let (_tx, mut rx) = no_shutdown();
        let result = fetcher.fetch(&server.uri(), &mut rx).await;

        assert!(matches!(result, Err(GatorError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = FeedFetcher::new(&test_config()).unwrap();
        let (_tx, mut rx) = no_shutdown();
        // Port 9 (discard) is closed on test machines
        let result = fetcher.fetch("http://127.0.0.1:9/feed", &mut rx).await;

        assert!(matches!(result, Err(GatorError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_cancelled_by_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(SAMPLE_RSS)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&FetcherConfig {
            total_timeout_secs: 30,
            ..FetcherConfig::default()
        })
        .unwrap();
        let (tx, mut rx) = no_shutdown();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let started = std::time::Instant::now();
        let result = fetcher.fetch(&server.uri(), &mut rx).await;

        assert!(matches!(result, Err(GatorError::Network(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fetch_after_shutdown_does_not_send() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_RSS))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&test_config()).unwrap();
        let (_tx, mut rx) = watch::channel(true);
        let result = fetcher.fetch(&server.uri(), &mut rx).await;

        assert!(matches!(result, Err(GatorError::Network(_))));
    }
}
