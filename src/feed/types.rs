//! Feed types for Gator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A registered feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Feed ID.
    pub id: Uuid,
    /// User who registered the feed.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// Feed URL (globally unique).
    pub url: String,
    /// When the feed was created.
    pub created_at: DateTime<Utc>,
    /// When the feed was last updated.
    pub updated_at: DateTime<Utc>,
    /// Last time the feed was ingested. `None` means never.
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Feed {
    /// Whether the feed has never been ingested.
    pub fn is_never_fetched(&self) -> bool {
        self.last_fetched_at.is_none()
    }
}

/// A feed together with the name of the user who registered it.
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    /// The feed.
    pub feed: Feed,
    /// Name of the owning user.
    pub owner_name: String,
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
}

impl NewFeed {
    /// Create a new feed registration.
    pub fn new(user_id: Uuid, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A user's subscription to a feed.
#[derive(Debug, Clone)]
pub struct FeedFollow {
    /// Follow ID.
    pub id: Uuid,
    /// Following user.
    pub user_id: Uuid,
    /// Followed feed.
    pub feed_id: Uuid,
    /// When the follow was created.
    pub created_at: DateTime<Utc>,
    /// When the follow was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A follow joined with the user and feed names, for reporting.
#[derive(Debug, Clone)]
pub struct FeedFollowDetails {
    /// Follow ID.
    pub id: Uuid,
    /// Name of the following user.
    pub user_name: String,
    /// Name of the followed feed.
    pub feed_name: String,
    /// URL of the followed feed.
    pub feed_url: String,
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Post ID.
    pub id: Uuid,
    /// Feed the post was first observed in.
    pub feed_id: Uuid,
    /// Title.
    pub title: Option<String>,
    /// Link (globally unique).
    pub url: String,
    /// Description.
    pub description: Option<String>,
    /// Normalized publish time, if the source date could be read.
    pub published_at: Option<DateTime<Utc>>,
    /// When the post was stored.
    pub created_at: DateTime<Utc>,
    /// When the post was last updated.
    pub updated_at: DateTime<Utc>,
}

/// New post for insertion.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Feed the entry came from.
    pub feed_id: Uuid,
    /// Entry link.
    pub url: String,
    /// Title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Normalized publish time.
    pub published_at: Option<DateTime<Utc>>,
}

impl NewPost {
    /// Create a new post with required fields.
    pub fn new(feed_id: Uuid, url: impl Into<String>) -> Self {
        Self {
            feed_id,
            url: url.into(),
            title: None,
            description: None,
            published_at: None,
        }
    }

    /// Set the title. An empty title is treated as absent.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = non_empty(title.into());
        self
    }

    /// Set the description. An empty description is treated as absent.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_empty(description.into());
        self
    }

    /// Set the publish time.
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Result of attempting to store a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The post was new and has been stored.
    Inserted(Post),
    /// A post with the same URL already exists; nothing was written.
    Duplicate,
}

/// A fetched syndication document, decoded but not yet persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedDocument {
    /// Channel title.
    pub title: String,
    /// Channel link.
    pub link: String,
    /// Channel description.
    pub description: String,
    /// Entries in document order.
    pub entries: Vec<RawEntry>,
}

/// One entry of a fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry title.
    pub title: String,
    /// Entry link.
    pub link: String,
    /// Entry description.
    pub description: String,
    /// Publish date exactly as it appeared in the document.
    pub pub_date: String,
}
