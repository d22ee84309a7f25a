//! Feed, follow and post repositories for Gator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{
    Feed, FeedFollow, FeedFollowDetails, FeedWithOwner, InsertOutcome, NewFeed, NewPost, Post,
};
use crate::db::{format_timestamp, parse_uuid, require_timestamp, DbPool};
use crate::error::is_unique_violation;
use crate::{GatorError, Result};

/// Row type for a feed from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: String,
    user_id: String,
    name: String,
    url: String,
    created_at: String,
    updated_at: String,
    last_fetched_at: Option<String>,
}

impl TryFrom<FeedRow> for Feed {
    type Error = GatorError;

    fn try_from(row: FeedRow) -> Result<Self> {
        Ok(Feed {
            id: parse_uuid("feeds.id", &row.id)?,
            user_id: parse_uuid("feeds.user_id", &row.user_id)?,
            name: row.name,
            url: row.url,
            created_at: require_timestamp("feeds.created_at", &row.created_at)?,
            updated_at: require_timestamp("feeds.updated_at", &row.updated_at)?,
            last_fetched_at: row
                .last_fetched_at
                .as_deref()
                .map(|s| require_timestamp("feeds.last_fetched_at", s))
                .transpose()?,
        })
    }
}

/// Row type for a feed joined with its owner.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedWithOwnerRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    owner_name: String,
}

impl TryFrom<FeedWithOwnerRow> for FeedWithOwner {
    type Error = GatorError;

    fn try_from(row: FeedWithOwnerRow) -> Result<Self> {
        Ok(FeedWithOwner {
            feed: Feed::try_from(row.feed)?,
            owner_name: row.owner_name,
        })
    }
}

/// Row type for a follow joined with user and feed names.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedFollowDetailsRow {
    id: String,
    user_name: String,
    feed_name: String,
    feed_url: String,
}

impl TryFrom<FeedFollowDetailsRow> for FeedFollowDetails {
    type Error = GatorError;

    fn try_from(row: FeedFollowDetailsRow) -> Result<Self> {
        Ok(FeedFollowDetails {
            id: parse_uuid("feed_follows.id", &row.id)?,
            user_name: row.user_name,
            feed_name: row.feed_name,
            feed_url: row.feed_url,
        })
    }
}

/// Row type for a post from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PostRow {
    id: String,
    feed_id: String,
    title: Option<String>,
    url: String,
    description: Option<String>,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PostRow> for Post {
    type Error = GatorError;

    fn try_from(row: PostRow) -> Result<Self> {
        Ok(Post {
            id: parse_uuid("posts.id", &row.id)?,
            feed_id: parse_uuid("posts.feed_id", &row.feed_id)?,
            title: row.title,
            url: row.url,
            description: row.description,
            published_at: row
                .published_at
                .as_deref()
                .map(|s| require_timestamp("posts.published_at", s))
                .transpose()?,
            created_at: require_timestamp("posts.created_at", &row.created_at)?,
            updated_at: require_timestamp("posts.updated_at", &row.updated_at)?,
        })
    }
}

const FEED_COLUMNS: &str = "id, user_id, name, url, created_at, updated_at, last_fetched_at";

/// Repository for feed operations.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed.
    ///
    /// Returns `AlreadyExists` if a feed with the same URL is registered.
    pub async fn create(&self, new_feed: &NewFeed) -> Result<Feed> {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            user_id: new_feed.user_id,
            name: new_feed.name.clone(),
            url: new_feed.url.clone(),
            created_at: now,
            updated_at: now,
            last_fetched_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO feeds (id, user_id, name, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(feed.id.to_string())
        .bind(feed.user_id.to_string())
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(format_timestamp(&feed.created_at))
        .bind(format_timestamp(&feed.updated_at))
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::AlreadyExists(format!("feed {}", new_feed.url))
            } else {
                GatorError::Database(e.to_string())
            }
        })?;

        Ok(feed)
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(Feed::try_from).transpose()
    }

    /// Get a feed by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(url)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(Feed::try_from).transpose()
    }

    /// List all feeds with the name of the user who registered them.
    pub async fn list_with_owners(&self) -> Result<Vec<FeedWithOwner>> {
        let rows = sqlx::query_as::<_, FeedWithOwnerRow>(
            r#"
            SELECT f.id, f.user_id, f.name, f.url, f.created_at, f.updated_at,
                   f.last_fetched_at, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.created_at ASC, f.name ASC
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        rows.into_iter().map(FeedWithOwner::try_from).collect()
    }

    /// Get the feed most due for ingestion.
    ///
    /// Never-fetched feeds come first, then the least recently fetched,
    /// with ties broken by the least recently updated.
    pub async fn next_to_fetch(&self) -> Result<Option<Feed>> {
        let query = format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, updated_at ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(Feed::try_from).transpose()
    }

    /// Mark a feed as fetched now.
    pub async fn mark_fetched(&self, id: Uuid) -> Result<()> {
        self.mark_fetched_at(id, Utc::now()).await
    }

    /// Mark a feed as fetched at the given time.
    ///
    /// Returns `NotFound` if the feed no longer exists.
    pub async fn mark_fetched_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let at = format_timestamp(&at);
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(&at)
                .bind(&at)
                .bind(id.to_string())
                .execute(self.pool)
                .await
                .map_err(|e| GatorError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(GatorError::NotFound(format!("feed {id}")));
        }
        Ok(())
    }
}

/// Repository for feed follow operations.
pub struct FeedFollowRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedFollowRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Follow a feed.
    ///
    /// Returns `AlreadyExists` if the user already follows it.
    pub async fn create(&self, user_id: Uuid, feed_id: Uuid) -> Result<FeedFollow> {
        let now = Utc::now();
        let follow = FeedFollow {
            id: Uuid::new_v4(),
            user_id,
            feed_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(follow.id.to_string())
        .bind(user_id.to_string())
        .bind(feed_id.to_string())
        .bind(format_timestamp(&follow.created_at))
        .bind(format_timestamp(&follow.updated_at))
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::AlreadyExists("feed follow".to_string())
            } else {
                GatorError::Database(e.to_string())
            }
        })?;

        Ok(follow)
    }

    /// Whether the user follows the feed.
    pub async fn exists(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM feed_follows WHERE user_id = ? AND feed_id = ?)",
        )
        .bind(user_id.to_string())
        .bind(feed_id.to_string())
        .fetch_one(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(exists.0)
    }

    /// Get a follow with user and feed names.
    pub async fn get_details(&self, id: Uuid) -> Result<Option<FeedFollowDetails>> {
        let row = sqlx::query_as::<_, FeedFollowDetailsRow>(
            r#"
            SELECT ff.id, u.name AS user_name, f.name AS feed_name, f.url AS feed_url
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(FeedFollowDetails::try_from).transpose()
    }

    /// List the follows of a user, in the order they were created.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<FeedFollowDetails>> {
        let rows = sqlx::query_as::<_, FeedFollowDetailsRow>(
            r#"
            SELECT ff.id, u.name AS user_name, f.name AS feed_name, f.url AS feed_url
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.created_at ASC, f.name ASC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        rows.into_iter().map(FeedFollowDetails::try_from).collect()
    }

    /// Remove the user's follow of the feed with the given URL.
    ///
    /// Returns true if a follow was removed.
    pub async fn delete_by_url(&self, user_id: Uuid, url: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = ?
              AND feed_id IN (SELECT id FROM feeds WHERE url = ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(url)
        .execute(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Repository for post operations.
pub struct PostRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a post unless one with the same URL exists.
    ///
    /// The existence check and the insert are one statement, so concurrent
    /// writers of the same URL store it once.
    pub async fn create_or_ignore(&self, new_post: &NewPost) -> Result<InsertOutcome> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            feed_id: new_post.feed_id,
            title: new_post.title.clone(),
            url: new_post.url.clone(),
            description: new_post.description.clone(),
            published_at: new_post.published_at,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO posts (id, feed_id, title, url, description, published_at,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(post.id.to_string())
        .bind(post.feed_id.to_string())
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&post.created_at))
        .bind(format_timestamp(&post.updated_at))
        .execute(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted(post))
        }
    }

    /// Get a post by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
            FROM posts
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(Post::try_from).transpose()
    }

    /// List posts of a feed in insertion order.
    pub async fn list_by_feed(&self, feed_id: Uuid) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(feed_id.to_string())
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        rows.into_iter().map(Post::try_from).collect()
    }

    /// List the newest posts from feeds the user follows.
    ///
    /// Posts without a publish time sort last.
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                   p.created_at, p.updated_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        rows.into_iter().map(Post::try_from).collect()
    }

    /// Count all posts.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(count.0)
    }
}
