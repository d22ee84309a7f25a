//! Built-in Gator commands.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::{with_auth, AppState, Command, CommandRegistry, Handler, HandlerFuture};
use crate::db::{NewUser, User, UserRepository};
use crate::duration::parse_interval;
use crate::feed::{
    validate_url, FeedFetcher, FeedFollowRepository, FeedRepository, IngestStore, IngestionCycle,
    NewFeed, PostRepository, Scheduler,
};
use crate::{GatorError, Result};

/// Number of posts shown by `browse` without an explicit limit.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

/// A built-in command: name, usage line and handler.
pub struct CommandSpec {
    /// Command name.
    pub name: &'static str,
    /// Usage line shown by `help` and on missing arguments.
    pub usage: &'static str,
    /// Handler.
    pub handler: Handler,
}

/// All built-in commands.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "register",
        usage: "register <name>",
        handler: Handler::Public(handle_register),
    },
    CommandSpec {
        name: "login",
        usage: "login <name>",
        handler: Handler::Public(handle_login),
    },
    CommandSpec {
        name: "users",
        usage: "users",
        handler: Handler::Public(handle_users),
    },
    CommandSpec {
        name: "reset",
        usage: "reset",
        handler: Handler::Public(handle_reset),
    },
    CommandSpec {
        name: "agg",
        usage: "agg <time_between_reqs>",
        handler: Handler::Public(handle_agg),
    },
    CommandSpec {
        name: "addfeed",
        usage: "addfeed <name> <url>",
        handler: with_auth(handle_add_feed),
    },
    CommandSpec {
        name: "feeds",
        usage: "feeds",
        handler: Handler::Public(handle_feeds),
    },
    CommandSpec {
        name: "follow",
        usage: "follow <url>",
        handler: with_auth(handle_follow),
    },
    CommandSpec {
        name: "following",
        usage: "following",
        handler: with_auth(handle_following),
    },
    CommandSpec {
        name: "unfollow",
        usage: "unfollow <url>",
        handler: with_auth(handle_unfollow),
    },
    CommandSpec {
        name: "browse",
        usage: "browse [limit]",
        handler: with_auth(handle_browse),
    },
    CommandSpec {
        name: "help",
        usage: "help",
        handler: Handler::Public(handle_help),
    },
];

/// Build a registry with every built-in command.
pub fn default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    for entry in COMMANDS {
        registry.register(entry.name, entry.handler);
    }
    registry
}

fn usage(name: &str) -> &'static str {
    COMMANDS
        .iter()
        .find(|entry| entry.name == name)
        .map_or("", |entry| entry.usage)
}

fn handle_register<'a>(state: &'a AppState, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = cmd.arg(0, usage("register"))?;

        let user = UserRepository::new(state.db.pool())
            .create(&NewUser::new(name))
            .await?;
        state.config.write().await.set_user(&user.name)?;

        info!(user = %user.name, "Registered user");
        println!("User created: {} ({})", user.name, user.id);
        Ok(())
    })
}

fn handle_login<'a>(state: &'a AppState, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = cmd.arg(0, usage("login"))?;

        let user = UserRepository::new(state.db.pool())
            .get_by_name(name)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("user {name}")))?;
        state.config.write().await.set_user(&user.name)?;

        println!("Logged in as {}", user.name);
        Ok(())
    })
}

fn handle_users<'a>(state: &'a AppState, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let current = state.current_user_name().await;
        let users = UserRepository::new(state.db.pool()).list_all().await?;

        for user in users {
            if current.as_deref() == Some(user.name.as_str()) {
                println!("* {} (current)", user.name);
            } else {
                println!("* {}", user.name);
            }
        }
        Ok(())
    })
}

fn handle_reset<'a>(state: &'a AppState, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let deleted = UserRepository::new(state.db.pool()).delete_all().await?;

        warn!(deleted, "Deleted all users");
        println!("Database reset: {deleted} user(s) deleted");
        Ok(())
    })
}

fn handle_agg<'a>(state: &'a AppState, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let interval = parse_interval(cmd.arg(0, usage("agg"))?)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        println!("Collecting feeds every {interval:?}");
        aggregate(state, interval, shutdown_rx).await?;
        Ok(())
    })
}

/// Run the ingestion scheduler until `shutdown` turns true.
///
/// Returns the number of cycles run.
pub async fn aggregate(
    state: &AppState,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    let fetcher_config = state.config.read().await.fetcher.clone();
    let fetcher = FeedFetcher::new(&fetcher_config)?;
    let cycle = IngestionCycle::new(state.db.clone(), fetcher);
    let scheduler = Scheduler::new(cycle, interval)?;

    Ok(scheduler.run(shutdown).await)
}

fn handle_add_feed<'a>(state: &'a AppState, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = cmd.arg(0, usage("addfeed"))?;
        let url = cmd.arg(1, usage("addfeed"))?;
        validate_url(url)?;

        let feeds = FeedRepository::new(state.db.pool());
        let feed = match feeds.get_by_url(url).await? {
            Some(existing) => {
                info!(feed_id = %existing.id, url = %url, "Feed already registered");
                existing
            }
            None => feeds.create(&NewFeed::new(user.id, name, url)).await?,
        };

        let follows = FeedFollowRepository::new(state.db.pool());
        if !follows.exists(user.id, feed.id).await? {
            follows.create(user.id, feed.id).await?;
        }

        println!("Feed added:");
        println!("  ID:   {}", feed.id);
        println!("  Name: {}", feed.name);
        println!("  URL:  {}", feed.url);
        println!("{} now follows {}", user.name, feed.name);
        Ok(())
    })
}

fn handle_feeds<'a>(state: &'a AppState, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let feeds = FeedRepository::new(state.db.pool()).list_with_owners().await?;

        if feeds.is_empty() {
            println!("No feeds found.");
            return Ok(());
        }

        for entry in feeds {
            println!("* {} <{}> added by {}", entry.feed.name, entry.feed.url, entry.owner_name);
        }
        Ok(())
    })
}

fn handle_follow<'a>(state: &'a AppState, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let url = cmd.arg(0, usage("follow"))?;

        let feed = state
            .db
            .feed_by_url(url)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("feed {url}")))?;
        let follows = FeedFollowRepository::new(state.db.pool());
        let follow = follows.create(user.id, feed.id).await?;

        match follows.get_details(follow.id).await? {
            Some(details) => println!("{} now follows {}", details.user_name, details.feed_name),
            None => println!("{} now follows {}", user.name, feed.name),
        }
        Ok(())
    })
}

fn handle_following<'a>(state: &'a AppState, _cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let follows = FeedFollowRepository::new(state.db.pool())
            .list_for_user(user.id)
            .await?;

        if follows.is_empty() {
            println!("{} is not following any feeds.", user.name);
            return Ok(());
        }

        for follow in follows {
            println!("* {}", follow.feed_name);
        }
        Ok(())
    })
}

fn handle_unfollow<'a>(state: &'a AppState, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let url = cmd.arg(0, usage("unfollow"))?;

        let removed = FeedFollowRepository::new(state.db.pool())
            .delete_by_url(user.id, url)
            .await?;
        if !removed {
            return Err(GatorError::NotFound(format!("follow of {url}")));
        }

        println!("{} unfollowed {}", user.name, url);
        Ok(())
    })
}

fn handle_browse<'a>(state: &'a AppState, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let limit = match cmd.args.first() {
            Some(raw) => parse_limit(raw)?,
            None => DEFAULT_BROWSE_LIMIT,
        };

        let posts = PostRepository::new(state.db.pool())
            .list_for_user(user.id, limit)
            .await?;

        if posts.is_empty() {
            println!("No posts yet.");
            return Ok(());
        }

        for post in posts {
            let published = post
                .published_at
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown date".to_string());
            println!("{} | {}", published, post.title.as_deref().unwrap_or("(untitled)"));
            println!("    {}", post.url);
            if let Some(description) = post.description.as_deref() {
                println!("    {description}");
            }
        }
        Ok(())
    })
}

fn parse_limit(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(GatorError::Validation(format!(
            "limit must be a positive integer, got {raw:?}"
        ))),
    }
}

fn handle_help<'a>(_state: &'a AppState, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        println!("Usage: gator <command> [args...]");
        println!();
        println!("Commands:");
        for entry in COMMANDS {
            println!("  {}", entry.usage);
        }
        Ok(())
    })
}
