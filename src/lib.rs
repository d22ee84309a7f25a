//! Gator - a command-line RSS feed aggregator.
//!
//! Users register and follow feeds; the `agg` command runs a scheduler that
//! repeatedly picks the stalest feed, fetches it and stores new posts.

pub mod command;
pub mod config;
pub mod db;
pub mod duration;
pub mod error;
pub mod feed;
pub mod logging;

pub use command::{
    default_registry, with_auth, AppState, Command, CommandRegistry, Handler, HandlerFuture,
};
pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use duration::{parse_duration, parse_interval};
pub use error::{GatorError, Result};
pub use feed::{
    CycleReport, Feed, FeedFetcher, IngestStore, IngestionCycle, InsertOutcome, NewPost, Post,
    Scheduler,
};
