//! Command routing for the Gator CLI.
//!
//! Commands are plain functions registered by name. Handlers that need a
//! logged-in user are wrapped with [`with_auth`], which resolves the current
//! user from configuration and the database on every call.

pub mod handlers;

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::db::{Database, User, UserRepository};
use crate::{GatorError, Result};

pub use handlers::{aggregate, default_registry, COMMANDS};

/// A parsed command line: name plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<String>,
}

impl Command {
    /// Create a command.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Build a command from process arguments, without the program name.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let name = args.next().ok_or_else(|| {
            GatorError::Validation("not enough arguments: usage: gator <command> [args...]".into())
        })?;
        Ok(Self::new(name, args.collect()))
    }

    /// The argument at `index`, or a validation error showing `usage`.
    pub fn arg(&self, index: usize, usage: &str) -> Result<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| GatorError::Validation(format!("usage: {usage}")))
    }
}

/// State shared by all command handlers.
pub struct AppState {
    /// Database handle.
    pub db: Database,
    /// Loaded configuration. Written back when the current user changes.
    pub config: RwLock<Config>,
}

impl AppState {
    /// Create the state from an open database and loaded configuration.
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config: RwLock::new(config),
        }
    }

    /// Name of the current user, if one is set.
    pub async fn current_user_name(&self) -> Option<String> {
        self.config.read().await.current_user_name.clone()
    }

    /// Resolve the current user from configuration and the database.
    ///
    /// Returns `NotAuthenticated` if no user is set or the user no longer exists.
    pub async fn current_user(&self) -> Result<User> {
        let name = self
            .current_user_name()
            .await
            .ok_or(GatorError::NotAuthenticated)?;

        UserRepository::new(self.db.pool())
            .get_by_name(&name)
            .await?
            .ok_or(GatorError::NotAuthenticated)
    }
}

/// Future returned by command handlers.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<()>>;

/// Handler that runs without a user.
pub type PublicHandler = for<'a> fn(&'a AppState, &'a Command) -> HandlerFuture<'a>;

/// Handler that runs on behalf of the current user.
pub type UserHandler = for<'a> fn(&'a AppState, &'a Command, User) -> HandlerFuture<'a>;

/// A registered command handler.
#[derive(Clone, Copy)]
pub enum Handler {
    /// Runs as-is.
    Public(PublicHandler),
    /// Runs only once a current user has been resolved.
    LoggedIn(UserHandler),
}

impl Handler {
    /// Invoke the handler.
    pub async fn call(&self, state: &AppState, cmd: &Command) -> Result<()> {
        match self {
            Handler::Public(f) => f(state, cmd).await,
            Handler::LoggedIn(f) => {
                let user = state.current_user().await?;
                debug!(user = %user.name, command = %cmd.name, "Running as user");
                f(state, cmd, user).await
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Public(_) => f.write_str("Handler::Public"),
            Handler::LoggedIn(_) => f.write_str("Handler::LoggedIn"),
        }
    }
}

/// Wrap a user-taking handler so it requires a logged-in user.
pub const fn with_auth(handler: UserHandler) -> Handler {
    Handler::LoggedIn(handler)
}

/// Name to handler mapping.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler of the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Whether a command is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Dispatch a command.
    ///
    /// Returns `UnknownCommand` if no handler is registered for its name.
    pub async fn run(&self, state: &AppState, cmd: &Command) -> Result<()> {
        let handler = self
            .handlers
            .get(&cmd.name)
            .ok_or_else(|| GatorError::UnknownCommand(cmd.name.clone()))?;

        debug!(command = %cmd.name, args = ?cmd.args, "Dispatching command");
        handler.call(state, cmd).await
    }
}
