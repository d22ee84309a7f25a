use std::process::ExitCode;

use tracing::debug;

use gator::{default_registry, AppState, Command, Config, Database};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> gator::Result<()> {
    // Load configuration
    let path = Config::default_path()?;
    let config = match Config::load_or_default(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", path.display());
            eprintln!("Using default configuration; changes will not be saved.");
            Config::default()
        }
    };
    config.validate()?;

    // Initialize logging
    if let Err(e) = gator::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        gator::logging::init_console_only(&config.logging.level);
    }

    let mut runtime = config.clone();
    runtime.apply_env_overrides();
    debug!(config = ?path, database = %runtime.database.path, "Starting gator");

    let cmd = Command::from_args(std::env::args().skip(1))?;
    let db = Database::open(&runtime.database.path).await?;
    let state = AppState::new(db, config);
    let registry = default_registry();

    registry.run(&state, &cmd).await
}
