use dotenvy::dotenv;
use std::{path::Path, sync::Arc};
use tiffin_ledger::{
    config::{
        self,
        database::{DEFAULT_DATABASE_URL, create_connection, create_tables},
    },
    errors::Result,
    scheduler::{DailyScheduler, SystemClock},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load settings
    let settings = config::load_default_settings()
        .inspect_err(|e| error!("Critical error loading settings: {}", e))?;
    info!("Successfully processed application settings.");

    // 4. Connect and create tables
    let database_url = settings.resolve_database_url();
    if database_url == DEFAULT_DATABASE_URL {
        std::fs::create_dir_all(Path::new("data"))?;
    }
    let db = create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Run the daily scheduler until Ctrl-C
    let clock = SystemClock::new(settings.scheduler.offset()?);
    let scheduler = DailyScheduler::new(db, Arc::new(settings), Arc::new(clock));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await
}
