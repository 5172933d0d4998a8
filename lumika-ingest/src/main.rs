//! lumika-ingest - Media Ingest Microservice
//!
//! HTTP service driving library scans, derivative encoding and the
//! placeholder backfill job for a Lumika photo/video library.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lumika_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting lumika-ingest (Media Ingest) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve the data root folder: CLI is not used by this service, so the
    // priority order is LUMIKA_ROOT, then the config file, then the default
    let root_folder =
        lumika_common::config::resolve_root_folder(None, "LUMIKA_ROOT", Some("root_folder"))?;
    let layout = lumika_common::config::DataLayout::new(root_folder);
    layout.ensure_directories()?;

    let db_path = layout.database_path();
    info!("Database: {}", db_path.display());

    let db_pool = lumika_common::db::init::init_database(&db_path).await?;
    info!("Database connection established");

    // Any scan session left non-terminal by a previous run will never
    // progress; mark it cancelled before accepting new work
    let stale = lumika_ingest::db::sessions::cleanup_stale_sessions(&db_pool).await?;
    if stale > 0 {
        info!(stale, "Marked stale scan sessions as cancelled");
    }

    let state = AppState::new(db_pool, layout.derivative_cache_dir());

    let app = lumika_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:5860").await?;
    info!("Listening on http://127.0.0.1:5860");
    info!("Health check: http://127.0.0.1:5860/health");

    axum::serve(listener, app).await?;

    Ok(())
}
