mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

use zoll_scheduler::{SandboxRunner, Scheduler};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    zoll_core::config::load_dotenv();
    let config = zoll_core::Config::from_env();
    config.log_summary();

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let runner = Arc::new(SandboxRunner::new(config.runner.clone()));
    let scheduler = Arc::new(Scheduler::new(&config, runner));
    scheduler.spawn();

    let state = Arc::new(AppState::new(scheduler.clone()));
    let app = router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    scheduler.shutdown().await;
    Ok(())
}
