use reviewer_assign::config::Config;
use reviewer_assign::{db, server, AssignmentEngine};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    log::info!(
        "[main] Starting reviewer-assign v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match db::initialize(&config.database_path, config.pool_settings()).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!(
                "[main] Failed to open database {}: {}",
                config.database_path.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let engine = Arc::new(AssignmentEngine::new(pool.clone()).with_timeout(config.storage_timeout()));

    let result = server::run(engine, config.bind_addr()).await;
    pool.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[main] {}", e);
            ExitCode::FAILURE
        }
    }
}
