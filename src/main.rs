use roomrelay::{config::Config, cors, db, retention::RetentionTask, router, shutdown_signal, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url, config.database_max_connections)?;
    match db::init_schema(&db_pool).await {
        Ok(()) => tracing::info!("database ready"),
        Err(e) => tracing::error!(error = %e, "database unavailable, requests will fail until it recovers"),
    }

    let app_state = AppState::new(db_pool);
    let retention = RetentionTask::spawn(app_state.store.clone(), config.retention_horizon, config.sweep_interval);

    let app = router(app_state.clone()).layer(cors(&config));
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, production = config.production, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    retention.shutdown().await;
    app_state.db_pool.close().await;
    Ok(())
}
