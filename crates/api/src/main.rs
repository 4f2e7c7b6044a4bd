use std::sync::Arc;

use anyhow::Context;

use garrison_api::app::{self, services, AppServices};
use garrison_catalog::InMemoryCatalog;
use garrison_infra::store::PostgresCatalog;
use garrison_infra::EngineConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    garrison_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let bind_addr = std::env::var("GARRISON_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let seed_demo = std::env::var("GARRISON_SEED_DEMO").is_ok_and(|v| v == "1" || v == "true");
    let config = EngineConfig::from_env();

    let wired = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let wired = AppServices::postgres(pool.clone(), config)
                .await
                .context("failed to prepare postgres schema")?;
            if seed_demo {
                services::seed_postgres(&PostgresCatalog::new(pool))
                    .await
                    .context("failed to seed demo catalog")?;
            }
            tracing::info!("using postgres storage");
            wired
        }
        Err(_) => {
            let catalog = Arc::new(InMemoryCatalog::new());
            services::seed_in_memory(&catalog).context("failed to seed demo catalog")?;
            tracing::warn!("DATABASE_URL not set; using in-memory storage with the demo catalog");
            AppServices::in_memory(catalog, config)
        }
    };
    let wired = Arc::new(wired);
    services::spawn_event_log(wired.bus()).context("failed to start event log thread")?;

    let app = app::build_app(&jwt_secret, wired);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
