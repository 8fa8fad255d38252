//! Orderdesk - multi-role order desk backend

use std::sync::Arc;

use anyhow::Result;
use orderdesk::auth::AuthGateway;
use orderdesk::config::Config;
use orderdesk::http::{self, AppState};
use orderdesk::publisher::{EventPublisher, LogPublisher, NatsPublisher};
use orderdesk::services::Services;
use orderdesk::store::{MemoryStore, PgStore, Store};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client, config.event_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events go to the log only");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let auth = Arc::new(AuthGateway::new(&config.jwt_secret, config.token_ttl));
    let state = AppState { services: Services::new(store, events, auth) };
    let app = http::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

    tracing::info!("orderdesk listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
