//! Change-tracking REST API server.

use std::net::SocketAddr;
use std::sync::Arc;
use track_api::server::{self, AppState};
use track_audit::{AuditStore, AuditStoreConfig, JsonFileStorage};
use track_move::{CoordinatorConfig, EntityCache, StageMoveCoordinator};
use track_remote::HttpStagePersister;
use track_timeline::{StageTimeline, TimelineConfig};
use track_types::{Actor, ActorProvider, StaticActor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Session actor from `TRACK_ACTOR_ID` / `TRACK_ACTOR_NAME`; unset means system.
fn actor_from_env() -> StaticActor {
    let id = std::env::var("TRACK_ACTOR_ID")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let name = std::env::var("TRACK_ACTOR_NAME")
        .ok()
        .filter(|v| !v.trim().is_empty());
    StaticActor(id.map(|id| {
        let name = name.unwrap_or_else(|| id.clone());
        Actor::new(id, name)
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let audit_config = AuditStoreConfig::from_env();
    let audit = match audit_config.path.clone() {
        Some(path) => {
            tracing::info!(path = %path.display(), "audit log persisted to file");
            AuditStore::open(audit_config, Arc::new(JsonFileStorage::new(path))).await
        }
        None => AuditStore::in_memory(audit_config),
    };
    let audit = Arc::new(audit);

    let timeline = StageTimeline::new(Arc::clone(&audit), TimelineConfig::from_env());
    let move_config = CoordinatorConfig::from_env();
    let cache = Arc::new(EntityCache::new("id", move_config.stage_field.clone()));
    let persister = Arc::new(HttpStagePersister::from_env()?);
    tracing::info!(remote = %persister.config().base_url, "stage moves persisted remotely");
    let actors: Arc<dyn ActorProvider> = Arc::new(actor_from_env());
    let coordinator = StageMoveCoordinator::new(
        cache,
        Arc::clone(&audit),
        persister,
        Arc::clone(&actors),
        move_config,
    );

    let state = Arc::new(AppState {
        audit: Arc::clone(&audit),
        timeline,
        coordinator,
        actors,
    });
    let app = server::router(state);
    let addr: SocketAddr = std::env::var("TRACK_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8002".to_string())
        .parse()?;
    tracing::info!("change-tracking API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    audit.flush().await;
    Ok(())
}
