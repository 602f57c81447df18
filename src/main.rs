use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use support_realtime_service::{
    config::Config,
    handlers,
    logging,
    services::{NotificationEmitter, NotificationStore, PgNotificationStore},
    state::AppState,
    websocket::RealtimeHub,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Arc::new(Config::from_env()?);

    let db = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("connected to database");

    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(db));
    let hub = RealtimeHub::new_shared();
    let notifications = Arc::new(NotificationEmitter::new(store.clone(), hub.clone()));

    notifications
        .seed_templates()
        .await
        .context("failed to seed notification templates")?;

    let state = AppState {
        hub,
        store,
        notifications,
        config: config.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%bind_addr, "starting support-realtime-service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(|| async { "OK" }))
            .configure(handlers::websocket::register_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
