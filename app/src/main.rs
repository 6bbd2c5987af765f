// app/src/main.rs

use satify_shop::config::AppConfig;
use satify_shop::state::AppState;
use satify_shop::store::postgres::PgStore;
use satify_shop::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(json_logs: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  if json_logs {
    builder.json().init();
  } else {
    builder.init();
  }
}

fn fatal(what: &str, e: impl std::fmt::Display) -> std::io::Error {
  tracing::error!(error = %e, "{}", what);
  std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  // Configuration (including `.env`) is read first: it decides the log format.
  let loaded = AppConfig::from_env();
  init_tracing(loaded.as_ref().map_or(false, |cfg| cfg.json_logs));

  tracing::info!("Starting satify-shop server...");

  let app_config = loaded.map_err(|e| fatal("Failed to load application configuration", e))?;
  app_config.log_summary();

  let db_pool = PgPoolOptions::new()
    .max_connections(10)
    .acquire_timeout(Duration::from_secs(5))
    .connect(&app_config.database_url)
    .await
    .map_err(|e| fatal("Failed to connect to the database", e))?;
  tracing::info!("Successfully connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .map_err(|e| fatal("Database migration failed", e))?;
    tracing::info!("Database migrations applied.");
  }

  let store = Arc::new(PgStore::new(db_pool));
  let server_address = app_config.bind_address();
  let app_state =
    AppState::new(app_config, store.clone(), store).map_err(|e| fatal("Failed to build application state", e))?;
  tracing::info!("Pipelines registered.");

  tracing::info!("Binding server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
