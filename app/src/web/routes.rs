// app/src/web/routes.rs

use actix_web::{web, HttpResponse};

use crate::errors::AppError;
use crate::web::handlers::{checkout_handlers, order_handlers, payment_handlers};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed bodies and query strings answer with the same `{"message"}`
/// shape as every other client error.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(
      web::JsonConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid request body: {}", err)).into()),
    )
    .app_data(
      web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid query string: {}", err)).into()),
    );
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  extractor_configs(cfg);
  cfg.service(
    web::scope("/api")
      .route("/health", web::get().to(health_check_handler))
      // Literal segments are registered ahead of `/{id}`.
      .service(
        web::scope("/orders")
          .route("", web::post().to(checkout_handlers::create_order_handler))
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/me", web::get().to(order_handlers::list_my_orders_handler))
          .route("/export", web::get().to(order_handlers::export_orders_handler))
          .route("/{id}", web::get().to(order_handlers::get_order_handler))
          .route("/{id}/status", web::put().to(order_handlers::update_order_status_handler)),
      )
      .service(
        web::scope("/payments/vnpay")
          .route("/create", web::get().to(payment_handlers::create_payment_handler))
          .route("/return", web::get().to(payment_handlers::vnpay_return_handler))
          .route("/ipn", web::get().to(payment_handlers::vnpay_ipn_handler))
          .route("/ipn", web::post().to(payment_handlers::vnpay_ipn_handler)),
      ),
  );
}
