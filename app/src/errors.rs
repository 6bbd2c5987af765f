// app/src/errors.rs

use crate::models::OrderStatus;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use satify_flow::FlowError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  Auth(String),

  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  NotFound(String),

  /// Message names the product so the buyer knows which line to fix.
  #[error("{0}")]
  InsufficientStock(String),

  #[error("Cannot change order status from {from} to {to}")]
  InvalidTransition { from: OrderStatus, to: OrderStatus },

  #[error("{0}")]
  Conflict(String),

  // The payment variants below are IPN rejections. They never reach an HTTP
  // client as errors; `IpnResponse::for_rejection` maps them to gateway codes.
  #[error("Invalid signature")]
  SignatureMismatch,

  /// Amounts in gateway units (VND * 100). `None` when absent or unrepresentable.
  #[error("Invalid amount (expected {expected:?}, reported {reported:?})")]
  AmountMismatch { expected: Option<i64>, reported: Option<i64> },

  #[error("Order {0} already confirmed")]
  AlreadySettled(Uuid),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::InsufficientStock(_) => StatusCode::BAD_REQUEST,
      AppError::SignatureMismatch | AppError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::InvalidTransition { .. } | AppError::Conflict(_) | AppError::AlreadySettled(_) => StatusCode::CONFLICT,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with server error");
    } else {
      tracing::info!(application_error = %self, status = status.as_u16(), "Responding with client error");
    }

    // Internal details stay in the logs.
    let message = match self {
      AppError::Sqlx(_) => "Database operation failed".to_string(),
      AppError::Workflow { .. } | AppError::Config(_) | AppError::Internal(_) => "Server error".to_string(),
      other => other.to_string(),
    };
    HttpResponse::build(status).json(json!({ "message": message }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
