// app/src/pipelines/mod.rs

//! Defines and registers the pipelines of the shop.

use crate::errors::AppError;
use satify_flow::Flows;

pub mod checkout_pipeline;
pub mod contexts;
pub mod payment_ipn_pipeline;

/// Registers every pipeline with `flows`. Called once while building `AppState`.
pub fn register_all_pipelines(flows: &Flows<AppError>) {
  checkout_pipeline::register_checkout_pipeline(flows);
  payment_ipn_pipeline::register_payment_ipn_pipeline(flows);
  tracing::info!("All application pipelines registered.");
}
