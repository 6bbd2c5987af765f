// app/src/state.rs

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::pipelines;
use crate::services::{OrderStatusMachine, VnpayGateway};
use crate::store::{CatalogStore, OrderStore};
use satify_flow::Flows;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub flows: Arc<Flows<AppError>>,
  pub config: Arc<AppConfig>,
  pub catalog: Arc<dyn CatalogStore>,
  pub orders: Arc<dyn OrderStore>,
  pub gateway: Arc<VnpayGateway>,
  pub status_machine: OrderStatusMachine,
}

impl AppState {
  /// Wires the stores and services and registers every pipeline.
  pub fn new(config: AppConfig, catalog: Arc<dyn CatalogStore>, orders: Arc<dyn OrderStore>) -> Result<Self> {
    let gateway = Arc::new(VnpayGateway::new(config.vnpay.clone())?);
    let flows = Arc::new(Flows::<AppError>::new());
    pipelines::register_all_pipelines(&flows);

    Ok(Self {
      flows,
      config: Arc::new(config),
      status_machine: OrderStatusMachine::new(orders.clone()),
      catalog,
      orders,
      gateway,
    })
  }
}
