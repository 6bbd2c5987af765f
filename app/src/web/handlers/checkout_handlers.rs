// app/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::ShippingAddress;
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::checkout::CheckoutLine;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use satify_flow::{ContextData, PipelineResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
  #[serde(default)]
  pub items: Vec<CheckoutLine>,
  #[serde(default)]
  pub shipping_address: Option<ShippingAddress>,
}

#[instrument(
    name = "handler::create_order",
    skip(app_state, payload, auth_user),
    fields(user_id = %auth_user.user_id, lines = payload.items.len())
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  payload: web::Json<CreateOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let CreateOrderPayload { items, shipping_address } = payload.into_inner();
  let ctx_data = ContextData::new(CheckoutCtxData::new(
    app_state.get_ref().clone(),
    auth_user.user_id,
    items,
    shipping_address,
  ));

  match app_state.flows.run(ctx_data.clone()).await {
    Ok(PipelineResult::Completed) => {
      let order = ctx_data.read().created_order.clone().ok_or_else(|| {
        AppError::Internal("Checkout completed without producing an order".to_string())
      })?;
      info!(order_id = %order.id, total = order.total, "Checkout succeeded.");
      Ok(HttpResponse::Created().json(order))
    }
    Ok(PipelineResult::Stopped) => {
      warn!("Checkout pipeline stopped before creating an order.");
      Err(AppError::Internal("Checkout was halted unexpectedly".to_string()))
    }
    Err(e) => {
      info!(error = %e, "Checkout rejected.");
      Err(e)
    }
  }
}
