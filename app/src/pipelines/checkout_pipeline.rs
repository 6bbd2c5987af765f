// app/src/pipelines/checkout_pipeline.rs

//! Cart -> order. Stock is reserved before the order row exists and given
//! back if the order cannot be written, so neither outlives the other.

use crate::errors::AppError;
use crate::models::Order;
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::checkout;
use satify_flow::{ContextData, Flows, Pipeline, PipelineControl};
use std::collections::HashMap;
use tracing::{error, info};

pub fn build_checkout_pipeline() -> Pipeline<CheckoutCtxData, AppError> {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("validate_checkout_request", false, None),
    ("load_catalog_products", false, None),
    ("price_order_lines", false, None),
    ("reserve_stock", false, None),
    ("persist_order", false, None),
  ]);

  p.on_root("validate_checkout_request", validate_checkout_request);
  p.on_root("load_catalog_products", load_catalog_products);
  p.on_root("price_order_lines", price_order_lines);
  p.on_root("reserve_stock", reserve_stock);
  p.on_root("persist_order", persist_order);
  p
}

pub fn register_checkout_pipeline(flows: &Flows<AppError>) {
  flows.register_pipeline(build_checkout_pipeline());
  info!("Checkout pipeline registered.");
}

// Step 1: parse ids, clamp quantities.
async fn validate_checkout_request(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (user_id, lines) = {
    let guard = ctx_data.read();
    (guard.user_id, guard.lines.clone())
  };
  let requested = checkout::normalize_lines(&lines)?;
  info!(%user_id, lines = requested.len(), "Checkout request validated.");
  ctx_data.write().requested = requested;
  Ok(PipelineControl::Continue)
}

// Step 2: one batch read for the distinct products of the cart.
async fn load_catalog_products(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (catalog_store, ids) = {
    let guard = ctx_data.read();
    (guard.app_state.catalog.clone(), checkout::distinct_product_ids(&guard.requested))
  };
  let products = catalog_store.find_products(&ids).await?;
  info!(requested = ids.len(), found = products.len(), "Catalog products loaded.");

  let catalog: HashMap<_, _> = products.into_iter().map(|p| (p.id, p)).collect();
  ctx_data.write().catalog = catalog;
  Ok(PipelineControl::Continue)
}

// Step 3: catalog prices only; per-line stock check; checked total.
async fn price_order_lines(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let items = checkout::price_lines(&guard.requested, &guard.catalog)?;
  let total = checkout::compute_total(&items)?;
  info!(lines = items.len(), total, "Order lines priced.");
  guard.items = items;
  guard.total = total;
  Ok(PipelineControl::Continue)
}

// Step 4: conditional decrement per product; all-or-nothing.
async fn reserve_stock(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (catalog_store, reservations) = {
    let guard = ctx_data.read();
    (guard.app_state.catalog.clone(), checkout::aggregate_reservations(&guard.items)?)
  };
  checkout::reserve_stock(catalog_store.as_ref(), &reservations).await?;
  info!(products = reservations.len(), "Stock reserved.");
  ctx_data.write().reservations = reservations;
  Ok(PipelineControl::Continue)
}

// Step 5: write the order; on failure hand the stock back.
async fn persist_order(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (catalog_store, order_store, order, reservations) = {
    let guard = ctx_data.read();
    let order = Order::new(
      guard.user_id,
      guard.items.clone(),
      guard.total,
      guard.shipping_address.clone(),
    );
    (
      guard.app_state.catalog.clone(),
      guard.app_state.orders.clone(),
      order,
      guard.reservations.clone(),
    )
  };

  if let Err(e) = order_store.insert_order(&order).await {
    error!(order_id = %order.id, error = %e, "Persisting order failed; releasing reserved stock.");
    checkout::release_stock(catalog_store.as_ref(), &reservations).await;
    return Err(e);
  }

  info!(order_id = %order.id, user_id = %order.user_id, total = order.total, "Order created.");
  ctx_data.write().created_order = Some(order);
  Ok(PipelineControl::Continue)
}
