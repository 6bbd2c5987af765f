// app/src/pipelines/contexts.rs

//! Data carried through the pipelines. Handlers receive these wrapped in
//! `satify_flow::ContextData`.

use crate::models::{Order, OrderItem, Product, ShippingAddress};
use crate::services::checkout::{CheckoutLine, RequestedLine, Reservation};
use crate::services::{IpnResponse, VerifiedCallback};
use crate::state::AppState;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub user_id: Uuid,
  /// Cart as received.
  pub lines: Vec<CheckoutLine>,
  pub shipping_address: Option<ShippingAddress>,

  // Filled in by the pipeline, in step order.
  pub requested: Vec<RequestedLine>,
  pub catalog: HashMap<Uuid, Product>,
  pub items: Vec<OrderItem>,
  pub total: i64,
  pub reservations: Vec<Reservation>,
  pub created_order: Option<Order>,
}

impl CheckoutCtxData {
  pub fn new(
    app_state: AppState,
    user_id: Uuid,
    lines: Vec<CheckoutLine>,
    shipping_address: Option<ShippingAddress>,
  ) -> Self {
    Self {
      app_state,
      user_id,
      lines,
      shipping_address,
      requested: Vec::new(),
      catalog: HashMap::new(),
      items: Vec::new(),
      total: 0,
      reservations: Vec::new(),
      created_order: None,
    }
  }
}

impl std::fmt::Debug for CheckoutCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CheckoutCtxData")
      .field("user_id", &self.user_id)
      .field("lines", &self.lines)
      .field("shipping_address", &self.shipping_address)
      .field("requested", &self.requested)
      .field("catalog", &self.catalog)
      .field("items", &self.items)
      .field("total", &self.total)
      .field("reservations", &self.reservations)
      .field("created_order", &self.created_order)
      .finish_non_exhaustive()
  }
}

#[derive(Clone)]
pub struct PaymentIpnCtxData {
  pub app_state: AppState,
  /// Every parameter of the callback, signature included.
  pub params: Vec<(String, String)>,

  pub callback: Option<VerifiedCallback>,
  pub order: Option<Order>,
  /// Set by whichever step decides the outcome.
  pub response: Option<IpnResponse>,
}

impl PaymentIpnCtxData {
  pub fn new(app_state: AppState, params: Vec<(String, String)>) -> Self {
    Self {
      app_state,
      params,
      callback: None,
      order: None,
      response: None,
    }
  }
}
