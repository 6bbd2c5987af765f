// app/src/store/memory.rs

//! In-process stores used by the tests and for local runs without Postgres.

use super::{CatalogStore, OrderFilter, OrderPage, OrderStore, StatusUpdate};
use crate::errors::{AppError, Result};
use crate::models::{Order, OrderStatus, Product};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
  products: Mutex<HashMap<Uuid, Product>>,
  orders: Mutex<HashMap<Uuid, Order>>,
  fail_next_insert: Mutex<bool>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_product(&self, product: Product) {
    self.products.lock().insert(product.id, product);
  }

  pub fn stock_of(&self, product_id: Uuid) -> Option<i32> {
    self.products.lock().get(&product_id).map(|p| p.stock)
  }

  pub fn order(&self, order_id: Uuid) -> Option<Order> {
    self.orders.lock().get(&order_id).cloned()
  }

  pub fn order_count(&self) -> usize {
    self.orders.lock().len()
  }

  /// Makes the next `insert_order` fail, to exercise the rollback path.
  pub fn fail_next_insert(&self) {
    *self.fail_next_insert.lock() = true;
  }

  /// Overwrites an order as-is, bypassing the status rules. Test setup only.
  pub fn put_order(&self, order: Order) {
    self.orders.lock().insert(order.id, order);
  }

  fn matching_newest_first(&self, filter: &OrderFilter) -> Vec<Order> {
    let mut matching: Vec<Order> = self.orders.lock().values().filter(|o| filter.matches(o)).cloned().collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matching
  }
}

#[async_trait]
impl CatalogStore for MemoryStore {
  async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
    let products = self.products.lock();
    Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
  }

  async fn try_decrement_stock(&self, product_id: Uuid, qty: i32) -> Result<bool> {
    let mut products = self.products.lock();
    match products.get_mut(&product_id) {
      Some(product) if product.stock >= qty => {
        product.stock -= qty;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn restore_stock(&self, product_id: Uuid, qty: i32) -> Result<()> {
    let mut products = self.products.lock();
    let product = products
      .get_mut(&product_id)
      .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
    product.stock = product.stock.saturating_add(qty);
    Ok(())
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn insert_order(&self, order: &Order) -> Result<()> {
    {
      let mut fail = self.fail_next_insert.lock();
      if *fail {
        *fail = false;
        return Err(AppError::Internal("simulated order insert failure".to_string()));
      }
    }
    self.orders.lock().insert(order.id, order.clone());
    Ok(())
  }

  async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(self.orders.lock().get(&order_id).cloned())
  }

  async fn compare_and_set_status(
    &self,
    order_id: Uuid,
    expected: OrderStatus,
    update: &StatusUpdate,
  ) -> Result<Option<Order>> {
    let mut orders = self.orders.lock();
    match orders.get_mut(&order_id) {
      Some(order) if order.status == expected => {
        update.apply_to(order, Utc::now());
        Ok(Some(order.clone()))
      }
      _ => Ok(None),
    }
  }

  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let mut orders: Vec<Order> = self.orders.lock().values().filter(|o| o.user_id == user_id).cloned().collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
  }

  async fn query_orders(&self, filter: &OrderFilter) -> Result<OrderPage> {
    let matching = self.matching_newest_first(filter);
    let mut page = OrderPage {
      total: matching.len() as i64,
      sum: matching.iter().map(|o| o.total).sum(),
      ..Default::default()
    };
    for order in &matching {
      *page.by_status.entry(order.status).or_insert(0) += 1;
    }
    page.data = matching
      .into_iter()
      .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
      .take(filter.limit as usize)
      .collect();
    Ok(page)
  }

  async fn export_orders(&self, filter: &OrderFilter, cap: i64) -> Result<Vec<Order>> {
    let mut matching = self.matching_newest_first(filter);
    matching.truncate(cap.max(0) as usize);
    Ok(matching)
  }
}
