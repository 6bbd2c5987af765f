// app/src/store/mod.rs

//! Persistence seams for the catalog and the orders.
//!
//! The checkout and status workflows only talk to these traits. `PgStore`
//! backs the server, `MemoryStore` backs the tests.

pub mod memory;
pub mod postgres;

use crate::errors::Result;
use crate::models::{Order, OrderStatus, Product};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const MAX_PAGE_LIMIT: i64 = 100;
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

#[async_trait]
pub trait CatalogStore: Send + Sync {
  /// One batch read; unknown ids are simply absent from the result.
  async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;

  /// Atomically takes `qty` units if at least that many are in stock.
  /// Returns `false`, leaving stock untouched, otherwise.
  async fn try_decrement_stock(&self, product_id: Uuid, qty: i32) -> Result<bool>;

  /// Gives back units taken by `try_decrement_stock`.
  async fn restore_stock(&self, product_id: Uuid, qty: i32) -> Result<()>;
}

/// Fields written together with a status change. `None` keeps the stored
/// value; timestamps are only ever set, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
  pub status: OrderStatus,
  pub tracking_number: Option<String>,
  pub carrier: Option<String>,
  pub estimated_delivery_date: Option<NaiveDate>,
  pub payment_ref: Option<String>,
  pub paid_at: Option<DateTime<Utc>>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
  /// Applies the update to an in-memory copy with the same rules the
  /// database query uses.
  pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
    order.status = self.status;
    if let Some(v) = &self.tracking_number {
      order.tracking_number = Some(v.clone());
    }
    if let Some(v) = &self.carrier {
      order.carrier = Some(v.clone());
    }
    if let Some(v) = self.estimated_delivery_date {
      order.estimated_delivery_date = Some(v);
    }
    if let Some(v) = &self.payment_ref {
      order.payment_ref = Some(v.clone());
    }
    if let Some(v) = self.paid_at {
      order.paid_at = Some(v);
    }
    if let Some(v) = self.shipped_at {
      order.shipped_at = Some(v);
    }
    if let Some(v) = self.delivered_at {
      order.delivered_at = Some(v);
    }
    order.updated_at = now;
  }
}

/// Admin list filter. `from`/`to` bound `created_at` inclusively by day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
  pub status: Option<OrderStatus>,
  pub from: Option<NaiveDate>,
  pub to: Option<NaiveDate>,
  /// Case-insensitive substring of the order id.
  pub q: Option<String>,
  pub page: i64,
  pub limit: i64,
}

impl Default for OrderFilter {
  fn default() -> Self {
    Self {
      status: None,
      from: None,
      to: None,
      q: None,
      page: 1,
      limit: DEFAULT_PAGE_LIMIT,
    }
  }
}

impl OrderFilter {
  /// Rows to skip for `page`. Saturates, so an absurd page number reads as
  /// "past the end" rather than overflowing.
  pub fn offset(&self) -> i64 {
    (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
  }

  pub(crate) fn matches(&self, order: &Order) -> bool {
    if let Some(status) = self.status {
      if order.status != status {
        return false;
      }
    }
    let created = order.created_at.date_naive();
    if self.from.map_or(false, |from| created < from) {
      return false;
    }
    if self.to.map_or(false, |to| created > to) {
      return false;
    }
    match &self.q {
      Some(q) => order.id.to_string().contains(&q.to_lowercase()),
      None => true,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct OrderPage {
  pub data: Vec<Order>,
  /// Matching orders across all pages.
  pub total: i64,
  /// Sum of `total` over all matching orders.
  pub sum: i64,
  /// Matching orders per status, across all pages.
  pub by_status: BTreeMap<OrderStatus, i64>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert_order(&self, order: &Order) -> Result<()>;

  async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>>;

  /// Writes `update` only if the stored status still equals `expected`.
  /// Returns the updated order, or `None` when the status moved underneath
  /// (or the order vanished).
  async fn compare_and_set_status(
    &self,
    order_id: Uuid,
    expected: OrderStatus,
    update: &StatusUpdate,
  ) -> Result<Option<Order>>;

  /// Newest first.
  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;

  async fn query_orders(&self, filter: &OrderFilter) -> Result<OrderPage>;

  /// Newest first, at most `cap` rows, ignoring pagination.
  async fn export_orders(&self, filter: &OrderFilter, cap: i64) -> Result<Vec<Order>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn offset_counts_whole_pages() {
    let filter = OrderFilter { page: 3, limit: 20, ..Default::default() };
    assert_eq!(filter.offset(), 40);
    let first = OrderFilter { page: 0, ..Default::default() };
    assert_eq!(first.offset(), 0);
  }

  #[test]
  fn offset_saturates_on_huge_page_numbers() {
    let filter = OrderFilter { page: i64::MAX, limit: MAX_PAGE_LIMIT, ..Default::default() };
    assert_eq!(filter.offset(), i64::MAX);
  }

  #[test]
  fn id_search_is_a_literal_substring() {
    let order = Order::new(Uuid::new_v4(), Vec::new(), 0, None);
    let prefix = order.id.to_string()[..8].to_uppercase();
    assert!(OrderFilter { q: Some(prefix), ..Default::default() }.matches(&order));
    assert!(!OrderFilter { q: Some("_".to_string()), ..Default::default() }.matches(&order));
    assert!(!OrderFilter { q: Some("%".to_string()), ..Default::default() }.matches(&order));
  }
}
