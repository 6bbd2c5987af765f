// app/src/models/order_item.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced line of an order. `name` and `price` are snapshots of the catalog
/// at checkout time and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub product_id: Uuid,
  pub name: String,
  pub qty: i32,
  /// Unit price in VND.
  pub price: i64,
}

impl OrderItem {
  /// `qty * price`, or `None` on overflow.
  pub fn line_total(&self) -> Option<i64> {
    i64::from(self.qty).checked_mul(self.price)
  }
}
