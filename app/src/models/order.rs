// app/src/models/order.rs

use super::OrderItem;
use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type as SqlxType;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  #[default]
  Created,
  Paid,
  Shipped,
  Completed,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 5] = [
    OrderStatus::Created,
    OrderStatus::Paid,
    OrderStatus::Shipped,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Created => "created",
      OrderStatus::Paid => "paid",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Completed => "completed",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  /// No transition leaves a terminal state (except a forced admin override).
  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
  }

  /// The order has been paid for, whatever happened to it afterwards.
  pub fn is_settled(self) -> bool {
    matches!(self, OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Completed)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OrderStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| AppError::Validation("Invalid status".to_string()))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub phone: String,
  #[serde(default)]
  pub address: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub items: Vec<OrderItem>,
  /// VND, whole currency units. Always the sum of the line totals.
  pub total: i64,
  pub status: OrderStatus,
  pub shipping_address: Option<ShippingAddress>,
  pub payment_ref: Option<String>,
  pub paid_at: Option<DateTime<Utc>>,
  pub coupon_code: Option<String>,
  pub discount: i64,
  pub tracking_number: Option<String>,
  pub carrier: Option<String>,
  pub estimated_delivery_date: Option<NaiveDate>,
  pub shipped_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// A fresh order in the `created` state.
  pub fn new(user_id: Uuid, items: Vec<OrderItem>, total: i64, shipping_address: Option<ShippingAddress>) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      user_id,
      items,
      total,
      status: OrderStatus::Created,
      shipping_address,
      payment_ref: None,
      paid_at: None,
      coupon_code: None,
      discount: 0,
      tracking_number: None,
      carrier: None,
      estimated_delivery_date: None,
      shipped_at: None,
      delivered_at: None,
      created_at: now,
      updated_at: now,
    }
  }

  /// Number of distinct lines, as shown in the admin export.
  pub fn item_count(&self) -> usize {
    self.items.len()
  }
}
