// app/src/store/postgres.rs

//! Postgres-backed catalog and order stores.

use super::{CatalogStore, OrderFilter, OrderPage, OrderStore, StatusUpdate};
use crate::errors::Result;
use crate::models::{Order, OrderItem, OrderStatus, Product, ShippingAddress};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, total, status, shipping_address, payment_ref, paid_at, coupon_code, \
   discount, tracking_number, carrier, estimated_delivery_date, shipped_at, delivered_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  /// Loads the line items for `rows` in one query and assembles the orders,
  /// preserving the row order.
  async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    if rows.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let item_rows: Vec<OrderItemRow> = sqlx::query_as(
      "SELECT order_id, product_id, name, qty, price
       FROM order_items
       WHERE order_id = ANY($1)
       ORDER BY order_id, position",
    )
    .bind(&ids)
    .fetch_all(&self.pool)
    .await?;

    let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in item_rows {
      items_by_order.entry(row.order_id).or_default().push(OrderItem {
        product_id: row.product_id,
        name: row.name,
        qty: row.qty,
        price: row.price,
      });
    }

    Ok(
      rows
        .into_iter()
        .map(|row| {
          let items = items_by_order.remove(&row.id).unwrap_or_default();
          row.into_order(items)
        })
        .collect(),
    )
  }
}

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  user_id: Uuid,
  total: i64,
  status: OrderStatus,
  shipping_address: Option<Json<ShippingAddress>>,
  payment_ref: Option<String>,
  paid_at: Option<DateTime<Utc>>,
  coupon_code: Option<String>,
  discount: i64,
  tracking_number: Option<String>,
  carrier: Option<String>,
  estimated_delivery_date: Option<NaiveDate>,
  shipped_at: Option<DateTime<Utc>>,
  delivered_at: Option<DateTime<Utc>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl OrderRow {
  fn into_order(self, items: Vec<OrderItem>) -> Order {
    Order {
      id: self.id,
      user_id: self.user_id,
      items,
      total: self.total,
      status: self.status,
      shipping_address: self.shipping_address.map(|json| json.0),
      payment_ref: self.payment_ref,
      paid_at: self.paid_at,
      coupon_code: self.coupon_code,
      discount: self.discount,
      tracking_number: self.tracking_number,
      carrier: self.carrier,
      estimated_delivery_date: self.estimated_delivery_date,
      shipped_at: self.shipped_at,
      delivered_at: self.delivered_at,
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }
}

#[derive(FromRow)]
struct OrderItemRow {
  order_id: Uuid,
  product_id: Uuid,
  name: String,
  qty: i32,
  price: i64,
}

/// Appends the `WHERE` clause shared by the list, summary and export queries.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
  qb.push(" WHERE TRUE");
  if let Some(status) = filter.status {
    qb.push(" AND status = ").push_bind(status);
  }
  if let Some(from) = filter.from {
    qb.push(" AND created_at::date >= ").push_bind(from);
  }
  if let Some(to) = filter.to {
    qb.push(" AND created_at::date <= ").push_bind(to);
  }
  if let Some(q) = &filter.q {
    qb.push(" AND id::text ILIKE ")
      .push_bind(contains_pattern(q))
      .push(" ESCAPE '\\'");
  }
}

/// `%q%` with the LIKE metacharacters in `q` escaped, so the search is a
/// literal substring match.
fn contains_pattern(q: &str) -> String {
  let mut pattern = String::with_capacity(q.len() + 2);
  pattern.push('%');
  for c in q.chars() {
    if matches!(c, '\\' | '%' | '_') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}

#[async_trait]
impl CatalogStore for PgStore {
  async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>("SELECT id, name, price, stock FROM products WHERE id = ANY($1)")
      .bind(ids)
      .fetch_all(&self.pool)
      .await?;
    Ok(products)
  }

  #[instrument(name = "store::try_decrement_stock", skip(self), err)]
  async fn try_decrement_stock(&self, product_id: Uuid, qty: i32) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE products SET stock = stock - $1, updated_at = NOW()
       WHERE id = $2 AND stock >= $1",
    )
    .bind(qty)
    .bind(product_id)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(name = "store::restore_stock", skip(self), err)]
  async fn restore_stock(&self, product_id: Uuid, qty: i32) -> Result<()> {
    sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
      .bind(qty)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgStore {
  #[instrument(name = "store::insert_order", skip_all, fields(order_id = %order.id), err)]
  async fn insert_order(&self, order: &Order) -> Result<()> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "INSERT INTO orders (id, user_id, total, status, shipping_address, coupon_code, discount, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.total)
    .bind(order.status)
    .bind(order.shipping_address.clone().map(Json))
    .bind(order.coupon_code.as_deref())
    .bind(order.discount)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
      sqlx::query(
        "INSERT INTO order_items (order_id, position, product_id, name, qty, price)
         VALUES ($1, $2, $3, $4, $5, $6)",
      )
      .bind(order.id)
      .bind(position as i32)
      .bind(item.product_id)
      .bind(&item.name)
      .bind(item.qty)
      .bind(item.price)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    match row {
      Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
      None => Ok(None),
    }
  }

  #[instrument(name = "store::compare_and_set_status", skip(self, update), fields(to = %update.status), err)]
  async fn compare_and_set_status(
    &self,
    order_id: Uuid,
    expected: OrderStatus,
    update: &StatusUpdate,
  ) -> Result<Option<Order>> {
    let updated: Option<(Uuid,)> = sqlx::query_as(
      "UPDATE orders SET
         status = $3,
         tracking_number = COALESCE($4, tracking_number),
         carrier = COALESCE($5, carrier),
         estimated_delivery_date = COALESCE($6, estimated_delivery_date),
         payment_ref = COALESCE($7, payment_ref),
         paid_at = COALESCE($8, paid_at),
         shipped_at = COALESCE($9, shipped_at),
         delivered_at = COALESCE($10, delivered_at),
         updated_at = NOW()
       WHERE id = $1 AND status = $2
       RETURNING id",
    )
    .bind(order_id)
    .bind(expected)
    .bind(update.status)
    .bind(update.tracking_number.as_deref())
    .bind(update.carrier.as_deref())
    .bind(update.estimated_delivery_date)
    .bind(update.payment_ref.as_deref())
    .bind(update.paid_at)
    .bind(update.shipped_at)
    .bind(update.delivered_at)
    .fetch_optional(&self.pool)
    .await?;

    match updated {
      Some(_) => self.find_order(order_id).await,
      None => Ok(None),
    }
  }

  async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
      ORDER_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    self.hydrate(rows).await
  }

  #[instrument(name = "store::query_orders", skip(self), err)]
  async fn query_orders(&self, filter: &OrderFilter) -> Result<OrderPage> {
    let mut summary = QueryBuilder::<Postgres>::new(
      "SELECT COUNT(*)::BIGINT AS total, COALESCE(SUM(total), 0)::BIGINT AS sum FROM orders",
    );
    push_filter(&mut summary, filter);
    let summary_row = summary.build().fetch_one(&self.pool).await?;
    let total: i64 = summary_row.try_get("total")?;
    let sum: i64 = summary_row.try_get("sum")?;

    let mut grouped = QueryBuilder::<Postgres>::new("SELECT status, COUNT(*)::BIGINT FROM orders");
    push_filter(&mut grouped, filter);
    grouped.push(" GROUP BY status");
    let by_status = grouped
      .build_query_as::<(OrderStatus, i64)>()
      .fetch_all(&self.pool)
      .await?
      .into_iter()
      .collect();

    let mut listing = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
    push_filter(&mut listing, filter);
    listing
      .push(" ORDER BY created_at DESC LIMIT ")
      .push_bind(filter.limit)
      .push(" OFFSET ")
      .push_bind(filter.offset());
    let rows = listing.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;

    Ok(OrderPage {
      data: self.hydrate(rows).await?,
      total,
      sum,
      by_status,
    })
  }

  async fn export_orders(&self, filter: &OrderFilter, cap: i64) -> Result<Vec<Order>> {
    let mut export = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
    push_filter(&mut export, filter);
    export.push(" ORDER BY created_at DESC LIMIT ").push_bind(cap);
    let rows = export.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;
    self.hydrate(rows).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn search_pattern_escapes_like_metacharacters() {
    assert_eq!(contains_pattern("ab12"), "%ab12%");
    assert_eq!(contains_pattern("_"), "%\\_%");
    assert_eq!(contains_pattern("50%"), "%50\\%%");
    assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
  }
}
