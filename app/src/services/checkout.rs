// app/src/services/checkout.rs

//! Building blocks of the checkout pipeline: cart normalisation, re-pricing
//! against the catalog, and stock reservation with rollback.

use crate::errors::{AppError, Result};
use crate::models::{OrderItem, Product};
use crate::store::CatalogStore;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// One cart line as sent by the client. Prices always come from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLine {
  #[serde(alias = "productId")]
  pub product: String,
  #[serde(default, alias = "quantity")]
  pub qty: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedLine {
  pub product_id: Uuid,
  /// Always >= 1.
  pub qty: i64,
}

/// Stock taken for one product, possibly covering several cart lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
  pub product_id: Uuid,
  pub name: String,
  pub qty: i32,
}

/// Parses product ids and clamps quantities to at least 1.
///
/// Ids that do not parse cannot exist in the catalog, so they fail the same
/// way an unknown id does.
pub fn normalize_lines(lines: &[CheckoutLine]) -> Result<Vec<RequestedLine>> {
  if lines.is_empty() {
    return Err(AppError::Validation("Items is required".to_string()));
  }

  lines
    .iter()
    .map(|line| {
      let product_id = Uuid::parse_str(line.product.trim())
        .map_err(|_| AppError::NotFound(format!("Product not found: {}", line.product)))?;
      let qty = match line.qty {
        None => 1,
        Some(q) if q < 1 => {
          warn!(product_id = %product_id, requested_qty = q, "Clamping non-positive quantity to 1.");
          1
        }
        Some(q) => q,
      };
      Ok(RequestedLine { product_id, qty })
    })
    .collect()
}

/// Distinct product ids in first-seen order, for the batch catalog read.
pub fn distinct_product_ids(lines: &[RequestedLine]) -> Vec<Uuid> {
  let mut seen = HashSet::new();
  lines
    .iter()
    .filter(|line| seen.insert(line.product_id))
    .map(|line| line.product_id)
    .collect()
}

/// Re-prices every requested line from the catalog and checks each line
/// against the stock it saw.
pub fn price_lines(lines: &[RequestedLine], catalog: &HashMap<Uuid, Product>) -> Result<Vec<OrderItem>> {
  lines
    .iter()
    .map(|line| {
      let product = catalog
        .get(&line.product_id)
        .ok_or_else(|| AppError::NotFound(format!("Product not found: {}", line.product_id)))?;
      if line.qty > i64::from(product.stock) {
        return Err(insufficient_stock(&product.name));
      }
      // qty <= stock <= i32::MAX here.
      let qty = i32::try_from(line.qty).map_err(|_| insufficient_stock(&product.name))?;
      Ok(OrderItem {
        product_id: product.id,
        name: product.name.clone(),
        qty,
        price: product.price,
      })
    })
    .collect()
}

/// Σ qty * price, refusing to wrap.
pub fn compute_total(items: &[OrderItem]) -> Result<i64> {
  items.iter().try_fold(0i64, |acc, item| {
    item
      .line_total()
      .and_then(|line| acc.checked_add(line))
      .ok_or_else(|| AppError::Validation("Order total is too large".to_string()))
  })
}

/// One reservation per product, ordered by product id so that concurrent
/// checkouts touch rows in the same order.
pub fn aggregate_reservations(items: &[OrderItem]) -> Result<Vec<Reservation>> {
  let mut per_product: BTreeMap<Uuid, (String, i64)> = BTreeMap::new();
  for item in items {
    let entry = per_product
      .entry(item.product_id)
      .or_insert_with(|| (item.name.clone(), 0));
    entry.1 += i64::from(item.qty);
  }

  per_product
    .into_iter()
    .map(|(product_id, (name, qty))| {
      let qty = i32::try_from(qty).map_err(|_| insufficient_stock(&name))?;
      Ok(Reservation { product_id, name, qty })
    })
    .collect()
}

/// Takes stock for every reservation. When one is refused, everything taken
/// so far is given back and the call fails with `InsufficientStock`.
pub async fn reserve_stock(catalog: &dyn CatalogStore, reservations: &[Reservation]) -> Result<()> {
  for (idx, reservation) in reservations.iter().enumerate() {
    let outcome = catalog
      .try_decrement_stock(reservation.product_id, reservation.qty)
      .await;
    let failure = match outcome {
      Ok(true) => continue,
      Ok(false) => {
        info!(
          product_id = %reservation.product_id,
          qty = reservation.qty,
          "Stock reservation refused."
        );
        insufficient_stock(&reservation.name)
      }
      Err(e) => e,
    };
    release_stock(catalog, &reservations[..idx]).await;
    return Err(failure);
  }
  Ok(())
}

/// Best effort: a failed release is logged and the rest still run.
pub async fn release_stock(catalog: &dyn CatalogStore, reservations: &[Reservation]) {
  for reservation in reservations {
    if let Err(e) = catalog.restore_stock(reservation.product_id, reservation.qty).await {
      error!(
        product_id = %reservation.product_id,
        qty = reservation.qty,
        error = %e,
        "Failed to release reserved stock; manual correction needed."
      );
    }
  }
}

fn insufficient_stock(product_name: &str) -> AppError {
  AppError::InsufficientStock(format!("Insufficient stock for product '{}'", product_name))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn line(product: &str, qty: Option<i64>) -> CheckoutLine {
    CheckoutLine {
      product: product.to_string(),
      qty,
    }
  }

  fn product(name: &str, price: i64, stock: i32) -> Product {
    Product {
      id: Uuid::new_v4(),
      name: name.to_string(),
      price,
      stock,
    }
  }

  #[test]
  fn empty_cart_is_rejected() {
    assert!(matches!(normalize_lines(&[]), Err(AppError::Validation(_))));
  }

  #[test]
  fn quantities_are_clamped_to_one() {
    let id = Uuid::new_v4().to_string();
    let lines = normalize_lines(&[line(&id, Some(0)), line(&id, Some(-3)), line(&id, None), line(&id, Some(4))]).unwrap();
    let qtys: Vec<i64> = lines.iter().map(|l| l.qty).collect();
    assert_eq!(qtys, vec![1, 1, 1, 4]);
  }

  #[test]
  fn malformed_id_is_not_found() {
    assert!(matches!(normalize_lines(&[line("abc", Some(1))]), Err(AppError::NotFound(_))));
  }

  #[test]
  fn client_line_accepts_aliases_and_drops_client_price() {
    let id = Uuid::new_v4();
    let parsed: CheckoutLine =
      serde_json::from_value(serde_json::json!({"productId": id.to_string(), "quantity": 2, "price": 1})).unwrap();
    assert_eq!(parsed.product, id.to_string());
    assert_eq!(parsed.qty, Some(2));
  }

  #[test]
  fn distinct_ids_keep_first_seen_order() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let lines = vec![
      RequestedLine { product_id: b, qty: 1 },
      RequestedLine { product_id: a, qty: 1 },
      RequestedLine { product_id: b, qty: 2 },
    ];
    assert_eq!(distinct_product_ids(&lines), vec![b, a]);
  }

  #[test]
  fn pricing_uses_catalog_price_and_names_short_product() {
    let food = product("Cat food", 120_000, 3);
    let catalog: HashMap<Uuid, Product> = [(food.id, food.clone())].into_iter().collect();

    let items = price_lines(&[RequestedLine { product_id: food.id, qty: 2 }], &catalog).unwrap();
    assert_eq!(items[0].price, 120_000);
    assert_eq!(items[0].name, "Cat food");

    let err = price_lines(&[RequestedLine { product_id: food.id, qty: 4 }], &catalog).unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(ref m) if m.contains("Cat food")));

    let huge = price_lines(&[RequestedLine { product_id: food.id, qty: i64::MAX }], &catalog).unwrap_err();
    assert!(matches!(huge, AppError::InsufficientStock(_)));
  }

  #[test]
  fn total_is_sum_of_lines_and_overflow_is_rejected() {
    let a = OrderItem { product_id: Uuid::new_v4(), name: "a".into(), qty: 2, price: 50_000 };
    let b = OrderItem { product_id: Uuid::new_v4(), name: "b".into(), qty: 1, price: 15_000 };
    assert_eq!(compute_total(&[a.clone(), b]).unwrap(), 115_000);

    let big = OrderItem { product_id: Uuid::new_v4(), name: "big".into(), qty: i32::MAX, price: i64::MAX / 2 };
    assert!(matches!(compute_total(&[big]), Err(AppError::Validation(_))));
  }

  #[test]
  fn repeated_lines_are_aggregated_per_product() {
    let id = Uuid::new_v4();
    let items = vec![
      OrderItem { product_id: id, name: "Leash".into(), qty: 2, price: 1 },
      OrderItem { product_id: id, name: "Leash".into(), qty: 3, price: 1 },
    ];
    let reservations = aggregate_reservations(&items).unwrap();
    assert_eq!(reservations, vec![Reservation { product_id: id, name: "Leash".into(), qty: 5 }]);
  }
}
