// app/src/models/product.rs

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// The catalog view checkout needs. Catalog CRUD lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  /// VND, whole currency units.
  pub price: i64,
  pub stock: i32,
}
