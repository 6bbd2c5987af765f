// app/src/models/mod.rs

//! Order and catalog records.

pub mod order;
pub mod order_item;
pub mod product;

pub use order::{Order, OrderStatus, ShippingAddress};
pub use order_item::OrderItem;
pub use product::Product;
