// app/tests/common/mod.rs

#![allow(dead_code)]

use once_cell::sync::Lazy;
use satify_shop::config::AppConfig;
use satify_shop::models::{Order, OrderItem, OrderStatus, Product};
use satify_shop::services::vnpay::SECURE_HASH_KEY;
use satify_shop::services::VnpayConfig;
use satify_shop::state::AppState;
use satify_shop::store::memory::MemoryStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

pub const HASH_SECRET: &str = "TESTSECRET0123456789";
pub const FRONTEND_ORIGIN: &str = "http://shop.test";

pub fn test_config() -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 5000,
    database_url: "postgres://unused".to_string(),
    frontend_origin: FRONTEND_ORIGIN.to_string(),
    run_migrations: false,
    json_logs: false,
    vnpay: VnpayConfig {
      tmn_code: "SATIFYTEST".to_string(),
      hash_secret: HASH_SECRET.to_string(),
      pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
      return_url: "http://127.0.0.1:5000/api/payments/vnpay/return".to_string(),
      frontend_origin: FRONTEND_ORIGIN.to_string(),
      tz_offset_secs: 7 * 3600,
    },
  }
}

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
}

pub fn test_app() -> TestApp {
  setup_tracing();
  let store = Arc::new(MemoryStore::new());
  let state = AppState::new(test_config(), store.clone(), store.clone()).expect("test state");
  TestApp { state, store }
}

pub fn add_product(store: &MemoryStore, name: &str, price: i64, stock: i32) -> Uuid {
  let id = Uuid::new_v4();
  store.insert_product(Product {
    id,
    name: name.to_string(),
    price,
    stock,
  });
  id
}

/// Stores an order directly, in the given status.
pub fn seed_order(store: &MemoryStore, user_id: Uuid, total: i64, status: OrderStatus) -> Order {
  let mut order = Order::new(
    user_id,
    vec![OrderItem {
      product_id: Uuid::new_v4(),
      name: "Seeded item".to_string(),
      qty: 1,
      price: total,
    }],
    total,
    None,
  );
  order.status = status;
  store.put_order(order.clone());
  order
}

/// A gateway callback for `order_id`, signed with the test secret.
pub fn signed_callback(order_id: &str, amount: i64, response_code: &str) -> Vec<(String, String)> {
  let mut params: BTreeMap<String, String> = BTreeMap::new();
  params.insert("vnp_TxnRef".into(), order_id.to_string());
  params.insert("vnp_Amount".into(), amount.to_string());
  params.insert("vnp_ResponseCode".into(), response_code.to_string());
  params.insert("vnp_TransactionNo".into(), "14012345".to_string());
  params.insert("vnp_TmnCode".into(), "SATIFYTEST".to_string());
  params.insert("vnp_OrderInfo".into(), format!("Thanh toan don hang {}", order_id));
  params.insert("vnp_BankCode".into(), "NCB".to_string());
  sign_params(params)
}

pub fn sign_params(params: BTreeMap<String, String>) -> Vec<(String, String)> {
  let gateway = satify_shop::services::VnpayGateway::new(test_config().vnpay).expect("gateway");
  let hash = gateway.sign(&params);
  let mut pairs: Vec<(String, String)> = params.into_iter().collect();
  pairs.push((SECURE_HASH_KEY.to_string(), hash));
  pairs
}

pub fn to_query(pairs: &[(String, String)]) -> String {
  url::form_urlencoded::Serializer::new(String::new())
    .extend_pairs(pairs.iter())
    .finish()
}
