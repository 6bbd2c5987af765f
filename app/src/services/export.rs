// app/src/services/export.rs

//! CSV rendering of the admin order export.

use crate::models::Order;
use chrono::{DateTime, SecondsFormat, Utc};

/// Rows beyond this are dropped from an export.
pub const EXPORT_ROW_CAP: i64 = 5000;

const HEADER: [&str; 6] = ["id", "userId", "status", "total", "itemCount", "createdAt"];
const BOM: char = '\u{FEFF}';

/// Every cell quoted, inner quotes doubled.
pub fn escape_cell(value: &str) -> String {
  format!("\"{}\"", value.replace('"', "\"\""))
}

/// BOM-prefixed CSV, one line per order, `\n` separated. The header is
/// unquoted; cells are always quoted.
pub fn render_orders_csv(orders: &[Order]) -> String {
  let mut csv = String::new();
  csv.push(BOM);
  csv.push_str(&HEADER.join(","));
  for order in orders {
    let cells = [
      order.id.to_string(),
      order.user_id.to_string(),
      order.status.to_string(),
      order.total.to_string(),
      order.item_count().to_string(),
      order.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ];
    csv.push('\n');
    csv.push_str(&cells.iter().map(|c| escape_cell(c)).collect::<Vec<_>>().join(","));
  }
  csv
}

pub fn export_filename(at: DateTime<Utc>) -> String {
  format!("orders_{}.csv", at.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{Order, OrderItem};
  use chrono::TimeZone;
  use uuid::Uuid;

  #[test]
  fn quotes_are_doubled() {
    assert_eq!(escape_cell("a\"b"), "\"a\"\"b\"");
    assert_eq!(escape_cell(""), "\"\"");
  }

  #[test]
  fn csv_has_bom_header_and_quoted_rows() {
    let mut order = Order::new(
      Uuid::nil(),
      vec![
        OrderItem { product_id: Uuid::nil(), name: "Bowl".into(), qty: 3, price: 10 },
        OrderItem { product_id: Uuid::nil(), name: "Toy".into(), qty: 1, price: 5 },
      ],
      35,
      None,
    );
    order.created_at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

    let csv = render_orders_csv(&[order.clone()]);
    assert!(csv.starts_with('\u{FEFF}'));
    let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').split('\n').collect();
    assert_eq!(lines[0], "id,userId,status,total,itemCount,createdAt");
    assert_eq!(
      lines[1],
      format!(
        "\"{}\",\"{}\",\"created\",\"35\",\"2\",\"2025-03-01T08:00:00.000Z\"",
        order.id,
        Uuid::nil()
      )
    );
  }

  #[test]
  fn filename_has_no_colons() {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
    assert_eq!(export_filename(at), "orders_2025-03-01T08-00-00-000Z.csv");
  }
}
