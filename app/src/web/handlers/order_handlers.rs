// app/src/web/handlers/order_handlers.rs

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::export::{export_filename, render_orders_csv, EXPORT_ROW_CAP};
use crate::services::{OrderStatusMachine, TrackingInfo, TransitionRequest};
use crate::state::AppState;
use crate::store::{OrderFilter, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::web::extractors::{AdminUser, AuthenticatedUser};

/// Query string of the admin list and export. Everything arrives as text so
/// that a bad value is ignored instead of failing the whole request.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
  pub page: Option<String>,
  pub limit: Option<String>,
  pub status: Option<String>,
  pub from: Option<String>,
  pub to: Option<String>,
  pub q: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(field: &str, value: &Option<String>) -> Option<NaiveDate> {
  let raw = non_empty(value)?;
  match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
    Ok(date) => Some(date),
    Err(_) => {
      warn!(field, value = raw, "Ignoring unparseable date filter.");
      None
    }
  }
}

impl OrderListQuery {
  /// `status` must be one of the enumerated states; page and limit are
  /// clamped to `[1, ..]` and `[1, MAX_PAGE_LIMIT]`.
  pub fn into_filter(self) -> Result<OrderFilter, AppError> {
    let status = non_empty(&self.status).map(OrderStatusMachine::parse_target).transpose()?;
    let page = non_empty(&self.page).and_then(|p| p.parse::<i64>().ok()).unwrap_or(1).max(1);
    let limit = non_empty(&self.limit)
      .and_then(|l| l.parse::<i64>().ok())
      .unwrap_or(DEFAULT_PAGE_LIMIT)
      .clamp(1, MAX_PAGE_LIMIT);

    Ok(OrderFilter {
      status,
      from: parse_date("from", &self.from),
      to: parse_date("to", &self.to),
      q: non_empty(&self.q).map(str::to_string),
      page,
      limit,
    })
  }
}

#[instrument(name = "handler::list_my_orders", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_my_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.orders.list_orders_for_user(auth_user.user_id).await?;
  info!(count = orders.len(), "Listed buyer orders.");
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::list_orders", skip(app_state, admin, query), fields(actor = %admin.0.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
  let filter = query.into_inner().into_filter()?;
  let page = app_state.orders.query_orders(&filter).await?;
  info!(total = page.total, returned = page.data.len(), "Admin order list served.");

  let by_status: serde_json::Map<String, serde_json::Value> = page
    .by_status
    .iter()
    .map(|(status, count)| (status.to_string(), json!(count)))
    .collect();

  Ok(HttpResponse::Ok().json(json!({
    "data": page.data,
    "meta": {
      "page": filter.page,
      "limit": filter.limit,
      "total": page.total,
      "sum": page.sum,
      "byStatus": by_status,
    }
  })))
}

#[instrument(name = "handler::export_orders", skip(app_state, admin, query), fields(actor = %admin.0.user_id))]
pub async fn export_orders_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
  let filter = query.into_inner().into_filter()?;
  let orders = app_state.orders.export_orders(&filter, EXPORT_ROW_CAP).await?;
  let csv = render_orders_csv(&orders);
  let filename = export_filename(Utc::now());
  info!(rows = orders.len(), %filename, "Order export rendered.");

  Ok(
    HttpResponse::Ok()
      .content_type("text/csv; charset=utf-8")
      .insert_header(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
      })
      .body(csv),
  )
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user, path), fields(user_id = %auth_user.user_id, order_id = %path.as_str()))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order_id =
    Uuid::parse_str(path.trim()).map_err(|_| AppError::NotFound("Order not found".to_string()))?;
  let order = app_state
    .orders
    .find_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
  auth_user.require_owner_or_admin(order.user_id)?;
  Ok(HttpResponse::Ok().json(order))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusPayload {
  pub status: Option<String>,
  #[serde(default)]
  pub tracking_number: Option<String>,
  #[serde(default)]
  pub carrier: Option<String>,
  #[serde(default, alias = "estimatedDeliveryDate")]
  pub estimate_delivery_date: Option<NaiveDate>,
  #[serde(default)]
  pub force: bool,
}

#[instrument(
    name = "handler::update_order_status",
    skip(app_state, admin, path, payload),
    fields(actor = %admin.0.user_id, order_id = %path.as_str())
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  path: web::Path<String>,
  payload: web::Json<UpdateStatusPayload>,
) -> Result<HttpResponse, AppError> {
  let order_id =
    Uuid::parse_str(path.trim()).map_err(|_| AppError::NotFound("Order not found".to_string()))?;
  let payload = payload.into_inner();
  let raw_status = payload
    .status
    .as_deref()
    .ok_or_else(|| AppError::Validation("Invalid status".to_string()))?;
  let target = OrderStatusMachine::parse_target(raw_status)?;

  let tracking = TrackingInfo {
    tracking_number: payload.tracking_number,
    carrier: payload.carrier,
    estimated_delivery_date: payload.estimate_delivery_date,
  };
  let request = TransitionRequest::admin(admin.0.user_id, target, tracking, payload.force);
  let order = app_state.status_machine.transition(order_id, request).await?;
  Ok(HttpResponse::Ok().json(order))
}
