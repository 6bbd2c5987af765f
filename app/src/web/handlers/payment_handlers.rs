// app/src/web/handlers/payment_handlers.rs

use actix_web::http::header::{CONTENT_TYPE, LOCATION};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::pipelines::contexts::PaymentIpnCtxData;
use crate::services::vnpay::PaymentInit;
use crate::services::IpnResponse;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use satify_flow::{ContextData, PipelineResult};

const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentQuery {
  pub order_id: Option<String>,
}

/// First hop of `X-Forwarded-For`, else the peer address.
pub fn client_ip(req: &HttpRequest) -> String {
  req
    .headers()
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
    .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
    .unwrap_or_else(|| FALLBACK_CLIENT_IP.to_string())
}

fn query_pairs(req: &HttpRequest) -> Vec<(String, String)> {
  url::form_urlencoded::parse(req.query_string().as_bytes())
    .into_owned()
    .collect()
}

/// Callback parameters from a POST body: JSON objects have their scalar
/// values stringified, anything else is read as a form.
fn body_pairs(content_type: &str, body: &[u8]) -> Result<Vec<(String, String)>, AppError> {
  if body.is_empty() {
    return Ok(Vec::new());
  }
  if !content_type.starts_with("application/json") {
    return Ok(url::form_urlencoded::parse(body).into_owned().collect());
  }

  let value: serde_json::Value =
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Malformed JSON body: {}", e)))?;
  let object = value
    .as_object()
    .ok_or_else(|| AppError::Validation("JSON body must be an object".to_string()))?;
  Ok(
    object
      .iter()
      .filter_map(|(k, v)| {
        let v = match v {
          serde_json::Value::String(s) => s.clone(),
          serde_json::Value::Number(n) => n.to_string(),
          serde_json::Value::Bool(b) => b.to_string(),
          _ => return None,
        };
        Some((k.clone(), v))
      })
      .collect(),
  )
}

#[instrument(name = "handler::create_vnpay_payment", skip(app_state, auth_user, query, req), fields(user_id = %auth_user.user_id))]
pub async fn create_payment_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<CreatePaymentQuery>,
  req: HttpRequest,
) -> Result<HttpResponse, AppError> {
  let raw_id = query
    .order_id
    .as_deref()
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or_else(|| AppError::Validation("orderId is required".to_string()))?;
  let order_id = Uuid::parse_str(raw_id).map_err(|_| AppError::NotFound("Order not found".to_string()))?;

  let order = app_state
    .orders
    .find_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
  auth_user.require_owner_or_admin(order.user_id)?;
  if order.status != OrderStatus::Created {
    return Err(AppError::Conflict(format!("Order is already {}", order.status)));
  }

  let pay_url = app_state.gateway.build_payment_url(&PaymentInit {
    order_ref: order.id.to_string(),
    amount: order.total,
    client_ip: client_ip(&req),
    created_at: Utc::now(),
  })?;
  info!(%order_id, amount = order.total, "VNPay payment URL issued.");
  Ok(HttpResponse::Ok().json(json!({ "payUrl": pay_url })))
}

/// Browser return from the gateway. Read-only: settlement happens on the IPN.
#[instrument(name = "handler::vnpay_return", skip(app_state, req))]
pub async fn vnpay_return_handler(app_state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
  let params = query_pairs(&req);
  let raw = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
  let txn_ref = raw("vnp_TxnRef");
  let response_code = raw("vnp_ResponseCode").unwrap_or_default();

  let ok = match app_state.gateway.verify(params.iter().cloned()) {
    Ok(callback) => callback.is_success(),
    Err(e) => {
      warn!(error = %e, txn_ref = ?txn_ref, "VNPay return failed signature verification.");
      false
    }
  };
  info!(txn_ref = ?txn_ref, %response_code, ok, "VNPay return received.");

  let location = app_state.gateway.return_redirect(txn_ref.as_deref(), &response_code, ok);
  HttpResponse::Found().insert_header((LOCATION, location)).finish()
}

/// Server-to-server notification. Always answers 200 with `{RspCode, Message}`.
#[instrument(name = "handler::vnpay_ipn", skip(app_state, req, body))]
pub async fn vnpay_ipn_handler(app_state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
  let mut params = query_pairs(&req);
  let content_type = req
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_ascii_lowercase();
  match body_pairs(&content_type, &body) {
    Ok(pairs) => params.extend(pairs),
    Err(e) => {
      warn!(error = %e, "Unreadable IPN body.");
      return HttpResponse::Ok().json(IpnResponse::unknown_error());
    }
  }

  let ctx_data = ContextData::new(PaymentIpnCtxData::new(app_state.get_ref().clone(), params));
  let response = match app_state.flows.run(ctx_data.clone()).await {
    Ok(PipelineResult::Completed) | Ok(PipelineResult::Stopped) => ctx_data.read().response.clone().unwrap_or_else(|| {
      error!("IPN pipeline finished without deciding a response.");
      IpnResponse::unknown_error()
    }),
    Err(e) => {
      error!(error = %e, "IPN processing failed.");
      IpnResponse::unknown_error()
    }
  };

  info!(rsp_code = %response.rsp_code, message = %response.message, "IPN answered.");
  HttpResponse::Ok().json(response)
}
