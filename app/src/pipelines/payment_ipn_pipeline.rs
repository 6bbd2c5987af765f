// app/src/pipelines/payment_ipn_pipeline.rs

//! VNPay IPN reconciliation.
//!
//! Every outcome the gateway should hear about (bad signature, unknown order,
//! wrong amount, duplicate delivery) is a soft stop: the step records the
//! `IpnResponse` and halts the pipeline. Only unexpected failures are errors,
//! and the handler turns those into code `99`.

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::pipelines::contexts::PaymentIpnCtxData;
use crate::services::vnpay::to_gateway_amount;
use crate::services::{IpnResponse, TransitionRequest};
use satify_flow::{ContextData, Flows, Pipeline, PipelineControl};
use tracing::{info, warn};
use uuid::Uuid;

pub fn build_payment_ipn_pipeline() -> Pipeline<PaymentIpnCtxData, AppError> {
  let mut p = Pipeline::<PaymentIpnCtxData, AppError>::new(&[
    ("verify_ipn_signature", false, None),
    ("check_gateway_response_code", false, None),
    ("load_order", false, None),
    ("reconcile_amount", false, None),
    ("check_settlement_idempotency", false, None),
    ("settle_order", false, None),
  ]);

  p.on_root("verify_ipn_signature", verify_ipn_signature);
  p.on_root("check_gateway_response_code", check_gateway_response_code);
  p.on_root("load_order", load_order);
  p.on_root("reconcile_amount", reconcile_amount);
  p.on_root("check_settlement_idempotency", check_settlement_idempotency);
  p.on_root("settle_order", settle_order);
  p
}

pub fn register_payment_ipn_pipeline(flows: &Flows<AppError>) {
  flows.register_pipeline(build_payment_ipn_pipeline());
  info!("Payment IPN pipeline registered.");
}

fn stop_with(ctx_data: &ContextData<PaymentIpnCtxData>, response: IpnResponse) -> Result<PipelineControl, AppError> {
  ctx_data.write().response = Some(response);
  Ok(PipelineControl::Stop)
}

/// Stops on a refused callback, answering with the code for `reason`.
fn reject(ctx_data: &ContextData<PaymentIpnCtxData>, reason: AppError) -> Result<PipelineControl, AppError> {
  stop_with(ctx_data, IpnResponse::for_rejection(&reason))
}

fn missing(what: &str) -> AppError {
  AppError::Internal(format!("IPN pipeline reached a step without {}", what))
}

// Step 1: nothing below runs on an unauthenticated callback.
async fn verify_ipn_signature(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let (gateway, params) = {
    let guard = ctx_data.read();
    (guard.app_state.gateway.clone(), guard.params.clone())
  };
  match gateway.verify(params) {
    Ok(callback) => {
      info!(txn_ref = %callback.txn_ref, response_code = %callback.response_code, "IPN signature verified.");
      ctx_data.write().callback = Some(callback);
      Ok(PipelineControl::Continue)
    }
    Err(e) => {
      warn!(error = %e, "IPN rejected: signature verification failed.");
      reject(&ctx_data, e.into())
    }
  }
}

// Step 2: failed or cancelled payments are acknowledged and ignored.
async fn check_gateway_response_code(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let callback = ctx_data.read().callback.clone().ok_or_else(|| missing("a verified callback"))?;
  if callback.is_success() {
    return Ok(PipelineControl::Continue);
  }
  info!(
    txn_ref = %callback.txn_ref,
    response_code = %callback.response_code,
    "IPN reports an unsuccessful payment; acknowledging without changes."
  );
  stop_with(&ctx_data, IpnResponse::confirm_received())
}

// Step 3
async fn load_order(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let (orders, txn_ref) = {
    let guard = ctx_data.read();
    let callback = guard.callback.as_ref().ok_or_else(|| missing("a verified callback"))?;
    (guard.app_state.orders.clone(), callback.txn_ref.clone())
  };

  let order_id = match Uuid::parse_str(&txn_ref) {
    Ok(id) => id,
    Err(_) => {
      warn!(%txn_ref, "IPN references a malformed order id.");
      return reject(&ctx_data, AppError::NotFound("Order not found".to_string()));
    }
  };

  match orders.find_order(order_id).await? {
    Some(order) => {
      ctx_data.write().order = Some(order);
      Ok(PipelineControl::Continue)
    }
    None => {
      warn!(%order_id, "IPN references an unknown order.");
      reject(&ctx_data, AppError::NotFound("Order not found".to_string()))
    }
  }
}

// Step 4: vnp_Amount is VND * 100.
async fn reconcile_amount(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let (order_id, expected, reported) = {
    let guard = ctx_data.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("an order"))?;
    let callback = guard.callback.as_ref().ok_or_else(|| missing("a verified callback"))?;
    (order.id, to_gateway_amount(order.total), callback.amount)
  };

  match (expected, reported) {
    (Some(expected), Some(reported)) if expected == reported => Ok(PipelineControl::Continue),
    _ => {
      let mismatch = AppError::AmountMismatch { expected, reported };
      warn!(%order_id, error = %mismatch, "IPN amount does not match the order total.");
      reject(&ctx_data, mismatch)
    }
  }
}

// Step 5: duplicates are normal; a paid cancelled order needs a human.
async fn check_settlement_idempotency(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let (order_id, status) = {
    let guard = ctx_data.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("an order"))?;
    (order.id, order.status)
  };

  if status.is_settled() {
    info!(%order_id, %status, "IPN for an already settled order.");
    return reject(&ctx_data, AppError::AlreadySettled(order_id));
  }
  if status == OrderStatus::Cancelled {
    warn!(%order_id, "Payment confirmed for a cancelled order; needs manual refund review.");
    return reject(
      &ctx_data,
      AppError::InvalidTransition {
        from: status,
        to: OrderStatus::Paid,
      },
    );
  }
  Ok(PipelineControl::Continue)
}

// Step 6: the status machine re-checks against the stored status, so a
// concurrent duplicate or cancellation is caught here too.
async fn settle_order(ctx_data: ContextData<PaymentIpnCtxData>) -> Result<PipelineControl, AppError> {
  let (status_machine, order_id, payment_ref) = {
    let guard = ctx_data.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("an order"))?;
    let callback = guard.callback.as_ref().ok_or_else(|| missing("a verified callback"))?;
    (
      guard.app_state.status_machine.clone(),
      order.id,
      callback.transaction_no.clone(),
    )
  };

  match status_machine
    .transition(order_id, TransitionRequest::settlement(payment_ref))
    .await
  {
    Ok(order) => {
      info!(%order_id, payment_ref = ?order.payment_ref, "Order settled from IPN.");
      let mut guard = ctx_data.write();
      guard.order = Some(order);
      guard.response = Some(IpnResponse::confirm_success());
      Ok(PipelineControl::Continue)
    }
    Err(e @ AppError::AlreadySettled(_)) => {
      info!(%order_id, "Order was settled concurrently.");
      reject(&ctx_data, e)
    }
    Err(e @ AppError::InvalidTransition { .. }) => {
      warn!(%order_id, error = %e, "Payment confirmed for an order that can no longer be paid; needs manual review.");
      reject(&ctx_data, e)
    }
    Err(e) => Err(e),
  }
}
