// app/src/services/vnpay.rs

//! VNPay adapter: signed payment URLs out, signed callbacks in.
//!
//! Signing: parameters sorted by key, serialized as
//! `application/x-www-form-urlencoded` (space as `+`), HMAC-SHA512 over the
//! UTF-8 bytes with the merchant secret, lowercase hex.

use crate::errors::AppError;
use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha512;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

type HmacSha512 = Hmac<Sha512>;

pub const VNP_VERSION: &str = "2.1.0";
pub const SECURE_HASH_KEY: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE_KEY: &str = "vnp_SecureHashType";
/// `vnp_ResponseCode` for a successful payment.
pub const RESPONSE_CODE_SUCCESS: &str = "00";

#[derive(Clone)]
pub struct VnpayConfig {
  pub tmn_code: String,
  pub hash_secret: String,
  pub pay_url: String,
  pub return_url: String,
  pub frontend_origin: String,
  /// Offset of the gateway's wall clock from UTC, for `vnp_CreateDate`.
  pub tz_offset_secs: i32,
}

// Keeps the secret out of logs.
impl std::fmt::Debug for VnpayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VnpayConfig")
      .field("tmn_code", &self.tmn_code)
      .field("hash_secret", &"[REDACTED]")
      .field("pay_url", &self.pay_url)
      .field("return_url", &self.return_url)
      .field("frontend_origin", &self.frontend_origin)
      .field("tz_offset_secs", &self.tz_offset_secs)
      .finish()
  }
}

/// Callback verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
  #[error("Missing vnp_SecureHash")]
  MissingSignature,

  #[error("Invalid signature")]
  SignatureMismatch,
}

impl From<PaymentError> for AppError {
  fn from(_: PaymentError) -> Self {
    AppError::SignatureMismatch
  }
}

#[derive(Debug, Clone)]
pub struct PaymentInit {
  pub order_ref: String,
  /// VND, whole currency units.
  pub amount: i64,
  pub client_ip: String,
  pub created_at: DateTime<Utc>,
}

/// The fields of an authenticated callback the workflows act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCallback {
  pub txn_ref: String,
  /// `vnp_Amount` as reported, i.e. VND * 100. `None` if absent or not a number.
  pub amount: Option<i64>,
  pub response_code: String,
  pub transaction_no: Option<String>,
}

impl VerifiedCallback {
  pub fn is_success(&self) -> bool {
    self.response_code == RESPONSE_CODE_SUCCESS
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnCode {
  Success,
  OrderNotFound,
  AlreadyConfirmed,
  InvalidAmount,
  InvalidSignature,
  UnknownError,
}

impl IpnCode {
  pub fn code(self) -> &'static str {
    match self {
      IpnCode::Success => "00",
      IpnCode::OrderNotFound => "01",
      IpnCode::AlreadyConfirmed => "02",
      IpnCode::InvalidAmount => "04",
      IpnCode::InvalidSignature => "97",
      IpnCode::UnknownError => "99",
    }
  }
}

/// Body the gateway expects from the IPN endpoint, always with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpnResponse {
  #[serde(rename = "RspCode")]
  pub rsp_code: String,
  #[serde(rename = "Message")]
  pub message: String,
}

impl IpnResponse {
  pub fn new(code: IpnCode, message: impl Into<String>) -> Self {
    Self {
      rsp_code: code.code().to_string(),
      message: message.into(),
    }
  }

  pub fn confirm_success() -> Self {
    Self::new(IpnCode::Success, "Confirm Success")
  }

  pub fn confirm_received() -> Self {
    Self::new(IpnCode::Success, "Confirm received")
  }

  pub fn order_not_found() -> Self {
    Self::new(IpnCode::OrderNotFound, "Order not found")
  }

  pub fn already_confirmed() -> Self {
    Self::new(IpnCode::AlreadyConfirmed, "Order already confirmed")
  }

  pub fn already_finalized() -> Self {
    Self::new(IpnCode::AlreadyConfirmed, "Order already finalized")
  }

  pub fn invalid_amount() -> Self {
    Self::new(IpnCode::InvalidAmount, "Invalid amount")
  }

  pub fn invalid_signature() -> Self {
    Self::new(IpnCode::InvalidSignature, "Invalid signature")
  }

  pub fn unknown_error() -> Self {
    Self::new(IpnCode::UnknownError, "Unknown error")
  }

  /// Answer for a callback the shop refuses to act on. A cancelled or
  /// otherwise unpayable order reads as finalized.
  pub fn for_rejection(err: &AppError) -> Self {
    match err {
      AppError::SignatureMismatch => Self::invalid_signature(),
      AppError::NotFound(_) => Self::order_not_found(),
      AppError::AmountMismatch { .. } => Self::invalid_amount(),
      AppError::AlreadySettled(_) => Self::already_confirmed(),
      AppError::InvalidTransition { .. } => Self::already_finalized(),
      _ => Self::unknown_error(),
    }
  }
}

/// Converts VND to the gateway's amount unit (VND * 100).
pub fn to_gateway_amount(amount: i64) -> Option<i64> {
  amount.checked_mul(100)
}

pub fn format_create_date(at: DateTime<Utc>, offset: FixedOffset) -> String {
  at.with_timezone(&offset).format("%Y%m%d%H%M%S").to_string()
}

#[derive(Clone)]
pub struct VnpayGateway {
  config: VnpayConfig,
  /// Keyed with the merchant secret; cloned per signature.
  mac: HmacSha512,
  pay_url: Url,
  frontend_origin: Url,
  offset: FixedOffset,
}

impl VnpayGateway {
  pub fn new(config: VnpayConfig) -> Result<Self, AppError> {
    let pay_url =
      Url::parse(&config.pay_url).map_err(|e| AppError::Config(format!("Invalid VNPay pay URL: {}", e)))?;
    let frontend_origin = Url::parse(&config.frontend_origin)
      .map_err(|e| AppError::Config(format!("Invalid frontend origin: {}", e)))?;
    if frontend_origin.cannot_be_a_base() {
      return Err(AppError::Config("Frontend origin must be an absolute http(s) URL".to_string()));
    }
    let offset = FixedOffset::east_opt(config.tz_offset_secs)
      .ok_or_else(|| AppError::Config(format!("Invalid VNPay time zone offset: {}", config.tz_offset_secs)))?;
    if config.hash_secret.is_empty() {
      return Err(AppError::Config("VNPay hash secret is empty".to_string()));
    }
    let mac = HmacSha512::new_from_slice(config.hash_secret.as_bytes())
      .map_err(|e| AppError::Config(format!("Invalid VNPay hash secret: {}", e)))?;

    Ok(Self {
      config,
      mac,
      pay_url,
      frontend_origin,
      offset,
    })
  }

  /// Canonical string that gets signed.
  pub fn sign_data(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(params.iter())
      .finish()
  }

  /// Lowercase hex HMAC-SHA512 of `sign_data(params)`.
  pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
    let mut mac = self.mac.clone();
    mac.update(Self::sign_data(params).as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  #[instrument(name = "vnpay::build_payment_url", skip(self, init), fields(order_ref = %init.order_ref, amount = init.amount))]
  pub fn build_payment_url(&self, init: &PaymentInit) -> Result<String, AppError> {
    if init.order_ref.trim().is_empty() {
      return Err(AppError::Validation("orderId is required".to_string()));
    }
    if init.amount <= 0 {
      return Err(AppError::Validation("amount must be positive".to_string()));
    }
    let gateway_amount =
      to_gateway_amount(init.amount).ok_or_else(|| AppError::Validation("amount is too large".to_string()))?;

    let mut params: BTreeMap<String, String> = BTreeMap::new();
    params.insert("vnp_Version".into(), VNP_VERSION.into());
    params.insert("vnp_Command".into(), "pay".into());
    params.insert("vnp_TmnCode".into(), self.config.tmn_code.clone());
    params.insert("vnp_Amount".into(), gateway_amount.to_string());
    params.insert("vnp_CurrCode".into(), "VND".into());
    params.insert("vnp_TxnRef".into(), init.order_ref.clone());
    params.insert("vnp_OrderInfo".into(), format!("Thanh toan don hang {}", init.order_ref));
    params.insert("vnp_OrderType".into(), "other".into());
    params.insert("vnp_Locale".into(), "vn".into());
    params.insert("vnp_ReturnUrl".into(), self.config.return_url.clone());
    params.insert("vnp_IpAddr".into(), init.client_ip.clone());
    params.insert("vnp_CreateDate".into(), format_create_date(init.created_at, self.offset));

    let secure_hash = self.sign(&params);
    let mut url = self.pay_url.clone();
    url.set_query(Some(&format!("{}&{}={}", Self::sign_data(&params), SECURE_HASH_KEY, secure_hash)));
    debug!("VNPay payment URL built.");
    Ok(url.to_string())
  }

  /// Checks the signature of a return or IPN callback.
  ///
  /// Every received parameter except the hash fields takes part in the
  /// signature; the comparison is constant time.
  pub fn verify<I, K, V>(&self, params: I) -> Result<VerifiedCallback, PaymentError>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut signed: BTreeMap<String, String> = params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    let received = signed.remove(SECURE_HASH_KEY).ok_or(PaymentError::MissingSignature)?;
    signed.remove(SECURE_HASH_TYPE_KEY);

    let received = hex::decode(received.trim()).map_err(|_| PaymentError::SignatureMismatch)?;
    let mut mac = self.mac.clone();
    mac.update(Self::sign_data(&signed).as_bytes());
    mac.verify_slice(&received).map_err(|_| PaymentError::SignatureMismatch)?;

    Ok(VerifiedCallback {
      txn_ref: signed.get("vnp_TxnRef").cloned().unwrap_or_default(),
      amount: signed.get("vnp_Amount").and_then(|v| v.parse::<i64>().ok()),
      response_code: signed.get("vnp_ResponseCode").cloned().unwrap_or_default(),
      transaction_no: signed.get("vnp_TransactionNo").filter(|v| !v.is_empty()).cloned(),
    })
  }

  /// Frontend URL the buyer's browser is sent to after the gateway's return
  /// redirect: `{origin}/orders/{txn_ref}?vnp_status=..&ok=1|0`.
  pub fn return_redirect(&self, txn_ref: Option<&str>, response_code: &str, ok: bool) -> String {
    let mut url = self.frontend_origin.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push("orders");
      if let Some(txn_ref) = txn_ref.filter(|r| !r.is_empty()) {
        segments.push(txn_ref);
      }
    }
    url
      .query_pairs_mut()
      .append_pair("vnp_status", response_code)
      .append_pair("ok", if ok { "1" } else { "0" });
    url.to_string()
  }
}
