// app/src/config.rs

use crate::errors::{AppError, Result};
use crate::services::vnpay::VnpayConfig;
use dotenvy::dotenv;
use std::env;

pub const DEFAULT_VNP_PAY_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";
/// Vietnam time, GMT+7.
pub const DEFAULT_VNP_TZ_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub frontend_origin: String,
  pub run_migrations: bool,
  pub json_logs: bool,
  pub vnpay: VnpayConfig,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds the configuration from any key lookup. `from_env` uses the
  /// process environment; tests pass a map.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get_env = |var_name: &str| {
      lookup(var_name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", var_name)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "5000".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let frontend_origin = get_env("FRONTEND_ORIGIN")
      .unwrap_or_else(|_| DEFAULT_FRONTEND_ORIGIN.to_string())
      .trim_end_matches('/')
      .to_string();

    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;
    let json_logs = get_env("LOG_FORMAT")
      .map(|v| v.eq_ignore_ascii_case("json"))
      .unwrap_or(false);

    let tmn_code = get_env("VNP_TMN_CODE")?;
    let hash_secret = get_env("VNP_HASH_SECRET")?;
    let pay_url = get_env("VNP_PAY_URL").unwrap_or_else(|_| DEFAULT_VNP_PAY_URL.to_string());
    url::Url::parse(&pay_url).map_err(|e| AppError::Config(format!("Invalid VNP_PAY_URL: {}", e)))?;
    let return_url = get_env("VNP_RETURN_URL")
      .unwrap_or_else(|_| format!("http://{}:{}/api/payments/vnpay/return", server_host, server_port));
    let tz_offset_secs = get_env("VNP_TZ_OFFSET_SECS")
      .unwrap_or_else(|_| DEFAULT_VNP_TZ_OFFSET_SECS.to_string())
      .parse::<i32>()
      .map_err(|e| AppError::Config(format!("Invalid VNP_TZ_OFFSET_SECS: {}", e)))?;
    if chrono::FixedOffset::east_opt(tz_offset_secs).is_none() {
      return Err(AppError::Config(format!(
        "VNP_TZ_OFFSET_SECS out of range: {}",
        tz_offset_secs
      )));
    }

    Ok(Self {
      vnpay: VnpayConfig {
        tmn_code,
        hash_secret,
        pay_url,
        return_url,
        frontend_origin: frontend_origin.clone(),
        tz_offset_secs,
      },
      server_host,
      server_port,
      database_url,
      frontend_origin,
      run_migrations,
      json_logs,
    })
  }

  /// Logs the non-secret settings. Called once tracing is up, since
  /// `json_logs` decides how the subscriber is built.
  pub fn log_summary(&self) {
    tracing::info!(
      server_host = %self.server_host,
      server_port = self.server_port,
      frontend_origin = %self.frontend_origin,
      run_migrations = self.run_migrations,
      json_logs = self.json_logs,
      vnp_tmn_code = %self.vnpay.tmn_code,
      "Application configuration loaded successfully."
    );
  }

  pub fn bind_address(&self) -> String {
    format!("{}:{}", self.server_host, self.server_port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn defaults_apply_when_only_required_values_are_set() {
    let cfg = AppConfig::from_lookup(lookup_from(&[
      ("DATABASE_URL", "postgres://localhost/satify"),
      ("VNP_TMN_CODE", "TMN01"),
      ("VNP_HASH_SECRET", "secret"),
    ]))
    .unwrap();

    assert_eq!(cfg.bind_address(), "127.0.0.1:5000");
    assert_eq!(cfg.frontend_origin, DEFAULT_FRONTEND_ORIGIN);
    assert!(!cfg.run_migrations);
    assert_eq!(cfg.vnpay.pay_url, DEFAULT_VNP_PAY_URL);
    assert_eq!(cfg.vnpay.tz_offset_secs, 25200);
    assert_eq!(cfg.vnpay.return_url, "http://127.0.0.1:5000/api/payments/vnpay/return");
  }

  #[test]
  fn log_format_json_switches_to_json_logs() {
    let base = [
      ("DATABASE_URL", "postgres://localhost/satify"),
      ("VNP_TMN_CODE", "TMN01"),
      ("VNP_HASH_SECRET", "secret"),
    ];
    assert!(!AppConfig::from_lookup(lookup_from(&base)).unwrap().json_logs);

    let mut with_json = base.to_vec();
    with_json.push(("LOG_FORMAT", "JSON"));
    assert!(AppConfig::from_lookup(lookup_from(&with_json)).unwrap().json_logs);
  }

  #[test]
  fn missing_hash_secret_is_a_config_error() {
    let err = AppConfig::from_lookup(lookup_from(&[
      ("DATABASE_URL", "postgres://localhost/satify"),
      ("VNP_TMN_CODE", "TMN01"),
    ]))
    .unwrap_err();
    assert!(matches!(err, AppError::Config(m) if m.contains("VNP_HASH_SECRET")));
  }

  #[test]
  fn invalid_port_is_rejected() {
    let err = AppConfig::from_lookup(lookup_from(&[
      ("DATABASE_URL", "postgres://localhost/satify"),
      ("VNP_TMN_CODE", "TMN01"),
      ("VNP_HASH_SECRET", "secret"),
      ("SERVER_PORT", "not-a-port"),
    ]))
    .unwrap_err();
    assert!(matches!(err, AppError::Config(m) if m.contains("SERVER_PORT")));
  }

  #[test]
  fn trailing_slash_is_trimmed_from_frontend_origin() {
    let cfg = AppConfig::from_lookup(lookup_from(&[
      ("DATABASE_URL", "postgres://localhost/satify"),
      ("VNP_TMN_CODE", "TMN01"),
      ("VNP_HASH_SECRET", "secret"),
      ("FRONTEND_ORIGIN", "https://shop.example.vn/"),
    ]))
    .unwrap();
    assert_eq!(cfg.vnpay.frontend_origin, "https://shop.example.vn");
  }
}
