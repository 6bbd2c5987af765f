// app/src/web/extractors.rs

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  User,
  Admin,
}

/// Caller identity, established by the authentication layer in front of this
/// service and forwarded as headers.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub role: Role,
}

impl AuthenticatedUser {
  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  pub fn require_admin(&self) -> Result<(), AppError> {
    if self.is_admin() {
      Ok(())
    } else {
      warn!(user_id = %self.user_id, "Admin-only route called by a non-admin user.");
      Err(AppError::Forbidden("Forbidden".to_string()))
    }
  }

  /// Buyers see their own orders; admins see all.
  pub fn require_owner_or_admin(&self, owner_id: Uuid) -> Result<(), AppError> {
    if self.is_admin() || self.user_id == owner_id {
      Ok(())
    } else {
      Err(AppError::Forbidden("Forbidden".to_string()))
    }
  }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let user_id = match header(req, USER_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok()) {
      Some(id) => id,
      None => {
        warn!("Missing or invalid {} header.", USER_ID_HEADER);
        return ready(Err(AppError::Auth("Unauthorized".to_string())));
      }
    };

    let role = match header(req, USER_ROLE_HEADER) {
      None | Some("") | Some("user") => Role::User,
      Some("admin") => Role::Admin,
      Some(other) => {
        warn!(%user_id, role = other, "Unknown role header.");
        return ready(Err(AppError::Auth("Unauthorized".to_string())));
      }
    };

    ready(Ok(AuthenticatedUser { user_id, role }))
  }
}

/// Extracts the `AuthenticatedUser` and fails with 403 unless it is an admin.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
    let result = AuthenticatedUser::from_request(req, payload)
      .into_inner()
      .and_then(|user| user.require_admin().map(|_| AdminUser(user)));
    ready(result)
  }
}
