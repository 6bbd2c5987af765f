// app/src/services/status_machine.rs

//! Legal order states and the single write path for status changes.
//!
//! Admin updates and payment settlement both go through
//! `OrderStatusMachine::transition`, which evaluates the transition table
//! against the stored status and writes with compare-and-set.

use crate::errors::{AppError, Result};
use crate::models::{Order, OrderStatus};
use crate::store::{OrderStore, StatusUpdate};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts before a persistently racing update gives up with `Conflict`.
pub const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingInfo {
  pub tracking_number: Option<String>,
  pub carrier: Option<String>,
  pub estimated_delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionSource {
  /// `force` skips the table for any enumerated target.
  Admin { actor: Uuid, force: bool },
  /// Confirmed payment. Target is always `paid`.
  Settlement { payment_ref: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
  pub target: OrderStatus,
  pub tracking: TrackingInfo,
  pub source: TransitionSource,
}

impl TransitionRequest {
  pub fn admin(actor: Uuid, target: OrderStatus, tracking: TrackingInfo, force: bool) -> Self {
    Self {
      target,
      tracking,
      source: TransitionSource::Admin { actor, force },
    }
  }

  pub fn settlement(payment_ref: Option<String>) -> Self {
    Self {
      target: OrderStatus::Paid,
      tracking: TrackingInfo::default(),
      source: TransitionSource::Settlement { payment_ref },
    }
  }
}

#[derive(Clone)]
pub struct OrderStatusMachine {
  orders: Arc<dyn OrderStore>,
}

impl OrderStatusMachine {
  pub fn new(orders: Arc<dyn OrderStore>) -> Self {
    Self { orders }
  }

  /// The transition table. Same-state requests are not transitions and are
  /// handled separately.
  pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (from, to),
      (Created, Paid) | (Created, Cancelled) | (Paid, Shipped) | (Paid, Cancelled) | (Shipped, Completed) | (Shipped, Cancelled)
    )
  }

  /// Parses a client-supplied status; anything outside the enumeration is a
  /// validation error.
  pub fn parse_target(raw: &str) -> Result<OrderStatus> {
    raw.parse()
  }

  #[instrument(name = "status_machine::transition", skip(self, request), fields(to = %request.target), err(Display))]
  pub async fn transition(&self, order_id: Uuid, request: TransitionRequest) -> Result<Order> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
      let current = self
        .orders
        .find_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

      let update = self.plan(&current, &request)?;
      if let Some(updated) = self
        .orders
        .compare_and_set_status(order_id, current.status, &update)
        .await?
      {
        info!(%order_id, from = %current.status, to = %updated.status, attempt, "Order status updated.");
        return Ok(updated);
      }
      warn!(%order_id, expected = %current.status, attempt, "Order status changed concurrently, re-evaluating.");
    }

    Err(AppError::Conflict(
      "Order was modified concurrently, please retry".to_string(),
    ))
  }

  /// Decides what to write for `request` given the stored order.
  fn plan(&self, current: &Order, request: &TransitionRequest) -> Result<StatusUpdate> {
    let from = current.status;
    let to = request.target;

    let payment_ref = match &request.source {
      TransitionSource::Settlement { payment_ref } => {
        if to != OrderStatus::Paid {
          return Err(AppError::Internal(format!("Settlement cannot target status {}", to)));
        }
        if from.is_settled() {
          return Err(AppError::AlreadySettled(current.id));
        }
        if !Self::is_allowed(from, to) {
          return Err(AppError::InvalidTransition { from, to });
        }
        payment_ref.clone()
      }
      TransitionSource::Admin { actor, force } => {
        let same_state = from == to;
        let disallowed = if same_state { from.is_terminal() } else { !Self::is_allowed(from, to) };
        if disallowed {
          if !*force {
            return Err(AppError::InvalidTransition { from, to });
          }
          warn!(order_id = %current.id, actor = %actor, %from, %to, "Forced order status change outside the transition table.");
        }
        None
      }
    };

    let mut update = StatusUpdate {
      status: to,
      tracking_number: request.tracking.tracking_number.clone(),
      carrier: request.tracking.carrier.clone(),
      estimated_delivery_date: request.tracking.estimated_delivery_date,
      payment_ref,
      ..Default::default()
    };

    // Timestamps mark entering a state; a metadata-only update keeps them.
    if from != to {
      let now = Utc::now();
      match to {
        OrderStatus::Paid => update.paid_at = Some(now),
        OrderStatus::Shipped => update.shipped_at = Some(now),
        OrderStatus::Completed => update.delivered_at = Some(now),
        OrderStatus::Created | OrderStatus::Cancelled => {}
      }
    }
    Ok(update)
  }
}
