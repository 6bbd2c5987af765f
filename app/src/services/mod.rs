// app/src/services/mod.rs

//! Business logic used by the pipelines and handlers.

pub mod checkout;
pub mod export;
pub mod status_machine;
pub mod vnpay;

pub use status_machine::{OrderStatusMachine, TrackingInfo, TransitionRequest, TransitionSource};
pub use vnpay::{IpnResponse, PaymentError, VerifiedCallback, VnpayConfig, VnpayGateway};
