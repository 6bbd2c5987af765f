// app/src/lib.rs

//! satify-shop: checkout, order lifecycle and VNPay settlement for the
//! Satify pet-goods storefront.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;
