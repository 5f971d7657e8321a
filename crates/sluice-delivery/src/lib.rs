//! # Sluice Delivery
//!
//! Streams ingested files to a remote ingestion endpoint over HTTP and keeps retrying
//! the ones that failed.
//!
//! [`DeliveryClient::deliver`] sends one file as a `POST` body with its attributes as
//! request headers. Transient failures (non-2xx responses, transport errors) land in the
//! [`RetryQueue`], which [`DeliveryClient::run_retry_worker`] drains on a fixed period
//! until each file is delivered or has disappeared from disk.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod retry_queue;

pub use client::DeliveryClient;
pub use config::{
    DeliveryConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRY_PERIOD,
};
pub use error::{DeliveryError, Result};
pub use retry_queue::{FailedDelivery, RetryQueue};
