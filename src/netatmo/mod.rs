//! Netatmo energy API integration
//!
//! - `types`: request/response payloads
//! - `client`: `VendorApi` seam and its reqwest implementation

pub mod client;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use client::{ClientCredentials, NetatmoClient, VendorApi};
