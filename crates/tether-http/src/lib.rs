//! Stateless fallback transport.
//!
//! Each operation is a JSON `POST {base_url}/{operation}`; the response body
//! is returned as-is.

pub mod client;
pub mod error;

pub use client::StatelessClient;
pub use error::{HttpError, HttpResult};
