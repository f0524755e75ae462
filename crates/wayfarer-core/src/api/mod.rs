//! HTTP transport for the push-event stream.
//!
//! `StreamClient` opens the long-lived `GET /stream` request for a location
//! and hands the response body to the stream decoder.

pub mod client;
pub mod error;

pub use client::StreamClient;
pub use error::ApiError;
