//! HTTP access to the playground service.
//!
//! A single pooled [`HttpTransport`] is shared by discovery, token minting and
//! generation calls. Every request carries the same browser-like header set;
//! generation calls add the per-request token and origin headers.

pub mod http;

pub use http::{browser_user_agent, HttpTransport, TransportConfig, TransportError};
