//! Integration tests against a mock playground

pub mod discovery;
pub mod generation;
pub mod mock_server;
#[cfg(feature = "server")]
pub mod server_routes;
pub mod token;
