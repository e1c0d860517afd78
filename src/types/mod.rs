//! Core data types shared by the client and the compatibility server.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`MessageRole`] | Message role (system, user, assistant) |

pub mod message;

pub use message::{Message, MessageRole};
