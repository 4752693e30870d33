//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Signaling channel adapters (in-memory, WebSocket)
//! - Media device backends

pub mod media;
pub mod signaling;
