//! Interface layer - External interfaces
//!
//! This layer handles:
//! - The development signaling relay (WebSocket)
//! - Health and Prometheus endpoints

pub mod api;
