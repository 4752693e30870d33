//! Observer Call - audio/video calling core for the election observer app
//!
//! This is a Domain-Driven Design (DDD) implementation of a one-to-one call
//! session state machine, its signaling and media adapters, and a UI
//! projection.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::error::Result;
