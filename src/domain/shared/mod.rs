//! Shared kernel - Common types used across all bounded contexts

pub mod error;
pub mod events;
pub mod value_objects;

pub use error::{DeviceError, DomainError, ProtocolError, Result, SendError};
pub use value_objects::*;
