//! Application layer - Use cases and application services
//!
//! This layer drives the call domain. It's responsible for:
//! - Feeding inputs to the call state machine one at a time
//! - Executing the effects it returns against the ports
//! - Publishing domain events and view snapshots

pub mod call_controller;
pub mod call_machine;
pub mod projection;

pub use call_controller::{CallController, CallHandle, CallTimeouts};
pub use call_machine::{CallContext, CallInput, CallSessionMachine};
pub use projection::{CallView, TerminalNotice};
