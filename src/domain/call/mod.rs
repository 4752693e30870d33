//! Call bounded context - manages the lifecycle of one audio/video call

pub mod aggregate;
pub mod effect;
pub mod event;
pub mod value_object;

pub use aggregate::{CallSession, LocalMedia};
pub use effect::{Effect, SendPolicy};
pub use event::CallEvent;
pub use value_object::{CallDirection, CallStatus, FailureReason, MediaKind, TrackKind};
