//! Media bounded context - device capture and remote playback

pub mod stream;

pub use stream::{LocalStream, MediaStreamManager, RemoteStreamRef};
#[cfg(test)]
pub use stream::MockMediaStreamManager;
