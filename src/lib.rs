//! Client for the obs-websocket 4.x remote-control protocol: connection and
//! auth handshake, request/reply correlation by `message-id`, and
//! publish/subscribe delivery of unsolicited events.

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{ClientBuilder, ObsClient};
pub use error::{ObsError, ObsResult};
pub use events::{EventFilter, EventSubscription};
pub use model::{AuthChallenge, Event, Reply, VersionInfo};
pub use session::{Session, SessionOptions, SessionState};
