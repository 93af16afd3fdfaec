//! Upstream streaming TTS adapter.
//!
//! Opens one duplex connection per speech request and demultiplexes provider
//! frames into audio and timing events.

mod connector;
mod error;
mod frame;
mod stream;

pub use connector::{ConnectorConfig, StreamConnector, WsConnector};
pub use error::StreamError;
pub use frame::{parse_frame, UpstreamEvent};
pub use stream::{UpstreamStream, EVENT_BUFFER};
