//! Realtime client for the MIGII change feed.
//!
//! [`ReconnectingClient`] keeps one transport open, turns inbound
//! `change` frames into [`ClientEvent::Change`] signals and reconnects with
//! linear backoff until the consecutive-failure cap is reached.

pub mod client;
pub mod connector;
pub mod error;

pub use client::{ClientEvent, ClientHandle, ConnectionState, ReconnectingClient};
pub use connector::{Connector, TransportStream, WsConnector};
pub use error::{ClientError, Result};
