//! `crossbar` is the peer-to-peer fabric of the integration bus. A central
//! registry process brokers membership; participants then hold direct duplex
//! transports to each other and exchange strongly typed simulation messages
//! over named virtual links.
//!
//! The crate is organized bottom-up: `wire` holds the length-prefixed frame
//! format, `protocol` the versioned handshake messages, `messages` the typed
//! payloads, `link` the per-(type, network) routing object, and `connection`
//! the reactor that owns all peers and drives the handshake state machine.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod messages;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod uri;
pub mod wire;

pub use crate::connection::Connection;
pub use crate::error::{Error, Result};
pub use crate::registry::Registry;
