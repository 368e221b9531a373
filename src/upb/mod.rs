//! # UPB decode engine
//!
//! Everything needed to understand the traffic between a UPB Powerline Interface Module
//! (PIM) and the Upstart configuration client, with no I/O of its own:
//!
//! - [`framing`] cuts a byte stream into frames under the active discipline
//! - [`handshake`] and [`auth`] cover the text exchange that opens a connection
//! - [`pulse`] rebuilds packets the PIM reports one 2-bit symbol at a time
//! - [`packet`], [`types`] and [`checksum`] decode the packets themselves
//! - [`session`] ties it together per connection and emits [`events::DecodeEvent`]s
//!
//! The relay in [`crate::proxy`] feeds each connection's bytes to its session; the
//! `decode` subcommand does the same from a capture file.

pub mod auth;
#[cfg(feature = "catalog")]
pub mod catalog;
pub mod checksum;
pub mod error;
pub mod events;
pub mod framing;
pub mod handshake;
pub mod hex;
pub mod packet;
pub mod pulse;
pub mod session;
pub mod types;

pub use error::{AuthError, DecodeError};
pub use events::{DecodeEvent, Side, SideEvent};
pub use session::{ClientSession, PimSession, SharedHandshake, StreamDecoder};

/// Decoder for `side`, sharing `shared` with its peer.
pub fn decoder_for(side: Side, shared: SharedHandshake) -> Box<dyn StreamDecoder> {
    match side {
        Side::Pim => Box::new(PimSession::new(shared)),
        Side::Client => Box::new(ClientSession::new(shared)),
    }
}
