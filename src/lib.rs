//! # upbproxy - decoding relay for UPB Powerline Interface Modules
//!
//! upbproxy sits between a networked UPB PIM and the Upstart configuration client.
//! It relays every byte unchanged in both directions and decodes the traffic on the
//! way through: the connection handshake and challenge/response login, the PIM's line
//! protocol, pulse-mode packet reassembly and the UPB packets themselves.
//!
//! ## Features
//!
//! - **Transparent relay**: bytes are forwarded unchanged after decoding; the proxy never
//!   alters or delays traffic because of a decode problem.
//! - **Three framings**: NUL-terminated handshake text, CR-terminated lines, and the
//!   length-prefixed binary gateway framing requested by a `WRAPPED` login.
//! - **Authentication check**: with the PIM password configured, the client's HMAC-MD5
//!   response is verified against the PIM's challenge.
//! - **Diagnostics as events**: checksum, sequence and length problems are reported and
//!   decoding continues.
//! - **Text or JSON output**, plus process-wide counters.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upbproxy::config::Config;
//! use upbproxy::proxy::ProxyServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     ProxyServer::new(config).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`upb`] - The decode engine: framing, handshake, pulses, packets, sessions
//! - [`proxy`] - TCP listener and per-client relay tasks
//! - [`display`] - Event rendering (log lines or JSON)
//! - [`config`] - Configuration loading and validation
//! - [`metrics`] - Decode counters
//! - [`logutil`] - Single-line escaping for logs
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    bytes    ┌──────────────┐    bytes    ┌──────────┐
//! │ Upstart  │ ◄─────────► │    proxy     │ ◄─────────► │   PIM    │
//! └──────────┘             └──────────────┘             └──────────┘
//!                                 │ chunks
//!                          ┌──────────────┐
//!                          │ upb sessions │ ← one per side, shared handshake
//!                          └──────────────┘
//!                                 │ events
//!                          ┌──────────────┐
//!                          │   display    │
//!                          └──────────────┘
//! ```

pub mod config;
pub mod display;
pub mod logutil;
pub mod metrics;
pub mod proxy;
pub mod upb;
