//! WebSocket Session Management
//!
//! - `protocol`: the outbound reply and acknowledgement messages.
//! - `registry`: the shared connection registry and per-client histories.
//! - `session`: the connection lifecycle, from upgrade to release.
//! - `dispatch`: routes each parsed frame to its handler.
//! - `handlers`: one handler per inbound message kind.
//! - `cycle`: the chat, classification and speech steps behind a reply.

mod cycle;
pub mod dispatch;
mod handlers;
pub mod protocol;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use session::ws_handler;
