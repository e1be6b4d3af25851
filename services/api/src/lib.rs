//! Companion API Library Crate
//!
//! This library contains the web service behind the companion avatar: the
//! application state, the WebSocket message pipeline, the REST handlers and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
