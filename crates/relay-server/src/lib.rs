//! # firechat-relay-server
//!
//! HTTP and WebSocket front end for the Firechat relay.
//!
//! The binary wires these together: [`config::Config`] is loaded, metrics
//! are described, and [`handlers::run_server`] serves until Ctrl-C.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{build_router, run_server, serve, AppState};
