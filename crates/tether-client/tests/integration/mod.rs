//! Integration tests for tether-client.
//!
//! These run the hybrid client end to end against in-process servers:
//! - a WebSocket server speaking the session frame protocol
//! - an HTTP server standing in for the stateless endpoint

pub mod common;
