//! Ferry Library
//!
//! Single-file TCP transfer: a length-prefixed metadata frame followed by the
//! raw file body, received by a single-threaded readiness-driven server

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod finalize;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod receipt;
pub mod server;
pub mod uniquify;

pub use config::Config;
pub use error::TransferError;
pub use server::{serve, start, Server, ShutdownHandle};
