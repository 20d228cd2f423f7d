//! Device-independent protocol core of the launch monitor connector.
//!
//! Nothing in here performs I/O: decoders, framing and the connection state
//! machine are plain functions and values that the discovery crate drives.

pub mod bytes;
pub mod checksum;
pub mod cobs;
pub mod config;
pub mod context;
pub mod crypto;
pub mod event;
pub mod liveness;
pub mod message;
pub mod mlm2pro;
pub mod peripheral;
pub mod profile;
pub mod protocol;
pub mod r10;
pub mod state;
