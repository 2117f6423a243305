//! Core domain and application logic for the checker admin console.
//!
//! Framework-agnostic: MongoDB and Telegram live behind ports (traits) implemented in
//! adapter crates.

pub mod accounts;
pub mod admins;
pub mod block;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod duration;
pub mod errors;
pub mod formatting;
pub mod keys;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod ports;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
