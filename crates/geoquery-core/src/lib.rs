//! GeoQuery Core - Domain models, configuration and ports
//!
//! This crate contains the canonical filter and geometry model shared by the
//! dialect parsers, the SQL translators and the query executor.

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{ErrorKind, GeoqueryError, Result, UnsupportedReason};
