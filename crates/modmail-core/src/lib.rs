//! Core domain + routing logic for the modmail relay bot.
//!
//! This crate is intentionally framework-agnostic. Discord and the log store
//! live behind ports (traits) implemented in adapter crates.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod routing;
pub mod tickets;

pub use errors::{Error, Result};
