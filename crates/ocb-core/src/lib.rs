//! Core relay logic for the onlineconf notification bot.
//!
//! This crate is framework-agnostic. The upstream bot API, the database and the
//! concrete messengers live behind ports (traits); adapter crates implement them.

pub mod config;
pub mod domain;
pub mod errors;
pub mod fetcher;
pub mod logging;
pub mod memory;
pub mod messaging;
pub mod notification;
pub mod notifier;
pub mod ports;
pub mod pump;
pub mod render;
pub mod settings;
pub mod users;

pub use errors::{Error, Result};

#[cfg(test)]
mod testing;
