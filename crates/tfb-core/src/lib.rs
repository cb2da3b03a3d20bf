//! Core routing logic for the topic forwarder bot.
//!
//! This crate is framework-agnostic. Telegram lives behind the
//! [`messaging::port::MessagingPort`] trait, implemented in the adapter crate.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod forwarder;
pub mod ingest;
pub mod logging;
pub mod mapping;
pub mod matcher;
pub mod messaging;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
