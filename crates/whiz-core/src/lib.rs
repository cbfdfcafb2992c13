//! # whiz-core
//!
//! Core types, traits, configuration, logging and error handling for the whiz bot.

pub mod config;
pub mod error;
pub mod format;
pub mod link;
pub mod logbuf;
pub mod message;
pub mod traits;
