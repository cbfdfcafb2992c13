//! # whiz-channels
//!
//! WhatsApp transport, device linking and session blobs for whiz.

pub mod session;
pub mod whatsapp;
