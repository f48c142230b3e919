//! Integration test helpers for helf conversation scenarios.
//!
//! Every scenario runs against one shared in-memory backend, with one
//! [`helf_chat::ChatSession`] per simulated user.

pub mod harness;
