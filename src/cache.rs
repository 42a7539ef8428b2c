//! Cached provider client with lazy, single-flight rebuilds.

pub mod entry;
pub mod manager;
pub mod state;
