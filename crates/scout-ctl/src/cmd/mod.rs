//! CLI command modules.

pub mod discover;
pub mod wallet;
