//! mixin-rs library
//!
//! Command definitions and helpers behind the `mixin-rs` binary.

pub mod cli;
pub mod commands;
pub mod utils;
