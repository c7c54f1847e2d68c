//! Shared utilities for the mixin-rs CLI

pub mod format;
pub mod labels;
pub mod progress;
pub mod table;

pub use format::*;
pub use labels::*;
pub use progress::*;
pub use table::*;
