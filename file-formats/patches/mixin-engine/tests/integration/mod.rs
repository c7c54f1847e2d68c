//! Level 2: Feature Integration Tests
//!
//! These tests exercise planning and application through the public API.

pub mod application;
pub mod planning;
pub mod session;
