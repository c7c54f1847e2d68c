//! Level 3: End-to-End Scenario Tests
//!
//! Whole runs with real directories, plus property tests over planning and
//! application.

pub mod properties;
pub mod real_world;
