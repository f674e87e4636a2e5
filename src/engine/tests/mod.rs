//! Engine tests
//!
//! Organized by tag / feature area. Documents are written as the JSON the
//! markup compiler emits.

mod flow_tests;
mod helpers;
mod parallel_tests;
