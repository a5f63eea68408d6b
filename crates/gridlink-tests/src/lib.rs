//! Gridlink integration test infrastructure.
//!
//! The `harness` module provides an in-process stand-in for the remote
//! service; the remaining modules hold cross-crate scenario tests for queue
//! ordering, the session flow and the subscription lifecycle, plus
//! property-based tests for the FIFO and shape laws.

pub mod harness;
pub mod proptest_core;
pub mod session_flow;
pub mod subscription_lifecycle;

pub use harness::{init_test_logging, FakeHub};
