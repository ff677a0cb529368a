//! Test support for driving a [`DispatchController`] by hand.
//!
//! The harness owns the controller and its command queue, so a test decides
//! exactly when queued completions are applied.

pub mod harness;

pub use harness::{Harness, text};
