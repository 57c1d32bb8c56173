//! Testing utilities
//!
//! A scriptable transport so the client can be exercised without a broker.

pub mod mocks;

pub use mocks::*;
