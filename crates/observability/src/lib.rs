//! Process-wide logging setup shared by binaries and integration harnesses.

pub mod tracing;

pub use crate::tracing::{InitError, init};
