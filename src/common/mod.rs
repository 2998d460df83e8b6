//! Common utilities and types used throughout the HBM simulator.
//!
//! This module provides the fundamental types shared by the device model,
//! the controllers and the memory façade: decoded address vectors, memory
//! requests, and the simulator-wide error type.

/// Decoded address vectors and bit-slicing helpers.
pub mod addr;

/// Memory request definitions.
pub mod data;

/// Error types for configuration, trace and invariant failures.
pub mod error;

pub use addr::{AddrVec, RowGroup, UNADDRESSED};
pub use data::{Callback, Request, RequestType};
pub use error::SimError;
