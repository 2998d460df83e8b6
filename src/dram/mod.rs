//! HBM Device Model.
//!
//! This module contains the protocol description and the per-channel device
//! tree. It includes:
//! 1. **Types:** Hierarchy levels, commands and FSM states.
//! 2. **Spec:** Organization/speed tables and per-(level, command) dispatch tables.
//! 3. **Node:** The channel → rank → bank group → bank tree with ready times.

/// Levels, commands and device states.
pub mod types;

/// Static protocol tables.
pub mod spec;

/// Device topology tree.
pub mod node;

pub use node::DeviceNode;
pub use spec::{DeviceSpec, TimingConstraint};
pub use types::{Command, DeviceState, Level};
