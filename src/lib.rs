//! HBM DRAM Subsystem Simulator Library.
//!
//! This crate implements a cycle-accurate simulator of a High Bandwidth
//! Memory (HBM) subsystem. Every memory cycle each channel controller picks at
//! most one DRAM command that the protocol allows, honoring the hierarchical
//! timing constraints of the device, and tracks row-buffer and power state
//! precisely enough for cycle-level statistics.
//!
//! # Architecture
//!
//! * **Device**: Protocol tables and the channel → rank → bank group → bank tree.
//! * **Controller**: Request queues, scheduler, row policy, row table and refresh.
//! * **Memory**: Address decoding and one controller per channel.
//!
//! # Modules
//!
//! * `common`: Address vectors, requests and the error type.
//! * `config`: Configuration loading and parsing.
//! * `controller`: Per-channel memory controller.
//! * `dram`: HBM protocol specification and device tree.
//! * `memory`: Memory system façade and address mapping.
//! * `sim`: Trace reader and simulation driver.
//! * `stats`: Performance statistics collection.

/// Shared address, request and error types.
///
/// Provides the decoded address vector, the request object passed between
/// the driver and the controllers, and the simulator-wide error enum.
pub mod common;

/// Configuration system for device organization and controller policies.
///
/// Loads TOML or legacy `key = value` files into a validated [`config::Config`].
pub mod config;

/// Per-channel memory controller.
///
/// Implements request queueing, scheduling policies, row-buffer management
/// and refresh, issuing at most one command per cycle.
pub mod controller;

/// HBM device model.
///
/// Defines the command set, the protocol tables and the device topology tree
/// that enforces timing constraints.
pub mod dram;

/// Memory system façade.
///
/// Decodes addresses, routes requests to channel controllers and advances
/// them together.
pub mod memory;

/// Simulation harness.
///
/// Reads DRAM traces and drives the memory system until every request has
/// been served.
pub mod sim;

/// Performance statistics collection and reporting.
///
/// Tracks row-buffer locality, latencies, queue occupancy and bank busy time.
pub mod stats;
