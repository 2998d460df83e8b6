//! Test module organization.
//!
//! This module organizes all integration tests for the HBM simulator.

/// Configuration loading and validation tests.
mod config_tests;


/// Device tree state and timing tests.
mod device_tests;



/// Row table, row policy and scheduler tests.
mod policy_tests;
