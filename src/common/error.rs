//! Simulator Error Types.
//!
//! Every failure the simulator can report is a [`SimError`]. Configuration
//! and trace errors surface at startup or while reading input; the remaining
//! variants are protocol or bookkeeping invariant violations that abort the
//! simulation, since a trace produced after one of them is not physically
//! implementable.

use thiserror::Error;

use crate::dram::types::Command;

/// Simulator-wide error type.
#[derive(Debug, Error)]
pub enum SimError {
    /// A file could not be read.
    #[error("could not read '{path}': {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML or has unknown keys/values.
    #[error("malformed configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration parsed but describes an unsupported system.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A trace line could not be parsed.
    #[error("trace line {line}: {msg}")]
    Trace {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        msg: String,
    },

    /// A controller queue grew past its capacity.
    #[error("{queue} queue holds {len} requests, capacity is {capacity}")]
    QueueOverflow {
        /// Queue name.
        queue: &'static str,
        /// Observed length.
        len: usize,
        /// Configured capacity.
        capacity: usize,
    },

    /// The refresh unit could not enqueue a refresh request.
    #[error("refresh request for channel {channel} rank {rank} was rejected")]
    RefreshRejected {
        /// Channel id.
        channel: usize,
        /// Rank id.
        rank: i64,
    },

    /// The row table disagrees with the command being issued.
    #[error("row table inconsistency on {cmd}: {msg}")]
    RowTable {
        /// Command being recorded.
        cmd: Command,
        /// Description of the mismatch.
        msg: String,
    },

    /// Closed-AP policy found no queued hit for an access to an open row.
    #[error("auto-precharge found no queued hit for row group {row_group:?}")]
    AutoPrecharge {
        /// Row group being accessed.
        row_group: Vec<i64>,
    },

    /// A command was issued while its timing or state check failed.
    #[error("{cmd} issued at cycle {cycle} before it was legal for {addr:?}")]
    IllegalCommand {
        /// Offending command.
        cmd: Command,
        /// Address vector.
        addr: Vec<i64>,
        /// Issue cycle.
        cycle: u64,
    },

    /// More requests retired than were being served.
    #[error("serving-request count underflow at {level} {id}")]
    ServingUnderflow {
        /// Level name.
        level: &'static str,
        /// Node id.
        id: usize,
    },

    /// The request type has no command in the device protocol.
    #[error("request type {0:?} is not supported by this device")]
    UnsupportedRequest(crate::common::data::RequestType),
}
