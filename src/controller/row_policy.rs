//! Speculative Row Closing.
//!
//! When the controller has nothing ready to issue it asks the row policy for
//! a bank whose open row should be precharged ahead of demand.

use serde::Deserialize;

use crate::common::addr::{from_row_group, AddrVec};
use crate::controller::row_table::RowTable;
use crate::dram::node::DeviceNode;
use crate::dram::types::Command;

/// Row-buffer management policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum RowPolicyKind {
    /// Close any open row as soon as PRE is legal.
    #[serde(rename = "closed", alias = "Closed")]
    Closed,
    /// Close via auto-precharge on the last queued hit, speculatively otherwise.
    #[serde(rename = "closedAP", alias = "ClosedAP", alias = "closed_ap")]
    ClosedAp,
    /// Leave rows open until a conflict forces a precharge.
    #[serde(rename = "opened", alias = "Opened")]
    Opened,
    /// Close rows idle for at least the configured timeout.
    #[serde(rename = "timeout", alias = "Timeout")]
    Timeout,
}

/// Picks victim rows for speculative precharge.
#[derive(Debug)]
pub struct RowPolicy {
    kind: RowPolicyKind,
    timeout: u64,
}

impl RowPolicy {
    /// Creates a row policy.
    ///
    /// # Arguments
    ///
    /// * `kind` - Policy.
    /// * `timeout` - Idle cycles before a row is closed under [`RowPolicyKind::Timeout`].
    pub fn new(kind: RowPolicyKind, timeout: u64) -> Self {
        Self { kind, timeout }
    }

    pub fn kind(&self) -> RowPolicyKind {
        self.kind
    }

    /// Returns the bank address whose open row should be precharged now.
    ///
    /// Only rows whose PRE passes the timing check at `clk` are eligible; the
    /// first eligible row in bank-address order wins.
    pub fn get_victim(
        &self,
        channel: &DeviceNode,
        row_table: &RowTable,
        clk: u64,
    ) -> Option<AddrVec> {
        let min_idle = match self.kind {
            RowPolicyKind::Opened => return None,
            RowPolicyKind::Closed | RowPolicyKind::ClosedAp => 0,
            RowPolicyKind::Timeout => self.timeout,
        };

        row_table
            .iter()
            .filter(|(_, entry)| clk.saturating_sub(entry.timestamp) >= min_idle)
            .map(|(group, _)| from_row_group(group))
            .find(|addr| channel.check(Command::Pre, addr, clk))
    }
}
