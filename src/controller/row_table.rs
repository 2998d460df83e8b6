//! Open-Row Bookkeeping.
//!
//! The row table mirrors which row is open in every bank of one channel,
//! along with how many column accesses it has served and when it was last
//! touched. The scheduler uses the hit counts (FR-FCFS-Cap), the row policy
//! uses the timestamps, and the controller uses both for statistics.

use std::collections::BTreeMap;

use crate::common::addr::{row_group, AddrVec, RowGroup};
use crate::common::error::SimError;
use crate::dram::spec::DeviceSpec;
use crate::dram::types::{Command, Level};

/// State of one open row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Open row id.
    pub row: i64,
    /// Column accesses served since activation.
    pub hits: u64,
    /// Cycle of the last activation or access.
    pub timestamp: u64,
}

/// Open rows of one channel, keyed by bank address.
#[derive(Debug, Default)]
pub struct RowTable {
    table: BTreeMap<RowGroup, Entry>,
}

impl RowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the issue of `cmd` to `addr` at `clk`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RowTable`] when an access targets a bank with no
    /// recorded open row or a different row, or when a close removes an
    /// unexpected number of entries.
    pub fn update(
        &mut self,
        spec: &DeviceSpec,
        cmd: Command,
        addr: &AddrVec,
        clk: u64,
    ) -> Result<(), SimError> {
        let group = row_group(addr);
        let row = addr[Level::Row.index()];

        if cmd.is_opening() {
            self.table.insert(
                group,
                Entry {
                    row,
                    hits: 0,
                    timestamp: clk,
                },
            );
        }

        if cmd.is_accessing() {
            let entry = self.table.get_mut(&group).ok_or_else(|| SimError::RowTable {
                cmd,
                msg: format!("no open row recorded for {:?}", group),
            })?;
            if entry.row != row {
                return Err(SimError::RowTable {
                    cmd,
                    msg: format!("row {} is open, access targets row {}", entry.row, row),
                });
            }
            entry.hits += 1;
            entry.timestamp = clk;
        }

        if cmd.is_closing() {
            let scope = if cmd.is_accessing() {
                Level::Bank
            } else {
                spec.scope(cmd)
            };
            let prefix = &addr[..=scope.index()];
            let before = self.table.len();
            self.table.retain(|key, _| key[..=scope.index()] != *prefix);
            let removed = before - self.table.len();

            let expected_exact = scope == Level::Bank;
            if (expected_exact && removed != 1) || (!expected_exact && removed == 0) {
                return Err(SimError::RowTable {
                    cmd,
                    msg: format!("closing {:?} removed {} open rows", prefix, removed),
                });
            }
        }
        Ok(())
    }

    /// Hits served by the open row of `addr`'s bank.
    ///
    /// # Arguments
    ///
    /// * `addr` - Target address.
    /// * `to_opened_row` - When `true`, count the bank's open row regardless
    ///   of which row `addr` names; otherwise `addr`'s row must be the open one.
    pub fn get_hits(&self, addr: &AddrVec, to_opened_row: bool) -> u64 {
        match self.table.get(&row_group(addr)) {
            Some(entry) if to_opened_row || entry.row == addr[Level::Row.index()] => entry.hits,
            _ => 0,
        }
    }

    /// Open row of `addr`'s bank, if any.
    pub fn get_open_row(&self, addr: &AddrVec) -> Option<i64> {
        self.table.get(&row_group(addr)).map(|e| e.row)
    }

    /// Open rows in bank-address order.
    pub fn iter(&self) -> impl Iterator<Item = (&RowGroup, &Entry)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
