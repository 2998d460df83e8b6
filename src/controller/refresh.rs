//! Periodic Refresh Generator.
//!
//! Emits refresh requests for every rank of a channel at a fixed interval.
//! In rank mode each request refreshes a whole rank (REF) every nREFI cycles.
//! In bank mode each request refreshes a single bank (REFSB) every nREFI1B
//! cycles, rotating through the banks of each rank.

use serde::Deserialize;

use crate::common::addr::unaddressed;
use crate::common::data::{Request, RequestType};
use crate::dram::spec::DeviceSpec;
use crate::dram::types::Level;

/// Refresh granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// All-bank refresh per rank.
    Rank,
    /// Per-bank refresh with a rotating target bank.
    Bank,
}

/// Refresh request generator for one channel.
#[derive(Debug)]
pub struct Refresh {
    mode: RefreshMode,
    channel: i64,
    interval: u64,
    last_refreshed: u64,
    ranks: usize,
    bank_groups: usize,
    banks: usize,
    bank_counters: Vec<usize>,
}

impl Refresh {
    /// Creates the generator.
    ///
    /// # Arguments
    ///
    /// * `spec` - Device specification (supplies nREFI / nREFI1B and bank counts).
    /// * `channel` - Channel id stamped into every request.
    /// * `mode` - Refresh granularity.
    pub fn new(spec: &DeviceSpec, channel: usize, mode: RefreshMode) -> Self {
        let count = &spec.org.count;
        let ranks = count[Level::Rank.index()];
        Self {
            mode,
            channel: channel as i64,
            interval: match mode {
                RefreshMode::Rank => spec.speed.n_refi,
                RefreshMode::Bank => spec.speed.n_refi1b,
            },
            last_refreshed: 0,
            ranks,
            bank_groups: count[Level::BankGroup.index()],
            banks: count[Level::Bank.index()],
            bank_counters: vec![0; ranks],
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Advances to cycle `clk`.
    ///
    /// # Returns
    ///
    /// One refresh request per rank when the interval has elapsed, otherwise
    /// nothing.
    pub fn tick(&mut self, clk: u64) -> Vec<Request> {
        if clk.saturating_sub(self.last_refreshed) < self.interval {
            return Vec::new();
        }
        self.last_refreshed = clk;

        let mut requests = Vec::with_capacity(self.ranks);
        for rank in 0..self.ranks {
            let mut addr = unaddressed();
            addr[Level::Channel.index()] = self.channel;
            addr[Level::Rank.index()] = rank as i64;

            if self.mode == RefreshMode::Bank {
                let per_rank = (self.bank_groups * self.banks).max(1);
                let target = self.bank_counters[rank];
                addr[Level::BankGroup.index()] = (target / self.banks.max(1)) as i64;
                addr[Level::Bank.index()] = (target % self.banks.max(1)) as i64;
                self.bank_counters[rank] = (target + 1) % per_rank;
            }

            log::debug!(
                "refresh ch{} rank{} at cycle {} ({:?})",
                self.channel,
                rank,
                clk,
                self.mode
            );
            requests.push(Request::with_addr_vec(addr, RequestType::Refresh));
        }
        requests
    }
}
