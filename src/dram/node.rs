//! HBM Device Topology Tree.
//!
//! One [`DeviceNode`] exists per channel, rank, bank group and bank. Rows and
//! columns are not instantiated; the open rows of a bank live in that bank's
//! open-row set. Every node carries:
//!
//! * **FSM state:** set only by the transition functions of the [`DeviceSpec`].
//! * **Ready times:** `next[cmd]`, the earliest cycle `cmd` may issue here.
//! * **History:** the most recent issue cycles of each command, deep enough
//!   for the widest timing window triggered by it (e.g. four for tFAW).
//! * **Occupancy counters:** in-flight request counts and refresh windows used
//!   for busy-cycle statistics.
//!
//! Navigation is strictly top-down by address vector; nodes hold no parent
//! links.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::common::addr::AddrVec;
use crate::common::error::SimError;
use crate::dram::spec::DeviceSpec;
use crate::dram::types::{Command, DeviceState, Level};
use crate::stats::NodeStats;

/// A node of the device hierarchy.
pub struct DeviceNode {
    spec: Arc<DeviceSpec>,
    level: Level,
    id: usize,
    state: Option<DeviceState>,
    open_rows: BTreeSet<i64>,
    children: Vec<DeviceNode>,

    next: [u64; Command::COUNT],
    prev: [VecDeque<u64>; Command::COUNT],
    history_depth: [usize; Command::COUNT],

    cur_serving_requests: u64,
    begin_of_cur_reqcnt: Option<u64>,
    end_of_serving: u64,
    begin_of_refreshing: u64,
    end_of_refreshing: u64,
    refresh_intervals: Vec<(u64, u64)>,

    serving_requests: u64,
    active_cycles: u64,
    refresh_cycles: u64,
    refresh_overlap_cycles: u64,
    busy_cycles: u64,
    average_serving_requests: f64,
}

impl DeviceNode {
    /// Builds the subtree rooted at (`level`, `id`).
    ///
    /// Children are instantiated down to the bank level using the
    /// organization counts of `spec`.
    pub fn new(spec: Arc<DeviceSpec>, level: Level, id: usize) -> Self {
        let history_depth = std::array::from_fn(|c| {
            spec.timing(level, Command::ALL[c])
                .iter()
                .map(|t| t.dist)
                .max()
                .unwrap_or(0)
        });

        let children = match level.child() {
            Some(child) if child < Level::Row => (0..spec.org.count[child.index()])
                .map(|i| DeviceNode::new(Arc::clone(&spec), child, i))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            state: spec.start_state(level),
            spec,
            level,
            id,
            open_rows: BTreeSet::new(),
            children,
            next: [0; Command::COUNT],
            prev: std::array::from_fn(|_| VecDeque::new()),
            history_depth,
            cur_serving_requests: 0,
            begin_of_cur_reqcnt: None,
            end_of_serving: 0,
            begin_of_refreshing: 0,
            end_of_refreshing: 0,
            refresh_intervals: Vec::new(),
            serving_requests: 0,
            active_cycles: 0,
            refresh_cycles: 0,
            refresh_overlap_cycles: 0,
            busy_cycles: 0,
            average_serving_requests: 0.0,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    /// FSM state; `None` for stateless levels.
    pub fn state(&self) -> Option<DeviceState> {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DeviceState) {
        self.state = Some(state);
    }

    /// Rows currently open in this bank.
    pub fn open_rows(&self) -> impl Iterator<Item = i64> + '_ {
        self.open_rows.iter().copied()
    }

    pub fn is_row_open(&self, row: i64) -> bool {
        self.open_rows.contains(&row)
    }

    pub(crate) fn open_row(&mut self, row: i64) {
        self.open_rows.insert(row);
    }

    pub(crate) fn close_rows(&mut self) {
        self.open_rows.clear();
    }

    pub fn children(&self) -> &[DeviceNode] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [DeviceNode] {
        &mut self.children
    }

    /// Child with the given id, if any.
    pub fn child(&self, id: i64) -> Option<&DeviceNode> {
        usize::try_from(id).ok().and_then(|i| self.children.get(i))
    }

    fn child_mut(&mut self, id: i64) -> Option<&mut DeviceNode> {
        usize::try_from(id).ok().and_then(|i| self.children.get_mut(i))
    }

    /// Earliest cycle at which `cmd` may issue at this node (0 = unconstrained).
    pub fn next_ready(&self, cmd: Command) -> u64 {
        self.next[cmd.index()]
    }

    /// Last cycle covered by a refresh issued to this node.
    pub fn end_of_refreshing(&self) -> u64 {
        self.end_of_refreshing
    }

    /// Number of requests currently being served below this node.
    pub fn serving(&self) -> u64 {
        self.cur_serving_requests
    }

    /// Returns the command that must be issued next to make progress on `cmd`.
    ///
    /// The first level with a prerequisite decides. A request that does not
    /// address deeper levels gets `cmd` itself.
    pub fn decode(&self, cmd: Command, addr: &AddrVec) -> Command {
        let child_id = self.child_addr(addr);
        if let Some(prereq) = self.spec.prereq(self.level, cmd) {
            if let Some(required) = prereq(self, cmd, child_id) {
                return required;
            }
        }
        match self.child(child_id) {
            Some(child) => child.decode(cmd, addr),
            None => cmd,
        }
    }

    /// Returns `true` if `cmd` satisfies every ready time from here down to its scope.
    pub fn check(&self, cmd: Command, addr: &AddrVec, clk: u64) -> bool {
        if clk < self.next[cmd.index()] {
            return false;
        }
        if self.level == self.spec.scope(cmd) {
            return true;
        }
        match self.child(self.child_addr(addr)) {
            Some(child) => child.check(cmd, addr, clk),
            None => true,
        }
    }

    /// Earliest cycle at which `cmd` could pass [`check`](Self::check).
    pub fn get_next(&self, cmd: Command, addr: &AddrVec) -> u64 {
        let here = self.next[cmd.index()];
        if self.level == self.spec.scope(cmd) {
            return here;
        }
        match self.child(self.child_addr(addr)) {
            Some(child) => here.max(child.get_next(cmd, addr)),
            None => here,
        }
    }

    /// Returns `true` if `addr` targets the row already open in its bank.
    pub fn check_row_hit(&self, cmd: Command, addr: &AddrVec) -> bool {
        let child_id = self.child_addr(addr);
        if let Some(pred) = self.spec.rowhit(self.level, cmd) {
            return pred(self, cmd, child_id);
        }
        match self.child(child_id) {
            Some(child) => child.check_row_hit(cmd, addr),
            None => false,
        }
    }

    /// Returns `true` if the bank targeted by `addr` has any open row.
    pub fn check_row_open(&self, cmd: Command, addr: &AddrVec) -> bool {
        let child_id = self.child_addr(addr);
        if let Some(pred) = self.spec.rowopen(self.level, cmd) {
            return pred(self, cmd, child_id);
        }
        match self.child(child_id) {
            Some(child) => child.check_row_open(cmd, addr),
            None => false,
        }
    }

    /// Records the issue of `cmd` at cycle `clk`.
    pub fn update(&mut self, cmd: Command, addr: &AddrVec, clk: u64) {
        self.update_state(cmd, addr);
        self.update_timing(cmd, addr, clk);
    }

    fn update_state(&mut self, cmd: Command, addr: &AddrVec) {
        let child_id = self.child_addr(addr);
        if let Some(transition) = self.spec.transition(self.level, cmd) {
            transition(self, child_id);
        }
        if self.level == self.spec.scope(cmd) {
            return;
        }
        if let Some(child) = self.child_mut(child_id) {
            child.update_state(cmd, addr);
        }
    }

    fn update_timing(&mut self, cmd: Command, addr: &AddrVec, clk: u64) {
        let spec = Arc::clone(&self.spec);
        let constraints = spec.timing(self.level, cmd);

        if addr[self.level.index()] != self.id as i64 {
            for t in constraints.iter().filter(|t| t.sibling) {
                let slot = &mut self.next[t.target.index()];
                *slot = (*slot).max(clk + t.delay);
            }
            return;
        }

        let depth = self.history_depth[cmd.index()];
        if depth > 0 {
            let history = &mut self.prev[cmd.index()];
            history.push_front(clk);
            history.truncate(depth);
        }

        for t in constraints.iter().filter(|t| !t.sibling) {
            let Some(&past) = self.prev[cmd.index()].get(t.dist - 1) else {
                continue;
            };
            let slot = &mut self.next[t.target.index()];
            *slot = (*slot).max(past + t.delay);
        }

        if cmd.is_refreshing() {
            self.begin_of_refreshing = clk;
            self.end_of_refreshing = self.end_of_refreshing.max(self.next[Command::Act.index()]);
            self.refresh_cycles += self.end_of_refreshing.saturating_sub(clk);
            if self.cur_serving_requests > 0 {
                self.refresh_intervals
                    .push((self.begin_of_refreshing, self.end_of_refreshing));
            }
        }

        for child in &mut self.children {
            child.update_timing(cmd, addr, clk);
        }
    }

    /// Adjusts in-flight request counts along the path of `addr`, bank level and above.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ServingUnderflow`] if more requests retire than
    /// were started at some node.
    pub fn update_serving_requests(
        &mut self,
        addr: &AddrVec,
        delta: i64,
        clk: u64,
    ) -> Result<(), SimError> {
        if let Some(begin) = self.begin_of_cur_reqcnt {
            if self.cur_serving_requests > 0 {
                let span = clk.saturating_sub(begin);
                self.serving_requests += span * self.cur_serving_requests;
                self.active_cycles += span;
            }
        }
        self.begin_of_cur_reqcnt = Some(clk);

        self.cur_serving_requests = self
            .cur_serving_requests
            .checked_add_signed(delta)
            .ok_or(SimError::ServingUnderflow {
                level: self.level.name(),
                id: self.id,
            })?;

        if delta > 0 && self.cur_serving_requests == 1 {
            self.refresh_overlap_cycles += self.end_of_refreshing.saturating_sub(clk);
        } else if delta < 0 && self.cur_serving_requests == 0 {
            self.end_of_serving = clk;
            for &(start, end) in &self.refresh_intervals {
                self.refresh_overlap_cycles += self.end_of_serving.min(end).saturating_sub(start);
            }
            self.refresh_intervals.clear();
        }

        if self.level >= Level::Bank {
            return Ok(());
        }
        let child_id = self.child_addr(addr);
        match self.child_mut(child_id) {
            Some(child) => child.update_serving_requests(addr, delta, clk),
            None => Ok(()),
        }
    }

    /// Closes the statistics window of this subtree after `num_cycles` cycles.
    pub fn finish(&mut self, num_cycles: u64) {
        self.busy_cycles = (self.active_cycles + self.refresh_cycles)
            .saturating_sub(self.refresh_overlap_cycles);
        self.average_serving_requests = if num_cycles == 0 {
            0.0
        } else {
            self.serving_requests as f64 / num_cycles as f64
        };
        for child in &mut self.children {
            child.finish(num_cycles);
        }
    }

    /// Clears occupancy accumulators in this subtree, keeping in-flight counts.
    pub fn reset_stats(&mut self) {
        self.serving_requests = 0;
        self.active_cycles = 0;
        self.refresh_cycles = 0;
        self.refresh_overlap_cycles = 0;
        self.busy_cycles = 0;
        self.average_serving_requests = 0.0;
        for child in &mut self.children {
            child.reset_stats();
        }
    }

    /// Occupancy statistics of this node.
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            level: self.level.name(),
            id: self.id,
            active_cycles: self.active_cycles,
            refresh_cycles: self.refresh_cycles,
            refresh_overlap_cycles: self.refresh_overlap_cycles,
            busy_cycles: self.busy_cycles,
            serving_requests: self.serving_requests,
            average_serving_requests: self.average_serving_requests,
        }
    }

    /// Prints the FSM state and ready times of this subtree.
    pub fn print_state(&self, indent: usize) {
        let pad = "  ".repeat(indent);
        let state = self
            .state
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| "-".to_string());
        let pending: Vec<String> = Command::ALL
            .iter()
            .filter(|c| self.next[c.index()] > 0)
            .map(|c| format!("{}@{}", c, self.next[c.index()]))
            .collect();
        let rows: Vec<String> = self.open_rows.iter().map(|r| r.to_string()).collect();
        println!(
            "{}{} {}: state={} serving={} open=[{}] next=[{}]",
            pad,
            self.level,
            self.id,
            state,
            self.cur_serving_requests,
            rows.join(","),
            pending.join(" ")
        );
        for child in &self.children {
            child.print_state(indent + 1);
        }
    }

    fn child_addr(&self, addr: &AddrVec) -> i64 {
        self.level
            .child()
            .map(|l| addr[l.index()])
            .unwrap_or(crate::common::addr::UNADDRESSED)
    }
}
