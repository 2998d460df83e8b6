//! Per-Channel Memory Controller.
//!
//! This module implements the cycle-by-cycle command scheduler for one HBM
//! channel. It performs the following:
//! 1. **Queueing:** Buffers reads, writes and maintenance requests with backpressure.
//! 2. **Completion:** Returns read data once the read latency has elapsed.
//! 3. **Refresh:** Injects refresh requests at the refresh interval.
//! 4. **Scheduling:** Picks one request, decodes its next command and issues it
//!    if every timing constraint is met, at most one command per cycle.
//! 5. **Row management:** Tracks open rows and closes idle ones per the row policy.

/// Bounded request queues.
pub mod queue;

/// Periodic refresh generator.
pub mod refresh;

/// Speculative row closing.
pub mod row_policy;

/// Open-row bookkeeping.
pub mod row_table;

/// Request scheduling policies.
pub mod scheduler;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::common::addr::{AddrVec, UNADDRESSED};
use crate::common::data::{Request, RequestType};
use crate::common::error::SimError;
use crate::config::Config;
use crate::dram::node::DeviceNode;
use crate::dram::spec::DeviceSpec;
use crate::dram::types::{Command, Level};
use crate::stats::ControllerStats;

use queue::Queue;
use refresh::Refresh;
use row_policy::{RowPolicy, RowPolicyKind};
use row_table::RowTable;
use scheduler::{ChannelView, Scheduler};

/// Identifies one of the controller's request queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Read,
    Write,
    /// Requests whose row has been activated on their behalf.
    Activate,
    /// Refresh and power-management requests.
    Other,
}

/// Memory controller for one channel.
pub struct Controller {
    id: usize,
    clk: u64,
    stats_start: u64,
    spec: Arc<DeviceSpec>,
    channel: DeviceNode,

    scheduler: Box<dyn Scheduler>,
    row_policy: RowPolicy,
    row_table: RowTable,
    refresh: Refresh,

    read_q: Queue,
    write_q: Queue,
    act_q: Queue,
    other_q: Queue,
    pending_reads: VecDeque<Request>,

    write_mode: bool,
    high_watermark: f64,
    low_watermark: f64,
    print_cmd_trace: bool,

    stats: ControllerStats,
}

impl Controller {
    /// Creates the controller for channel `id`.
    ///
    /// # Arguments
    ///
    /// * `config` - Controller policies, queue capacity and watermarks.
    /// * `spec` - Shared device specification.
    /// * `id` - Channel index.
    pub fn new(config: &Config, spec: Arc<DeviceSpec>, id: usize) -> Self {
        let capacity = config.queue_capacity;
        Self {
            id,
            clk: 0,
            stats_start: 0,
            channel: DeviceNode::new(Arc::clone(&spec), Level::Channel, id),
            scheduler: scheduler::build(config.scheduler, config.scheduler_cap),
            row_policy: RowPolicy::new(config.row_policy, config.row_timeout),
            row_table: RowTable::new(),
            refresh: Refresh::new(&spec, id, config.refresh_mode),
            spec,
            read_q: Queue::new("read", capacity),
            write_q: Queue::new("write", capacity),
            act_q: Queue::new("activate", capacity),
            other_q: Queue::new("other", capacity),
            pending_reads: VecDeque::new(),
            write_mode: false,
            high_watermark: config.write_high_watermark,
            low_watermark: config.write_low_watermark,
            print_cmd_trace: config.print_cmd_trace,
            stats: ControllerStats {
                channel: id,
                ..ControllerStats::default()
            },
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Current controller cycle.
    pub fn clk(&self) -> u64 {
        self.clk
    }

    pub fn channel(&self) -> &DeviceNode {
        &self.channel
    }

    pub fn row_table(&self) -> &RowTable {
        &self.row_table
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn write_mode(&self) -> bool {
        self.write_mode
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    pub fn queue(&self, kind: QueueKind) -> &Queue {
        match kind {
            QueueKind::Read => &self.read_q,
            QueueKind::Write => &self.write_q,
            QueueKind::Activate => &self.act_q,
            QueueKind::Other => &self.other_q,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut Queue {
        match kind {
            QueueKind::Read => &mut self.read_q,
            QueueKind::Write => &mut self.write_q,
            QueueKind::Activate => &mut self.act_q,
            QueueKind::Other => &mut self.other_q,
        }
    }

    /// Reads whose data is on its way back.
    pub fn pending_reads(&self) -> &VecDeque<Request> {
        &self.pending_reads
    }

    /// Requests still owned by this controller.
    pub fn pending_requests(&self) -> usize {
        self.read_q.len()
            + self.write_q.len()
            + self.act_q.len()
            + self.other_q.len()
            + self.pending_reads.len()
    }

    /// Returns `true` while any request is being served.
    pub fn is_active(&self) -> bool {
        self.channel.serving() > 0
    }

    /// Returns `true` while any rank is inside a refresh window.
    pub fn is_refreshing(&self) -> bool {
        self.channel
            .children()
            .iter()
            .any(|rank| self.clk < rank.end_of_refreshing())
    }

    pub fn set_high_writeq_watermark(&mut self, mark: f64) {
        self.high_watermark = mark;
    }

    pub fn set_low_writeq_watermark(&mut self, mark: f64) {
        self.low_watermark = mark;
    }

    fn view(&self) -> ChannelView<'_> {
        ChannelView {
            channel: &self.channel,
            row_table: &self.row_table,
            clk: self.clk,
        }
    }

    /// Accepts a request into the queue matching its type.
    ///
    /// A read to an address with a queued write is answered from the write
    /// queue: it departs on the next cycle through the pending-read list and
    /// never occupies a read-queue slot.
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the target queue is full; the caller retries later.
    ///
    /// # Errors
    ///
    /// * [`SimError::UnsupportedRequest`] for request types the device cannot serve.
    /// * [`SimError::QueueOverflow`] if the target queue has exceeded its capacity.
    pub fn enqueue(&mut self, mut req: Request) -> Result<bool, SimError> {
        let kind = match req.kind {
            RequestType::Read => QueueKind::Read,
            RequestType::Write => QueueKind::Write,
            RequestType::Extension => return Err(SimError::UnsupportedRequest(req.kind)),
            _ => QueueKind::Other,
        };

        let queue = self.queue(kind);
        queue.check_capacity()?;
        if queue.is_full() {
            return Ok(false);
        }

        req.arrive = self.clk;
        if req.kind == RequestType::Read && self.write_q.contains_addr(req.addr) {
            req.depart = self.clk + 1;
            self.stats.forwarded_reads += 1;
            self.pending_reads.push_back(req);
            return Ok(true);
        }

        Ok(self.queue_mut(kind).push(req).is_ok())
    }

    /// Advances the controller by one cycle.
    ///
    /// # Errors
    ///
    /// Propagates every invariant violation detected while completing reads,
    /// injecting refreshes or issuing a command.
    pub fn cycle(&mut self) -> Result<(), SimError> {
        self.clk += 1;

        self.stats.queue_length_sum +=
            (self.read_q.len() + self.write_q.len() + self.pending_reads.len()) as u64;
        self.stats.read_queue_length_sum += (self.read_q.len() + self.pending_reads.len()) as u64;
        self.stats.write_queue_length_sum += self.write_q.len() as u64;

        self.complete_reads()?;

        for req in self.refresh.tick(self.clk) {
            let rank = req.addr_vec[Level::Rank.index()];
            if !self.enqueue(req)? {
                return Err(SimError::RefreshRejected {
                    channel: self.id,
                    rank,
                });
            }
        }

        self.update_write_mode();

        let mut selected = self.pick(QueueKind::Activate).map(|(i, c)| (QueueKind::Activate, i, c));
        if selected.is_none() {
            let kind = if !self.other_q.is_empty() {
                QueueKind::Other
            } else if self.write_mode {
                QueueKind::Write
            } else {
                QueueKind::Read
            };
            selected = self.pick(kind).map(|(i, c)| (kind, i, c));
        }

        let Some((kind, index, cmd)) = selected else {
            let victim = self
                .row_policy
                .get_victim(&self.channel, &self.row_table, self.clk);
            if let Some(addr) = victim {
                self.issue_cmd(Command::Pre, &addr)?;
            }
            return Ok(());
        };

        let (req_kind, addr_vec, first) = match self.queue_mut(kind).get_mut(index) {
            Some(req) => {
                let first = req.is_first_command;
                req.is_first_command = false;
                (req.kind, req.addr_vec, first)
            }
            None => return Ok(()),
        };

        if first {
            self.record_first_command(req_kind, &addr_vec)?;
        }

        self.issue_cmd(cmd, &addr_vec)?;

        let target = self.spec.translate(req_kind, &addr_vec);
        if Some(cmd) != target {
            if cmd.is_opening() && kind != QueueKind::Activate && !self.act_q.is_full() {
                if let Some(req) = self.queue_mut(kind).remove(index) {
                    let promoted = self.act_q.push(req);
                    debug_assert!(promoted.is_ok(), "activate queue filled during promotion");
                }
            }
            return Ok(());
        }

        let Some(mut req) = self.queue_mut(kind).remove(index) else {
            return Ok(());
        };
        match req.kind {
            RequestType::Read => {
                req.depart = self.clk + self.spec.read_latency;
                self.pending_reads.push_back(req);
            }
            RequestType::Write => {
                self.channel
                    .update_serving_requests(&req.addr_vec, -1, self.clk)?;
                req.complete();
            }
            _ => {}
        }
        Ok(())
    }

    /// Retires the head of `pending_reads` once its data is due.
    ///
    /// Reads leave in queue order, one per cycle: a forwarded read queued
    /// behind an in-flight read completes after it.
    fn complete_reads(&mut self) -> Result<(), SimError> {
        let ready = self
            .pending_reads
            .front()
            .is_some_and(|req| req.depart <= self.clk);
        if !ready {
            return Ok(());
        }
        let Some(req) = self.pending_reads.pop_front() else {
            return Ok(());
        };
        if req.depart - req.arrive > 1 {
            self.stats.read_latency_sum += req.depart - req.arrive;
            self.channel
                .update_serving_requests(&req.addr_vec, -1, self.clk)?;
        }
        self.stats.reads_completed += 1;
        req.complete();
        Ok(())
    }

    fn update_write_mode(&mut self) {
        let capacity = self.write_q.capacity() as f64;
        if !self.write_mode {
            if self.write_q.len() > (self.high_watermark * capacity) as usize
                || self.read_q.is_empty()
            {
                self.write_mode = true;
            }
        } else if self.write_q.len() < (self.low_watermark * capacity) as usize
            && !self.read_q.is_empty()
        {
            self.write_mode = false;
        }
    }

    /// Scheduler head of `kind` and its next command, if that command can issue now.
    fn pick(&self, kind: QueueKind) -> Option<(usize, Command)> {
        let view = self.view();
        let queue = self.queue(kind);
        let index = self.scheduler.get_head(&view, queue)?;
        let req = queue.get(index)?;
        let cmd = view.first_cmd(req)?;
        view.is_ready_cmd(cmd, &req.addr_vec).then_some((index, cmd))
    }

    fn record_first_command(&mut self, kind: RequestType, addr: &AddrVec) -> Result<(), SimError> {
        if !kind.is_data() {
            return Ok(());
        }
        self.channel.update_serving_requests(addr, 1, self.clk)?;

        let cmd = if kind == RequestType::Read {
            Command::Rd
        } else {
            Command::Wr
        };
        let hit = self.channel.check_row_hit(cmd, addr);
        let open = self.channel.check_row_open(cmd, addr);
        let tx = self.spec.transaction_bytes();
        let s = &mut self.stats;

        match (kind, hit, open) {
            (RequestType::Read, true, _) => {
                s.row_hits += 1;
                s.row_hits_read += 1;
            }
            (RequestType::Read, false, true) => {
                s.row_conflicts += 1;
                s.row_conflicts_read += 1;
            }
            (RequestType::Read, false, false) => {
                s.row_misses += 1;
                s.row_misses_read += 1;
            }
            (_, true, _) => {
                s.row_hits += 1;
                s.row_hits_write += 1;
            }
            (_, false, true) => {
                s.row_conflicts += 1;
                s.row_conflicts_write += 1;
            }
            (_, false, false) => {
                s.row_misses += 1;
                s.row_misses_write += 1;
            }
        }
        if kind == RequestType::Read {
            s.bytes_read += tx;
        } else {
            s.bytes_written += tx;
        }
        Ok(())
    }

    /// Under the closed-AP policy, turns the last queued access to a row into
    /// its auto-precharge form.
    fn auto_precharge(&self, cmd: Command, addr: &AddrVec) -> Result<Command, SimError> {
        if !cmd.is_accessing() || self.row_policy.kind() != RowPolicyKind::ClosedAp {
            return Ok(cmd);
        }

        let view = self.view();
        let group = &addr[..=Level::Row.index()];
        let count_hits = |queue: &Queue| {
            queue
                .iter()
                .filter(|req| view.is_row_hit(req) && req.addr_vec[..=Level::Row.index()] == *group)
                .count()
        };

        let mode_queue = if self.write_mode {
            &self.write_q
        } else {
            &self.read_q
        };
        let mut hits = count_hits(mode_queue);
        if hits == 0 {
            hits = count_hits(&self.act_q);
        }

        match hits {
            0 => Err(SimError::AutoPrecharge {
                row_group: group.to_vec(),
            }),
            1 => Ok(match cmd {
                Command::Rd => Command::RdA,
                Command::Wr => Command::WrA,
                other => other,
            }),
            _ => Ok(cmd),
        }
    }

    fn issue_cmd(&mut self, cmd: Command, addr: &AddrVec) -> Result<(), SimError> {
        let cmd = self.auto_precharge(cmd, addr)?;
        if !self.channel.check(cmd, addr, self.clk) {
            return Err(SimError::IllegalCommand {
                cmd,
                addr: addr.to_vec(),
                cycle: self.clk,
            });
        }
        self.channel.update(cmd, addr, self.clk);

        if cmd == Command::Pre && self.row_table.get_hits(addr, true) == 0 {
            self.stats.useless_activates += 1;
        }
        self.row_table.update(&self.spec, cmd, addr, self.clk)?;
        *self.stats.commands.entry(cmd.name()).or_insert(0) += 1;

        if self.print_cmd_trace || cfg!(feature = "always-trace") {
            let shown: Vec<String> = addr
                .iter()
                .take_while(|&&a| a != UNADDRESSED)
                .map(|a| a.to_string())
                .collect();
            eprintln!(
                "[Ctrl {}] {:>10}  {:<5} {}",
                self.id,
                self.clk,
                cmd,
                shown.join(",")
            );
        }
        log::trace!("ch{} cycle {}: {} {:?}", self.id, self.clk, cmd, addr);
        Ok(())
    }

    /// Closes the statistics window.
    ///
    /// # Arguments
    ///
    /// * `read_requests` - Reads routed to this channel, the denominator of
    ///   the average read latency.
    pub fn finish(&mut self, read_requests: u64) {
        let cycles = self.clk - self.stats_start;
        self.stats.finish(cycles, read_requests);
        self.channel.finish(cycles);
        self.stats.nodes = std::iter::once(&self.channel)
            .chain(self.channel.children().iter())
            .map(DeviceNode::stats)
            .collect();
    }

    /// Clears statistics, e.g. at the end of a warmup phase.
    pub fn reset_stats(&mut self) {
        self.stats_start = self.clk;
        self.stats = ControllerStats {
            channel: self.id,
            ..ControllerStats::default()
        };
        self.channel.reset_stats();
    }

    /// Prints queue occupancy and the device tree state.
    pub fn print_state(&self) {
        println!("   cycle:         {}", self.clk);
        println!("   write_mode:    {}", self.write_mode);
        println!("   queue_read:    {}", self.read_q.len());
        println!("   queue_write:   {}", self.write_q.len());
        println!("   queue_act:     {}", self.act_q.len());
        println!("   queue_other:   {}", self.other_q.len());
        println!("   pending_reads: {}", self.pending_reads.len());
        self.channel.print_state(2);
    }
}
