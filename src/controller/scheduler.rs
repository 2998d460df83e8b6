//! Request Scheduling Policies.
//!
//! A scheduler picks the request at the head of a queue. Policies are
//! pairwise comparisons folded over the queue from front to back, so ties
//! always go to the earlier queue position and the result is deterministic.
//!
//! Supported policies:
//! * **FCFS:** Oldest request first.
//! * **FR-FCFS:** Requests whose next command can issue now first, then oldest.
//! * **FR-FCFS-Cap:** As FR-FCFS, but an open row stops counting as ready once
//!   it has served `cap` hits, so a streaming row cannot starve other rows.
//! * **FR-FCFS-PriorHit:** Ready row hits first; requests whose precharge would
//!   close a row another queued request still hits are held back.

use serde::Deserialize;

use crate::common::addr::AddrVec;
use crate::common::data::Request;
use crate::controller::queue::Queue;
use crate::controller::row_table::RowTable;
use crate::dram::node::DeviceNode;
use crate::dram::types::Command;

/// Scheduling policy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum SchedulerKind {
    #[serde(rename = "FCFS")]
    Fcfs,
    #[serde(rename = "FRFCFS")]
    FrFcfs,
    #[serde(rename = "FRFCFS_CAP", alias = "FRFCFS_Cap")]
    FrFcfsCap,
    #[serde(rename = "FRFCFS_PriorHit")]
    FrFcfsPriorHit,
}

/// Read-only view of one channel at the current cycle.
///
/// Everything a scheduling decision may consult: the device tree, the open
/// rows and the cycle.
#[derive(Clone, Copy)]
pub struct ChannelView<'a> {
    pub channel: &'a DeviceNode,
    pub row_table: &'a RowTable,
    pub clk: u64,
}

impl<'a> ChannelView<'a> {
    /// Next command required to serve `req`, or `None` for untranslatable requests.
    pub fn first_cmd(&self, req: &Request) -> Option<Command> {
        let cmd = self.channel.spec().translate(req.kind, &req.addr_vec)?;
        Some(self.channel.decode(cmd, &req.addr_vec))
    }

    /// Returns `true` if the next command for `req` can issue this cycle.
    pub fn is_ready(&self, req: &Request) -> bool {
        self.first_cmd(req)
            .is_some_and(|cmd| self.is_ready_cmd(cmd, &req.addr_vec))
    }

    pub fn is_ready_cmd(&self, cmd: Command, addr: &AddrVec) -> bool {
        self.channel.check(cmd, addr, self.clk)
    }

    /// Returns `true` if `req` targets the row open in its bank.
    pub fn is_row_hit(&self, req: &Request) -> bool {
        self.channel
            .spec()
            .translate(req.kind, &req.addr_vec)
            .is_some_and(|cmd| self.channel.check_row_hit(cmd, &req.addr_vec))
    }

    /// Returns `true` if `req`'s bank has a row open.
    pub fn is_row_open(&self, req: &Request) -> bool {
        self.channel
            .spec()
            .translate(req.kind, &req.addr_vec)
            .is_some_and(|cmd| self.channel.check_row_open(cmd, &req.addr_vec))
    }
}

/// Trait for request scheduling policies.
pub trait Scheduler {
    /// Policy name.
    fn name(&self) -> &'static str;

    /// Returns `true` if `a` should be served before `b`.
    ///
    /// `a` is always the earlier of the two in queue order.
    fn prefer(&self, view: &ChannelView, a: &Request, b: &Request) -> bool;

    /// Selects the queue index of the request to serve next.
    ///
    /// # Returns
    ///
    /// `None` when the queue is empty or the policy holds every request back.
    fn get_head(&self, view: &ChannelView, queue: &Queue) -> Option<usize> {
        reduce(queue, 0..queue.len(), |a, b| self.prefer(view, a, b))
    }
}

fn reduce(
    queue: &Queue,
    indices: impl Iterator<Item = usize>,
    prefer: impl Fn(&Request, &Request) -> bool,
) -> Option<usize> {
    let mut head: Option<usize> = None;
    for i in indices {
        head = match head {
            None => Some(i),
            Some(h) => match (queue.get(h), queue.get(i)) {
                (Some(a), Some(b)) if !prefer(a, b) => Some(i),
                _ => Some(h),
            },
        };
    }
    head
}

fn fcfs(a: &Request, b: &Request) -> bool {
    a.arrive <= b.arrive
}

fn first_ready(ready_a: bool, ready_b: bool, a: &Request, b: &Request) -> bool {
    if ready_a != ready_b {
        return ready_a;
    }
    fcfs(a, b)
}

/// First-come first-served.
pub struct Fcfs;

impl Scheduler for Fcfs {
    fn name(&self) -> &'static str {
        "FCFS"
    }

    fn prefer(&self, _view: &ChannelView, a: &Request, b: &Request) -> bool {
        fcfs(a, b)
    }
}

/// First-ready, first-come first-served.
pub struct FrFcfs;

impl Scheduler for FrFcfs {
    fn name(&self) -> &'static str {
        "FRFCFS"
    }

    fn prefer(&self, view: &ChannelView, a: &Request, b: &Request) -> bool {
        first_ready(view.is_ready(a), view.is_ready(b), a, b)
    }
}

/// FR-FCFS with a cap on consecutive hits to one open row.
pub struct FrFcfsCap {
    cap: u64,
}

impl FrFcfsCap {
    /// Creates the policy.
    ///
    /// # Arguments
    ///
    /// * `cap` - Hits after which an open row no longer counts as ready.
    pub fn new(cap: u64) -> Self {
        Self { cap }
    }

    fn ready(&self, view: &ChannelView, req: &Request) -> bool {
        view.is_ready(req) && view.row_table.get_hits(&req.addr_vec, false) < self.cap
    }
}

impl Scheduler for FrFcfsCap {
    fn name(&self) -> &'static str {
        "FRFCFS_CAP"
    }

    fn prefer(&self, view: &ChannelView, a: &Request, b: &Request) -> bool {
        first_ready(self.ready(view, a), self.ready(view, b), a, b)
    }
}

/// FR-FCFS that never precharges a bank another queued request still hits.
pub struct FrFcfsPriorHit;

impl FrFcfsPriorHit {
    fn ready_hit(view: &ChannelView, req: &Request) -> bool {
        view.is_ready(req) && view.is_row_hit(req)
    }
}

impl Scheduler for FrFcfsPriorHit {
    fn name(&self) -> &'static str {
        "FRFCFS_PriorHit"
    }

    fn prefer(&self, view: &ChannelView, a: &Request, b: &Request) -> bool {
        first_ready(Self::ready_hit(view, a), Self::ready_hit(view, b), a, b)
    }

    fn get_head(&self, view: &ChannelView, queue: &Queue) -> Option<usize> {
        let head = reduce(queue, 0..queue.len(), |a, b| self.prefer(view, a, b))?;
        if queue.get(head).is_some_and(|req| Self::ready_hit(view, req)) {
            return Some(head);
        }

        let depth = view.channel.spec().scope(Command::Pre).index() + 1;
        let hit_groups: Vec<&[i64]> = queue
            .iter()
            .filter(|req| view.is_row_hit(req))
            .map(|req| &req.addr_vec[..depth])
            .collect();

        let candidates = (0..queue.len()).filter(|&i| {
            let Some(req) = queue.get(i) else {
                return false;
            };
            let closes_hit_row = !view.is_row_hit(req)
                && view.is_row_open(req)
                && hit_groups.contains(&&req.addr_vec[..depth]);
            !closes_hit_row
        });

        reduce(queue, candidates, |a, b| {
            first_ready(view.is_ready(a), view.is_ready(b), a, b)
        })
    }
}

/// Builds the configured scheduler.
///
/// # Arguments
///
/// * `kind` - Policy.
/// * `cap` - Hit cap, used by [`SchedulerKind::FrFcfsCap`] only.
pub fn build(kind: SchedulerKind, cap: u64) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Fcfs => Box::new(Fcfs),
        SchedulerKind::FrFcfs => Box::new(FrFcfs),
        SchedulerKind::FrFcfsCap => Box::new(FrFcfsCap::new(cap)),
        SchedulerKind::FrFcfsPriorHit => Box::new(FrFcfsPriorHit),
    }
}
