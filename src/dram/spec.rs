//! HBM Device Specification.
//!
//! The static protocol description consulted by every [`DeviceNode`]:
//! organization and speed tables, command scopes, and per-(level, command)
//! dispatch tables for prerequisites, row predicates, state transitions and
//! timing constraints. The tables are fixed arrays of function pointers built
//! once in [`DeviceSpec::new`]; nothing mutates them afterwards.

use crate::common::addr::{AddrVec, UNADDRESSED};
use crate::common::data::RequestType;
use crate::common::error::SimError;
use crate::config::{Config, Organization, Speed};
use crate::dram::node::DeviceNode;
use crate::dram::types::{Command, DeviceState, Level};

/// Burst length in prefetch units (2n prefetch, burst of 4).
const PREFETCH_SIZE: u64 = 4;

/// Channel data width in bits.
const CHANNEL_WIDTH: u64 = 128;

/// nRFC per density (1Gb, 2Gb, 4Gb).
const RFC_TABLE: [u64; 3] = [55, 80, 130];

/// nREFI1B per density.
const REFI1B_TABLE: [u64; 3] = [64, 128, 256];

/// nXS per density.
const XS_TABLE: [u64; 3] = [60, 85, 135];

/// Organization of one density grade.
#[derive(Clone, Debug)]
pub struct OrgEntry {
    /// Device density in Mb.
    pub size_mb: u32,
    /// Data width.
    pub dq: u32,
    /// Number of children per level (channel and rank from configuration).
    pub count: [usize; Level::COUNT],
}

/// Timing parameters of one speed grade, in memory cycles.
#[derive(Clone, Debug)]
pub struct SpeedEntry {
    pub rate: u32,
    pub freq: f64,
    pub t_ck: f64,
    pub n_bl: u64,
    pub n_ccds: u64,
    pub n_ccdl: u64,
    pub n_cl: u64,
    pub n_rcdr: u64,
    pub n_rcdw: u64,
    pub n_rp: u64,
    pub n_cwl: u64,
    pub n_ras: u64,
    pub n_rc: u64,
    pub n_rtp: u64,
    pub n_wtrs: u64,
    pub n_wtrl: u64,
    pub n_wr: u64,
    pub n_rrds: u64,
    pub n_rrdl: u64,
    pub n_faw: u64,
    pub n_rfc: u64,
    pub n_refi: u64,
    pub n_refi1b: u64,
    pub n_pd: u64,
    pub n_xp: u64,
    pub n_ckesr: u64,
    pub n_xs: u64,
}

/// A timing rule stored under its trigger command.
///
/// After the trigger is issued, `target` may not issue until `delay` cycles
/// after the `dist`-th most recent trigger. Sibling rules apply to the
/// siblings of the addressed node instead of the node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingConstraint {
    pub target: Command,
    pub dist: usize,
    pub delay: u64,
    pub sibling: bool,
}

/// Returns the command that must be issued first, if any.
pub type PrereqFn = fn(&DeviceNode, Command, i64) -> Option<Command>;

/// Row-hit / row-open predicate evaluated at the bank.
pub type RowPredFn = fn(&DeviceNode, Command, i64) -> bool;

/// Post-issue state transition.
pub type TransitionFn = fn(&mut DeviceNode, i64);

type Table<T> = [[Option<T>; Command::COUNT]; Level::COUNT];

/// Static HBM protocol description.
pub struct DeviceSpec {
    pub org: OrgEntry,
    pub speed: SpeedEntry,
    /// Cycles from a read command to data return.
    pub read_latency: u64,
    pub prefetch_size: u64,
    pub channel_width: u64,
    start: [Option<DeviceState>; Level::COUNT],
    scope: [Level; Command::COUNT],
    prereq: Table<PrereqFn>,
    rowhit: Table<RowPredFn>,
    rowopen: Table<RowPredFn>,
    transition: Table<TransitionFn>,
    /// Timing constraints indexed `[level][trigger]`.
    timing: [[Vec<TimingConstraint>; Command::COUNT]; Level::COUNT],
}

impl DeviceSpec {
    /// Builds the specification for the configured organization and speed.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] when channel or rank counts are zero or
    /// not a power of two, or when subarrays are requested.
    pub fn new(config: &Config) -> Result<Self, SimError> {
        for (name, n) in [("channels", config.channels), ("ranks", config.ranks)] {
            if n == 0 || !n.is_power_of_two() {
                return Err(SimError::Config(format!(
                    "{} must be a non-zero power of two, got {}",
                    name, n
                )));
            }
        }
        if config.subarrays != 0 {
            return Err(SimError::Config(
                "HBM has no subarray-level parallelism; subarrays must be 0".to_string(),
            ));
        }

        let mut org = org_entry(config.organization);
        org.count[Level::Channel.index()] = config.channels;
        org.count[Level::Rank.index()] = config.ranks;

        let density = match org.size_mb >> 10 {
            1 => 0,
            2 => 1,
            _ => 2,
        };
        let mut speed = speed_entry(config.speed);
        speed.n_rfc = RFC_TABLE[density];
        speed.n_refi1b = REFI1B_TABLE[density];
        speed.n_xs = XS_TABLE[density];

        let mut spec = Self {
            read_latency: speed.n_cl + speed.n_bl,
            org,
            speed,
            prefetch_size: PREFETCH_SIZE,
            channel_width: CHANNEL_WIDTH,
            start: [
                None,
                Some(DeviceState::PowerUp),
                None,
                Some(DeviceState::Closed),
                None,
                None,
            ],
            scope: [
                Level::Row,
                Level::Bank,
                Level::Rank,
                Level::Column,
                Level::Column,
                Level::Column,
                Level::Column,
                Level::Rank,
                Level::Bank,
                Level::Rank,
                Level::Rank,
                Level::Rank,
                Level::Rank,
            ],
            prereq: [[None; Command::COUNT]; Level::COUNT],
            rowhit: [[None; Command::COUNT]; Level::COUNT],
            rowopen: [[None; Command::COUNT]; Level::COUNT],
            transition: [[None; Command::COUNT]; Level::COUNT],
            timing: std::array::from_fn(|_| std::array::from_fn(|_| Vec::new())),
        };
        spec.init_prereq();
        spec.init_rowhit();
        spec.init_rowopen();
        spec.init_transition();
        spec.init_timing();
        Ok(spec)
    }

    /// Bytes moved by one column command.
    pub fn transaction_bytes(&self) -> u64 {
        self.prefetch_size * self.channel_width / 8
    }

    /// Initial state of nodes at `level`.
    pub fn start_state(&self, level: Level) -> Option<DeviceState> {
        self.start[level.index()]
    }

    /// Deepest level a command acts on.
    pub fn scope(&self, cmd: Command) -> Level {
        self.scope[cmd.index()]
    }

    pub fn prereq(&self, level: Level, cmd: Command) -> Option<PrereqFn> {
        self.prereq[level.index()][cmd.index()]
    }

    pub fn rowhit(&self, level: Level, cmd: Command) -> Option<RowPredFn> {
        self.rowhit[level.index()][cmd.index()]
    }

    pub fn rowopen(&self, level: Level, cmd: Command) -> Option<RowPredFn> {
        self.rowopen[level.index()][cmd.index()]
    }

    pub fn transition(&self, level: Level, cmd: Command) -> Option<TransitionFn> {
        self.transition[level.index()][cmd.index()]
    }

    pub fn timing(&self, level: Level, cmd: Command) -> &[TimingConstraint] {
        &self.timing[level.index()][cmd.index()]
    }

    /// Adds a rule triggered by `trigger` at `level`.
    ///
    /// Consumes the specification, so rules can only be added before it is
    /// shared with a device tree.
    pub fn with_constraint(
        mut self,
        level: Level,
        trigger: Command,
        constraint: TimingConstraint,
    ) -> Self {
        self.timing[level.index()][trigger.index()].push(constraint);
        self
    }

    /// Command that services a request of `kind` addressed at `addr`.
    ///
    /// A refresh that names a bank becomes a single-bank refresh. Extension
    /// requests have no HBM command.
    pub fn translate(&self, kind: RequestType, addr: &AddrVec) -> Option<Command> {
        match kind {
            RequestType::Read => Some(Command::Rd),
            RequestType::Write => Some(Command::Wr),
            RequestType::Refresh if addr[Level::Bank.index()] != UNADDRESSED => {
                Some(Command::RefSb)
            }
            RequestType::Refresh => Some(Command::Ref),
            RequestType::PowerDown => Some(Command::Pde),
            RequestType::SelfRefresh => Some(Command::Sre),
            RequestType::Extension => None,
        }
    }

    fn init_prereq(&mut self) {
        let rank = Level::Rank.index();
        let bank = Level::Bank.index();

        self.prereq[rank][Command::Rd.index()] = Some(prereq_rank_access);
        self.prereq[rank][Command::Wr.index()] = Some(prereq_rank_access);
        self.prereq[bank][Command::Rd.index()] = Some(prereq_bank_access);
        self.prereq[bank][Command::Wr.index()] = Some(prereq_bank_access);

        self.prereq[rank][Command::Ref.index()] = Some(prereq_rank_ref);
        self.prereq[bank][Command::RefSb.index()] = Some(prereq_bank_refsb);
        self.prereq[rank][Command::Pde.index()] = Some(prereq_rank_pde);
        self.prereq[rank][Command::Sre.index()] = Some(prereq_rank_sre);
    }

    fn init_rowhit(&mut self) {
        let bank = Level::Bank.index();
        self.rowhit[bank][Command::Rd.index()] = Some(rowhit_bank);
        self.rowhit[bank][Command::Wr.index()] = Some(rowhit_bank);
    }

    fn init_rowopen(&mut self) {
        let bank = Level::Bank.index();
        self.rowopen[bank][Command::Rd.index()] = Some(rowopen_bank);
        self.rowopen[bank][Command::Wr.index()] = Some(rowopen_bank);
    }

    fn init_transition(&mut self) {
        let rank = Level::Rank.index();
        let bank = Level::Bank.index();

        self.transition[bank][Command::Act.index()] = Some(transition_bank_act);
        self.transition[bank][Command::Pre.index()] = Some(transition_bank_pre);
        self.transition[bank][Command::RdA.index()] = Some(transition_bank_pre);
        self.transition[bank][Command::WrA.index()] = Some(transition_bank_pre);
        self.transition[rank][Command::PreA.index()] = Some(transition_rank_prea);
        self.transition[rank][Command::Pde.index()] = Some(transition_rank_pde);
        self.transition[rank][Command::Pdx.index()] = Some(transition_rank_powerup);
        self.transition[rank][Command::Sre.index()] = Some(transition_rank_sre);
        self.transition[rank][Command::Srx.index()] = Some(transition_rank_powerup);
    }

    fn init_timing(&mut self) {
        use Command::*;

        let s = self.speed.clone();
        let cas_pairs = |t: &mut [Vec<TimingConstraint>; Command::COUNT],
                         from: [Command; 2],
                         to: [Command; 2],
                         delay: u64| {
            for f in from {
                for g in to {
                    push(t, f, g, 1, delay);
                }
            }
        };

        // Channel
        let t = &mut self.timing[Level::Channel.index()];
        cas_pairs(t, [Rd, RdA], [Rd, RdA], s.n_bl);
        cas_pairs(t, [Wr, WrA], [Wr, WrA], s.n_bl);

        // Rank
        let t = &mut self.timing[Level::Rank.index()];
        cas_pairs(t, [Rd, RdA], [Rd, RdA], s.n_ccds);
        cas_pairs(t, [Wr, WrA], [Wr, WrA], s.n_ccds);
        cas_pairs(t, [Rd, RdA], [Wr, WrA], s.n_cl + s.n_ccds + 2 - s.n_cwl);
        cas_pairs(t, [Wr, WrA], [Rd, RdA], s.n_cwl + s.n_bl + s.n_wtrs);
        push(t, Rd, PreA, 1, s.n_rtp);
        push(t, Wr, PreA, 1, s.n_cwl + s.n_bl + s.n_wr);

        // CAS <-> PD
        push(t, Rd, Pde, 1, s.n_cl + s.n_bl + 1);
        push(t, RdA, Pde, 1, s.n_cl + s.n_bl + 1);
        push(t, Wr, Pde, 1, s.n_cwl + s.n_bl + s.n_wr);
        push(t, WrA, Pde, 1, s.n_cwl + s.n_bl + s.n_wr + 1);
        for target in [Rd, RdA, Wr, WrA] {
            push(t, Pdx, target, 1, s.n_xp);
        }

        // RAS <-> RAS
        push(t, Act, Act, 1, s.n_rrds);
        push(t, Act, Act, 4, s.n_faw);
        push(t, Act, PreA, 1, s.n_ras);
        push(t, PreA, Act, 1, s.n_rp);

        // RAS <-> REF
        push(t, Pre, Ref, 1, s.n_rp);
        push(t, PreA, Ref, 1, s.n_rp);
        push(t, Ref, Act, 1, s.n_rfc);

        // RAS <-> PD
        push(t, Act, Pde, 1, 1);
        push(t, Pdx, Act, 1, s.n_xp);
        push(t, Pdx, Pre, 1, s.n_xp);
        push(t, Pdx, PreA, 1, s.n_xp);

        // RAS <-> SR
        push(t, Pre, Sre, 1, s.n_rp);
        push(t, PreA, Sre, 1, s.n_rp);
        push(t, Srx, Act, 1, s.n_xs);

        // REF <-> REF, PD, SR
        push(t, Ref, Ref, 1, s.n_rfc);
        push(t, Ref, Pde, 1, 1);
        push(t, Pdx, Ref, 1, s.n_xp);
        push(t, Srx, Ref, 1, s.n_xs);

        // PD <-> PD, SR
        push(t, Pde, Pdx, 1, s.n_pd);
        push(t, Pdx, Pde, 1, s.n_xp);
        push(t, Pdx, Sre, 1, s.n_xp);
        push(t, Srx, Pde, 1, s.n_xs);

        // SR <-> SR
        push(t, Sre, Srx, 1, s.n_ckesr);
        push(t, Srx, Sre, 1, s.n_xs);

        // Bank group
        let t = &mut self.timing[Level::BankGroup.index()];
        cas_pairs(t, [Rd, RdA], [Rd, RdA], s.n_ccdl);
        cas_pairs(t, [Wr, WrA], [Wr, WrA], s.n_ccdl);
        cas_pairs(t, [Wr, WrA], [Rd, RdA], s.n_cwl + s.n_bl + s.n_wtrl);
        push(t, Act, Act, 1, s.n_rrdl);

        // Bank
        let t = &mut self.timing[Level::Bank.index()];
        push(t, Act, Rd, 1, s.n_rcdr);
        push(t, Act, RdA, 1, s.n_rcdr);
        push(t, Act, Wr, 1, s.n_rcdw);
        push(t, Act, WrA, 1, s.n_rcdw);
        push(t, Rd, Pre, 1, s.n_rtp);
        push(t, Wr, Pre, 1, s.n_cwl + s.n_bl + s.n_wr);
        push(t, RdA, Act, 1, s.n_rtp + s.n_rp);
        push(t, WrA, Act, 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp);
        push(t, Act, Act, 1, s.n_rc);
        push(t, Act, Pre, 1, s.n_ras);
        push(t, Pre, Act, 1, s.n_rp);
        push(t, Pre, RefSb, 1, s.n_rp);
        push(t, RefSb, RefSb, 1, s.n_rfc);
        push(t, RefSb, Act, 1, s.n_rfc);
    }
}

fn push(
    t: &mut [Vec<TimingConstraint>; Command::COUNT],
    trigger: Command,
    target: Command,
    dist: usize,
    delay: u64,
) {
    t[trigger.index()].push(TimingConstraint {
        target,
        dist,
        delay,
        sibling: false,
    });
}

fn org_entry(org: Organization) -> OrgEntry {
    let (size_mb, bank_groups, banks, rows) = match org {
        Organization::Density1Gb => (1 << 10, 4, 2, 1 << 13),
        Organization::Density2Gb => (2 << 10, 4, 2, 1 << 14),
        Organization::Density4Gb => (4 << 10, 4, 4, 1 << 14),
    };
    OrgEntry {
        size_mb,
        dq: 128,
        count: [0, 0, bank_groups, banks, rows, 1 << 7],
    }
}

fn speed_entry(speed: Speed) -> SpeedEntry {
    match speed {
        Speed::Speed1Gbps => SpeedEntry {
            rate: 1000,
            freq: 500.0,
            t_ck: 2.0,
            n_bl: 2,
            n_ccds: 2,
            n_ccdl: 3,
            n_cl: 7,
            n_rcdr: 7,
            n_rcdw: 6,
            n_rp: 7,
            n_cwl: 4,
            n_ras: 17,
            n_rc: 24,
            n_rtp: 7,
            n_wtrs: 2,
            n_wtrl: 4,
            n_wr: 8,
            n_rrds: 4,
            n_rrdl: 5,
            n_faw: 20,
            n_rfc: 0,
            n_refi: 1950,
            n_refi1b: 0,
            n_pd: 5,
            n_xp: 5,
            n_ckesr: 5,
            n_xs: 0,
        },
    }
}

fn any_bank_open(rank: &DeviceNode) -> bool {
    rank.children()
        .iter()
        .flat_map(|bg| bg.children())
        .any(|bank| bank.state() != Some(DeviceState::Closed))
}

fn prereq_rank_access(node: &DeviceNode, _cmd: Command, _id: i64) -> Option<Command> {
    match node.state() {
        Some(DeviceState::ActPowerDown) | Some(DeviceState::PrePowerDown) => Some(Command::Pdx),
        Some(DeviceState::SelfRefresh) => Some(Command::Srx),
        _ => None,
    }
}

fn prereq_bank_access(node: &DeviceNode, cmd: Command, id: i64) -> Option<Command> {
    match node.state() {
        Some(DeviceState::Opened) if node.is_row_open(id) => Some(cmd),
        Some(DeviceState::Opened) => Some(Command::Pre),
        _ => Some(Command::Act),
    }
}

fn prereq_rank_ref(node: &DeviceNode, _cmd: Command, _id: i64) -> Option<Command> {
    if any_bank_open(node) {
        Some(Command::PreA)
    } else {
        Some(Command::Ref)
    }
}

fn prereq_bank_refsb(node: &DeviceNode, _cmd: Command, _id: i64) -> Option<Command> {
    if node.state() == Some(DeviceState::Closed) {
        Some(Command::RefSb)
    } else {
        Some(Command::Pre)
    }
}

fn prereq_rank_pde(node: &DeviceNode, _cmd: Command, _id: i64) -> Option<Command> {
    match node.state() {
        Some(DeviceState::SelfRefresh) => Some(Command::Srx),
        _ => Some(Command::Pde),
    }
}

fn prereq_rank_sre(node: &DeviceNode, _cmd: Command, _id: i64) -> Option<Command> {
    match node.state() {
        Some(DeviceState::ActPowerDown) => Some(Command::Pdx),
        Some(DeviceState::PrePowerDown) => Some(Command::Pde),
        _ => Some(Command::Sre),
    }
}

fn rowhit_bank(node: &DeviceNode, _cmd: Command, id: i64) -> bool {
    node.state() == Some(DeviceState::Opened) && node.is_row_open(id)
}

fn rowopen_bank(node: &DeviceNode, _cmd: Command, _id: i64) -> bool {
    node.state() == Some(DeviceState::Opened)
}

fn transition_bank_act(node: &mut DeviceNode, id: i64) {
    node.set_state(DeviceState::Opened);
    node.open_row(id);
}

fn transition_bank_pre(node: &mut DeviceNode, _id: i64) {
    node.set_state(DeviceState::Closed);
    node.close_rows();
}

fn transition_rank_prea(node: &mut DeviceNode, _id: i64) {
    for bg in node.children_mut() {
        for bank in bg.children_mut() {
            bank.set_state(DeviceState::Closed);
            bank.close_rows();
        }
    }
}

fn transition_rank_pde(node: &mut DeviceNode, _id: i64) {
    if any_bank_open(node) {
        node.set_state(DeviceState::ActPowerDown);
    } else {
        node.set_state(DeviceState::PrePowerDown);
    }
}

fn transition_rank_powerup(node: &mut DeviceNode, _id: i64) {
    node.set_state(DeviceState::PowerUp);
}

fn transition_rank_sre(node: &mut DeviceNode, _id: i64) {
    node.set_state(DeviceState::SelfRefresh);
}
