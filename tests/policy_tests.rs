//! Integration tests for the row table, row policies, schedulers and queues.

use std::sync::Arc;

use hbm_sim::common::addr::{AddrVec, UNADDRESSED};
use hbm_sim::common::data::{Request, RequestType};
use hbm_sim::common::error::SimError;
use hbm_sim::config::Config;
use hbm_sim::controller::queue::Queue;
use hbm_sim::controller::row_policy::{RowPolicy, RowPolicyKind};
use hbm_sim::controller::row_table::RowTable;
use hbm_sim::controller::scheduler::{self, ChannelView, SchedulerKind};
use hbm_sim::dram::{Command, DeviceNode, DeviceSpec, Level};

const U: i64 = UNADDRESSED;

/// Builds a single-channel device tree and its specification.
fn create_channel() -> (Arc<DeviceSpec>, DeviceNode) {
    let config = Config {
        channels: 1,
        ..Config::default()
    };
    let spec = Arc::new(DeviceSpec::new(&config).expect("valid config"));
    let channel = DeviceNode::new(Arc::clone(&spec), Level::Channel, 0);
    (spec, channel)
}

fn addr(bg: i64, bank: i64, row: i64, col: i64) -> AddrVec {
    [0, 0, bg, bank, row, col]
}

fn read(bg: i64, bank: i64, row: i64, col: i64, arrive: u64) -> Request {
    let mut req = Request::with_addr_vec(addr(bg, bank, row, col), RequestType::Read);
    req.arrive = arrive;
    req
}

/// Issues `cmd` to both the device tree and the row table.
fn issue(
    spec: &DeviceSpec,
    channel: &mut DeviceNode,
    table: &mut RowTable,
    cmd: Command,
    a: &AddrVec,
    clk: u64,
) {
    assert!(channel.check(cmd, a, clk), "{} not ready at {}", cmd, clk);
    channel.update(cmd, a, clk);
    table.update(spec, cmd, a, clk).expect("row table update");
}

/// Tests hit counting and open-row lookup.
#[test]
fn test_row_table_counts_hits() {
    let (spec, _) = create_channel();
    let mut table = RowTable::new();

    table.update(&spec, Command::Act, &addr(0, 0, 5, U), 1).unwrap();
    table.update(&spec, Command::Rd, &addr(0, 0, 5, 0), 8).unwrap();
    table.update(&spec, Command::Wr, &addr(0, 0, 5, 1), 20).unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.get_open_row(&addr(0, 0, 9, 0)), Some(5));
    assert_eq!(table.get_hits(&addr(0, 0, 5, 3), false), 2);
    assert_eq!(table.get_hits(&addr(0, 0, 9, 3), false), 0);
    assert_eq!(table.get_hits(&addr(0, 0, 9, 3), true), 2);
    assert_eq!(table.get_hits(&addr(1, 0, 5, 3), true), 0);

    let (_, entry) = table.iter().next().unwrap();
    assert_eq!(entry.timestamp, 20);
}

/// Tests that accesses must target the recorded open row.
#[test]
fn test_row_table_rejects_mismatched_access() {
    let (spec, _) = create_channel();
    let mut table = RowTable::new();

    let err = table
        .update(&spec, Command::Rd, &addr(0, 0, 5, 0), 8)
        .unwrap_err();
    assert!(matches!(err, SimError::RowTable { cmd: Command::Rd, .. }));

    table.update(&spec, Command::Act, &addr(0, 0, 5, U), 1).unwrap();
    let err = table
        .update(&spec, Command::Wr, &addr(0, 0, 6, 0), 8)
        .unwrap_err();
    assert!(matches!(err, SimError::RowTable { cmd: Command::Wr, .. }));
}

/// Tests the entry counts removed by each closing command.
#[test]
fn test_row_table_close_scopes() {
    let (spec, _) = create_channel();
    let mut table = RowTable::new();
    for bank in 0..3 {
        table.update(&spec, Command::Act, &addr(1, bank, 7, U), 1).unwrap();
    }

    table.update(&spec, Command::Pre, &addr(1, 0, U, U), 30).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.update(&spec, Command::Pre, &addr(1, 0, U, U), 31).is_err());

    table.update(&spec, Command::RdA, &addr(1, 1, 7, 4), 32).unwrap();
    assert_eq!(table.len(), 1);

    table.update(&spec, Command::PreA, &[0, 0, U, U, U, U], 40).unwrap();
    assert!(table.is_empty());
    assert!(table.update(&spec, Command::PreA, &[0, 0, U, U, U, U], 41).is_err());
}

/// Tests victim selection for every row policy.
#[test]
fn test_row_policy_victims() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(2, 1, 3, U), 1);
    issue(&spec, &mut channel, &mut table, Command::Rd, &addr(2, 1, 3, 0), 8);

    let opened = RowPolicy::new(RowPolicyKind::Opened, 50);
    assert_eq!(opened.get_victim(&channel, &table, 1000), None);

    let closed = RowPolicy::new(RowPolicyKind::Closed, 50);
    // PRE is blocked by nRAS until 18.
    assert_eq!(closed.get_victim(&channel, &table, 17), None);
    assert_eq!(
        closed.get_victim(&channel, &table, 18),
        Some([0, 0, 2, 1, U, U])
    );

    let closed_ap = RowPolicy::new(RowPolicyKind::ClosedAp, 50);
    assert!(closed_ap.get_victim(&channel, &table, 18).is_some());

    let timeout = RowPolicy::new(RowPolicyKind::Timeout, 50);
    assert_eq!(timeout.get_victim(&channel, &table, 57), None);
    assert!(timeout.get_victim(&channel, &table, 58).is_some());
    assert_eq!(timeout.kind(), RowPolicyKind::Timeout);
}

/// Tests that FCFS ignores readiness.
#[test]
fn test_fcfs_picks_oldest() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(0, 0, 1, U), 1);

    let mut queue = Queue::new("read", 8);
    queue.push(read(0, 0, 1, 0, 5)).unwrap();
    queue.push(read(0, 1, 2, 0, 3)).unwrap();
    queue.push(read(0, 2, 2, 0, 3)).unwrap();

    let view = ChannelView {
        channel: &channel,
        row_table: &table,
        clk: 10,
    };
    let fcfs = scheduler::build(SchedulerKind::Fcfs, 16);
    assert_eq!(fcfs.name(), "FCFS");
    assert_eq!(fcfs.get_head(&view, &queue), Some(1));
}

/// Tests that FR-FCFS prefers a ready row hit over an older conflict.
#[test]
fn test_frfcfs_prefers_ready() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(0, 0, 1, U), 1);

    let mut queue = Queue::new("read", 8);
    queue.push(read(0, 0, 2, 0, 0)).unwrap();
    queue.push(read(0, 0, 1, 0, 1)).unwrap();

    // RD ready from 8, PRE from 18.
    let view = ChannelView {
        channel: &channel,
        row_table: &table,
        clk: 10,
    };
    assert!(!view.is_ready(queue.get(0).unwrap()));
    assert!(view.is_ready(queue.get(1).unwrap()));
    assert_eq!(view.first_cmd(queue.get(0).unwrap()), Some(Command::Pre));

    let frfcfs = scheduler::build(SchedulerKind::FrFcfs, 16);
    assert_eq!(frfcfs.get_head(&view, &queue), Some(1));

    let early = ChannelView { clk: 5, ..view };
    assert_eq!(frfcfs.get_head(&early, &queue), Some(0));
}

/// Tests that FR-FCFS-Cap stops favoring a row after `cap` hits.
#[test]
fn test_frfcfs_cap_limits_hits() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(0, 0, 1, U), 1);
    issue(&spec, &mut channel, &mut table, Command::Rd, &addr(0, 0, 1, 0), 8);
    issue(&spec, &mut channel, &mut table, Command::Rd, &addr(0, 0, 1, 1), 11);

    let mut queue = Queue::new("read", 8);
    queue.push(read(3, 3, 9, 0, 0)).unwrap();
    queue.push(read(0, 0, 1, 2, 1)).unwrap();

    let view = ChannelView {
        channel: &channel,
        row_table: &table,
        clk: 14,
    };
    // Both the hit and the ACT for the miss to bank (3, 3) can issue.
    let uncapped = scheduler::build(SchedulerKind::FrFcfsCap, 16);
    assert_eq!(uncapped.get_head(&view, &queue), Some(0));

    let capped = scheduler::build(SchedulerKind::FrFcfsCap, 2);
    assert_eq!(capped.name(), "FRFCFS_CAP");
    let mut conflict_first = Queue::new("read", 8);
    conflict_first.push(read(0, 0, 1, 2, 0)).unwrap();
    conflict_first.push(read(0, 0, 4, 0, 1)).unwrap();
    let late = ChannelView { clk: 19, ..view };
    // Row 1 has served 2 hits: its RD no longer counts as ready, the PRE does.
    assert_eq!(capped.get_head(&late, &conflict_first), Some(1));
    assert_eq!(uncapped.get_head(&late, &conflict_first), Some(0));
}

/// Tests that FR-FCFS-PriorHit holds back precharges of rows still being hit.
#[test]
fn test_prior_hit_protects_open_row() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(0, 0, 1, U), 1);

    let mut queue = Queue::new("read", 8);
    queue.push(read(0, 0, 2, 0, 0)).unwrap();
    queue.push(read(0, 0, 1, 0, 1)).unwrap();

    // Neither request is ready at cycle 5.
    let view = ChannelView {
        channel: &channel,
        row_table: &table,
        clk: 5,
    };
    let prior_hit = scheduler::build(SchedulerKind::FrFcfsPriorHit, 16);
    assert_eq!(prior_hit.name(), "FRFCFS_PriorHit");
    assert_eq!(prior_hit.get_head(&view, &queue), Some(1));

    let frfcfs = scheduler::build(SchedulerKind::FrFcfs, 16);
    assert_eq!(frfcfs.get_head(&view, &queue), Some(0));

    let empty = Queue::new("read", 8);
    assert_eq!(prior_hit.get_head(&view, &empty), None);
}

/// Tests that every policy returns the same head on repeated calls.
#[test]
fn test_scheduler_is_deterministic() {
    let (spec, mut channel) = create_channel();
    let mut table = RowTable::new();
    issue(&spec, &mut channel, &mut table, Command::Act, &addr(0, 0, 1, U), 1);

    // Equal arrivals: two conflicts (PRE ready from 18), then two hits.
    let mut queue = Queue::new("read", 8);
    queue.push(read(0, 0, 2, 0, 0)).unwrap();
    queue.push(read(0, 0, 3, 0, 0)).unwrap();
    queue.push(read(0, 0, 1, 0, 0)).unwrap();
    queue.push(read(0, 0, 1, 1, 0)).unwrap();

    let view = ChannelView {
        channel: &channel,
        row_table: &table,
        clk: 10,
    };
    let early = ChannelView { clk: 5, ..view };
    let cases = [
        (SchedulerKind::Fcfs, Some(0), Some(0)),
        (SchedulerKind::FrFcfs, Some(2), Some(0)),
        (SchedulerKind::FrFcfsCap, Some(2), Some(0)),
        (SchedulerKind::FrFcfsPriorHit, Some(2), Some(2)),
    ];

    for (kind, at_ready, at_early) in cases {
        let sched = scheduler::build(kind, 16);
        for _ in 0..5 {
            assert_eq!(sched.get_head(&view, &queue), at_ready, "{}", sched.name());
            assert_eq!(sched.get_head(&early, &queue), at_early, "{}", sched.name());
        }
    }
}

/// Tests queue capacity handling.
#[test]
fn test_queue_capacity() {
    let mut queue = Queue::new("write", 2);
    assert!(queue.is_empty());
    assert!(queue.push(read(0, 0, 0, 0, 0)).is_ok());
    assert!(queue.push(read(0, 0, 0, 1, 0)).is_ok());
    assert!(queue.is_full());
    let rejected = queue.push(read(0, 0, 0, 2, 0)).unwrap_err();
    assert_eq!(rejected.addr_vec[Level::Row.index()], 2);
    assert_eq!(queue.len(), 2);
    assert!(queue.check_capacity().is_ok());

    let removed = queue.remove(0).unwrap();
    assert_eq!(removed.addr_vec[Level::Column.index()], 0);
    assert_eq!(queue.get(0).unwrap().addr_vec[Level::Column.index()], 1);
    assert_eq!(queue.name(), "write");
    assert_eq!(queue.capacity(), 2);
}
