//! Integration tests for the HBM device tree.

use std::sync::Arc;

use hbm_sim::common::addr::{AddrVec, UNADDRESSED};
use hbm_sim::common::error::SimError;
use hbm_sim::config::Config;
use hbm_sim::dram::{Command, DeviceNode, DeviceSpec, DeviceState, Level, TimingConstraint};

const U: i64 = UNADDRESSED;

/// Builds a single-channel device tree with the default 4Gb organization.
fn create_channel() -> DeviceNode {
    let config = Config {
        channels: 1,
        ..Config::default()
    };
    let spec = DeviceSpec::new(&config).expect("valid config");
    DeviceNode::new(Arc::new(spec), Level::Channel, 0)
}

fn bank_addr(bg: i64, bank: i64, row: i64) -> AddrVec {
    [0, 0, bg, bank, row, U]
}

fn rank_addr() -> AddrVec {
    [0, 0, U, U, U, U]
}

fn bank_node(channel: &DeviceNode, bg: i64, bank: i64) -> &DeviceNode {
    channel
        .child(0)
        .and_then(|r| r.child(bg))
        .and_then(|g| g.child(bank))
        .expect("bank exists")
}

/// Tests the tree shape and initial FSM states.
#[test]
fn test_tree_construction() {
    let channel = create_channel();
    assert_eq!(channel.level(), Level::Channel);
    assert_eq!(channel.state(), None);
    assert_eq!(channel.children().len(), 1);

    let rank = channel.child(0).unwrap();
    assert_eq!(rank.state(), Some(DeviceState::PowerUp));
    assert_eq!(rank.children().len(), 4);

    for bg in rank.children() {
        assert_eq!(bg.level(), Level::BankGroup);
        assert_eq!(bg.children().len(), 4);
        for bank in bg.children() {
            assert_eq!(bank.state(), Some(DeviceState::Closed));
            assert!(bank.children().is_empty());
            assert_eq!(bank.open_rows().count(), 0);
        }
    }
    assert!(channel.child(-1).is_none());
    assert!(channel.child(1).is_none());
}

/// Tests command decoding through a closed, opened and conflicting bank.
#[test]
fn test_decode_follows_bank_state() {
    let mut channel = create_channel();
    let addr = bank_addr(1, 2, 40);

    assert_eq!(channel.decode(Command::Rd, &addr), Command::Act);
    assert_eq!(channel.decode(Command::Wr, &addr), Command::Act);

    channel.update(Command::Act, &addr, 1);
    assert_eq!(channel.decode(Command::Rd, &addr), Command::Rd);
    assert_eq!(channel.decode(Command::Wr, &addr), Command::Wr);
    assert_eq!(channel.decode(Command::Rd, &bank_addr(1, 2, 41)), Command::Pre);
    assert_eq!(channel.decode(Command::Rd, &bank_addr(1, 3, 41)), Command::Act);

    assert!(channel.check_row_hit(Command::Rd, &addr));
    assert!(!channel.check_row_hit(Command::Rd, &bank_addr(1, 2, 41)));
    assert!(channel.check_row_open(Command::Rd, &bank_addr(1, 2, 41)));
    assert!(!channel.check_row_open(Command::Rd, &bank_addr(0, 0, 41)));
}

/// Tests that a bank keeps exactly one open row through ACT and PRE.
#[test]
fn test_single_open_row_per_bank() {
    let mut channel = create_channel();
    let addr = bank_addr(0, 1, 12);

    channel.update(Command::Act, &addr, 1);
    let bank = bank_node(&channel, 0, 1);
    assert_eq!(bank.state(), Some(DeviceState::Opened));
    assert_eq!(bank.open_rows().collect::<Vec<_>>(), vec![12]);

    channel.update(Command::Pre, &addr, 20);
    let bank = bank_node(&channel, 0, 1);
    assert_eq!(bank.state(), Some(DeviceState::Closed));
    assert_eq!(bank.open_rows().count(), 0);
}

/// Tests ACT to RD/WR delays at the bank.
#[test]
fn test_activate_to_column_timing() {
    let mut channel = create_channel();
    let addr = bank_addr(0, 0, 3);

    assert!(channel.check(Command::Act, &addr, 1));
    channel.update(Command::Act, &addr, 1);

    assert!(!channel.check(Command::Rd, &addr, 7));
    assert!(channel.check(Command::Rd, &addr, 8));
    assert!(!channel.check(Command::Wr, &addr, 6));
    assert!(channel.check(Command::Wr, &addr, 7));
    assert_eq!(channel.get_next(Command::Rd, &addr), 8);
    assert_eq!(channel.get_next(Command::Pre, &addr), 18);
}

/// Tests the four-activate window across bank groups.
#[test]
fn test_four_activate_window() {
    let mut channel = create_channel();

    for (i, bg) in (0..4).enumerate() {
        let clk = 1 + 4 * i as u64;
        let addr = bank_addr(bg, 0, 0);
        assert!(channel.check(Command::Act, &addr, clk), "ACT {} at {}", bg, clk);
        channel.update(Command::Act, &addr, clk);
    }

    let fifth = bank_addr(0, 1, 0);
    assert!(!channel.check(Command::Act, &fifth, 17));
    assert!(!channel.check(Command::Act, &fifth, 20));
    assert!(channel.check(Command::Act, &fifth, 21));
}

/// Tests consecutive column commands within and across bank groups.
#[test]
fn test_column_to_column_timing() {
    let mut channel = create_channel();
    channel.update(Command::Act, &bank_addr(0, 0, 1), 1);
    channel.update(Command::Act, &bank_addr(1, 0, 1), 5);
    channel.update(Command::Act, &bank_addr(0, 1, 1), 10);

    channel.update(Command::Rd, &bank_addr(0, 0, 1), 20);
    // Different bank group: nCCDS (and channel nBL).
    assert!(!channel.check(Command::Rd, &bank_addr(1, 0, 1), 21));
    assert!(channel.check(Command::Rd, &bank_addr(1, 0, 1), 22));
    // Same bank group: nCCDL.
    assert!(!channel.check(Command::Rd, &bank_addr(0, 1, 1), 22));
    assert!(channel.check(Command::Rd, &bank_addr(0, 1, 1), 23));
    // Read to write turnaround at the rank: nCL + nCCDS + 2 - nCWL.
    assert!(!channel.check(Command::Wr, &bank_addr(1, 0, 1), 26));
    assert!(channel.check(Command::Wr, &bank_addr(1, 0, 1), 27));
}

/// Tests the refresh sequence: PREA while banks are open, then REF, then nRFC.
#[test]
fn test_refresh_sequence() {
    let mut channel = create_channel();
    let addr = bank_addr(2, 3, 100);
    channel.update(Command::Act, &addr, 1);

    assert_eq!(channel.decode(Command::Ref, &rank_addr()), Command::PreA);
    assert!(!channel.check(Command::PreA, &rank_addr(), 17));
    assert!(channel.check(Command::PreA, &rank_addr(), 18));
    channel.update(Command::PreA, &rank_addr(), 20);

    assert_eq!(bank_node(&channel, 2, 3).state(), Some(DeviceState::Closed));
    assert_eq!(channel.decode(Command::Ref, &rank_addr()), Command::Ref);
    assert!(!channel.check(Command::Ref, &rank_addr(), 26));
    assert!(channel.check(Command::Ref, &rank_addr(), 27));

    channel.update(Command::Ref, &rank_addr(), 27);
    assert!(!channel.check(Command::Act, &addr, 156));
    assert!(channel.check(Command::Act, &addr, 157));
    assert_eq!(channel.child(0).unwrap().end_of_refreshing(), 157);
}

/// Tests single-bank refresh decoding and its per-bank lockout.
#[test]
fn test_single_bank_refresh() {
    let mut channel = create_channel();
    let target = [0, 0, 1, 1, U, U];

    channel.update(Command::Act, &bank_addr(1, 1, 9), 1);
    assert_eq!(channel.decode(Command::RefSb, &target), Command::Pre);

    channel.update(Command::Pre, &bank_addr(1, 1, 9), 18);
    assert_eq!(channel.decode(Command::RefSb, &target), Command::RefSb);
    assert!(channel.check(Command::RefSb, &target, 25));
    channel.update(Command::RefSb, &target, 25);

    assert!(!channel.check(Command::Act, &bank_addr(1, 1, 9), 154));
    assert!(channel.check(Command::Act, &bank_addr(1, 1, 9), 155));
    assert!(channel.check(Command::Act, &bank_addr(1, 2, 9), 30));
}

/// Tests power-down entry and exit.
#[test]
fn test_power_down_cycle() {
    let mut channel = create_channel();
    let addr = bank_addr(0, 0, 1);

    assert_eq!(channel.decode(Command::Pde, &rank_addr()), Command::Pde);
    channel.update(Command::Pde, &rank_addr(), 1);
    assert_eq!(
        channel.child(0).unwrap().state(),
        Some(DeviceState::PrePowerDown)
    );

    assert_eq!(channel.decode(Command::Rd, &addr), Command::Pdx);
    assert!(!channel.check(Command::Pdx, &rank_addr(), 5));
    assert!(channel.check(Command::Pdx, &rank_addr(), 6));
    channel.update(Command::Pdx, &rank_addr(), 6);

    assert_eq!(channel.child(0).unwrap().state(), Some(DeviceState::PowerUp));
    assert_eq!(channel.decode(Command::Rd, &addr), Command::Act);
    assert!(!channel.check(Command::Act, &addr, 10));
    assert!(channel.check(Command::Act, &addr, 11));
}

/// Tests that power-down with an open bank enters active power-down.
#[test]
fn test_active_power_down() {
    let mut channel = create_channel();
    channel.update(Command::Act, &bank_addr(3, 0, 2), 1);
    channel.update(Command::Pde, &rank_addr(), 2);
    assert_eq!(
        channel.child(0).unwrap().state(),
        Some(DeviceState::ActPowerDown)
    );
    assert_eq!(channel.decode(Command::Sre, &rank_addr()), Command::Pdx);
}

/// Tests self-refresh entry and exit.
#[test]
fn test_self_refresh_cycle() {
    let mut channel = create_channel();
    let addr = bank_addr(0, 0, 1);

    assert_eq!(channel.decode(Command::Sre, &rank_addr()), Command::Sre);
    channel.update(Command::Sre, &rank_addr(), 1);
    assert_eq!(
        channel.child(0).unwrap().state(),
        Some(DeviceState::SelfRefresh)
    );

    assert_eq!(channel.decode(Command::Rd, &addr), Command::Srx);
    assert_eq!(channel.decode(Command::Pde, &rank_addr()), Command::Srx);
    assert!(!channel.check(Command::Srx, &rank_addr(), 5));
    assert!(channel.check(Command::Srx, &rank_addr(), 6));

    channel.update(Command::Srx, &rank_addr(), 6);
    assert!(!channel.check(Command::Act, &addr, 140));
    assert!(channel.check(Command::Act, &addr, 141));
}

/// Tests that sibling constraints apply to siblings only.
#[test]
fn test_sibling_constraint() {
    let config = Config {
        channels: 1,
        ..Config::default()
    };
    let spec = DeviceSpec::new(&config).unwrap().with_constraint(
        Level::Bank,
        Command::Act,
        TimingConstraint {
            target: Command::Act,
            dist: 1,
            delay: 10,
            sibling: true,
        },
    );
    assert!(spec
        .timing(Level::Bank, Command::Act)
        .iter()
        .any(|c| c.sibling && c.delay == 10));
    let mut channel = DeviceNode::new(Arc::new(spec), Level::Channel, 0);

    channel.update(Command::Act, &bank_addr(0, 0, 0), 1);

    assert_eq!(bank_node(&channel, 0, 1).next_ready(Command::Act), 11);
    assert_eq!(bank_node(&channel, 0, 3).next_ready(Command::Act), 11);
    assert_eq!(bank_node(&channel, 0, 0).next_ready(Command::Act), 25);
    assert_eq!(bank_node(&channel, 1, 1).next_ready(Command::Act), 0);
}

/// Tests in-flight request accounting and busy-cycle statistics.
#[test]
fn test_serving_request_accounting() {
    let mut channel = create_channel();
    let addr = bank_addr(0, 0, 1);

    channel.update_serving_requests(&addr, 1, 10).unwrap();
    channel.update_serving_requests(&addr, 1, 20).unwrap();
    assert_eq!(channel.serving(), 2);
    assert_eq!(bank_node(&channel, 0, 0).serving(), 2);

    channel.update_serving_requests(&addr, -1, 30).unwrap();
    channel.update_serving_requests(&addr, -1, 40).unwrap();
    assert_eq!(channel.serving(), 0);

    channel.finish(100);
    let stats = channel.stats();
    assert_eq!(stats.active_cycles, 30);
    assert_eq!(stats.serving_requests, 10 + 2 * 10 + 10);
    assert_eq!(stats.busy_cycles, 30);
    assert!((stats.average_serving_requests - 0.4).abs() < 1e-9);

    channel.reset_stats();
    assert_eq!(channel.stats().active_cycles, 0);
}

/// Tests that retiring more requests than were started is an error.
#[test]
fn test_serving_underflow() {
    let mut channel = create_channel();
    let err = channel
        .update_serving_requests(&bank_addr(0, 0, 0), -1, 5)
        .unwrap_err();
    assert!(matches!(err, SimError::ServingUnderflow { level: "channel", .. }));
}
