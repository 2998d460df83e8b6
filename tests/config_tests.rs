//! Integration tests for configuration loading.

use hbm_sim::common::error::SimError;
use hbm_sim::config::{Config, Organization, Speed};
use hbm_sim::controller::refresh::RefreshMode;
use hbm_sim::controller::row_policy::RowPolicyKind;
use hbm_sim::controller::scheduler::SchedulerKind;
use hbm_sim::memory::mapping::{AddressMapping, Translation};

/// Tests the defaults applied to an empty file.
#[test]
fn test_empty_toml_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.standard, "HBM");
    assert_eq!(config.channels, 8);
    assert_eq!(config.ranks, 1);
    assert_eq!(config.organization, Organization::Density4Gb);
    assert_eq!(config.speed, Speed::Speed1Gbps);
    assert_eq!(config.mapping, AddressMapping::RoBaRaCoCh);
    assert_eq!(config.translation, Translation::None);
    assert_eq!(config.scheduler, SchedulerKind::FrFcfsCap);
    assert_eq!(config.scheduler_cap, 16);
    assert_eq!(config.row_policy, RowPolicyKind::Opened);
    assert_eq!(config.refresh_mode, RefreshMode::Rank);
    assert_eq!(config.queue_capacity, 32);
    assert!((config.write_high_watermark - 0.8).abs() < 1e-9);
    assert!((config.write_low_watermark - 0.2).abs() < 1e-9);
    assert_eq!(config.cycle_limit, None);
    assert!(!config.print_cmd_trace);
}

/// Tests that the shipped TOML configuration loads.
#[test]
fn test_default_config_file() {
    let config = Config::from_file("configs/default.toml").unwrap();
    assert_eq!(config.channels, 8);
    assert_eq!(config.organization, Organization::Density4Gb);
    assert_eq!(config.scheduler, SchedulerKind::FrFcfsCap);
}

/// Tests that the shipped legacy configuration loads.
#[test]
fn test_legacy_config_file() {
    let config = Config::from_file("configs/HBM-config.cfg").unwrap();
    assert_eq!(config.standard, "HBM");
    assert_eq!(config.channels, 8);
    assert_eq!(config.speed, Speed::Speed1Gbps);
    assert_eq!(config.organization, Organization::Density4Gb);
    assert_eq!(config.translation, Translation::None);
    assert_eq!(config.mapping, AddressMapping::RoBaRaCoCh);
    assert_eq!(config.cpu_tick, 4);
    assert_eq!(config.mem_tick, 1);
    assert!(!config.print_cmd_trace);
}

/// Tests legacy value normalization.
#[test]
fn test_legacy_values() {
    let text = "\
# comment
standard = HBM
org = HBM_2Gb   # trailing comment
scheduler = FRFCFS_PriorHit
row_policy = closedAP
print_cmd_trace = on
write_high_watermark = 0.5
translation = random
refresh_mode = bank
";
    let config = Config::from_legacy(text).unwrap();
    assert_eq!(config.organization, Organization::Density2Gb);
    assert_eq!(config.scheduler, SchedulerKind::FrFcfsPriorHit);
    assert_eq!(config.row_policy, RowPolicyKind::ClosedAp);
    assert!(config.print_cmd_trace);
    assert!((config.write_high_watermark - 0.5).abs() < 1e-9);
    assert_eq!(config.translation, Translation::Random);
    assert_eq!(config.refresh_mode, RefreshMode::Bank);
}

/// Tests the accepted spellings of enumerated values.
#[test]
fn test_value_aliases() {
    let config = Config::from_toml(
        r#"
org = "1Gb"
scheduler = "FRFCFS_Cap"
row_policy = "closed_ap"
mapping = "ChRaBaRoCo"
"#,
    )
    .unwrap();
    assert_eq!(config.organization, Organization::Density1Gb);
    assert_eq!(config.scheduler, SchedulerKind::FrFcfsCap);
    assert_eq!(config.row_policy, RowPolicyKind::ClosedAp);
    assert_eq!(config.mapping, AddressMapping::ChRaBaRoCo);

    let config = Config::from_toml("scheduler = \"FCFS\"\nrow_policy = \"timeout\"").unwrap();
    assert_eq!(config.scheduler, SchedulerKind::Fcfs);
    assert_eq!(config.row_policy, RowPolicyKind::Timeout);
}

/// Tests rejection of unknown keys and values.
#[test]
fn test_unknown_keys_and_values() {
    assert!(matches!(
        Config::from_toml("channel_count = 4"),
        Err(SimError::ConfigParse(_))
    ));
    assert!(matches!(
        Config::from_toml("scheduler = \"LIFO\""),
        Err(SimError::ConfigParse(_))
    ));
    assert!(matches!(
        Config::from_toml("organization = \"density_8Gb\""),
        Err(SimError::ConfigParse(_))
    ));
}

/// Tests the cross-field validation rules.
#[test]
fn test_validation() {
    assert!(matches!(
        Config::from_toml("standard = \"DDR4\""),
        Err(SimError::Config(_))
    ));
    assert!(Config::from_toml("standard = \"hbm\"").is_ok());
    assert!(matches!(
        Config::from_toml("queue_capacity = 0"),
        Err(SimError::Config(_))
    ));
    assert!(matches!(
        Config::from_toml("write_high_watermark = 1.5"),
        Err(SimError::Config(_))
    ));
    assert!(matches!(
        Config::from_toml("mem_tick = 0"),
        Err(SimError::Config(_))
    ));
}

/// Tests malformed legacy lines and missing files.
#[test]
fn test_load_errors() {
    assert!(matches!(
        Config::from_legacy("channels 8"),
        Err(SimError::Config(_))
    ));
    assert!(matches!(
        Config::from_file("configs/does-not-exist.cfg"),
        Err(SimError::Io { .. })
    ));
}
