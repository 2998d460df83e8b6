//! Simulator Configuration.
//!
//! A single flat [`Config`] describes the device (standard, organization,
//! speed, channel and rank counts), the controller policies and the run
//! limits. It is read either from TOML or from the legacy `key = value`
//! format, whose bare string values are quoted before TOML parsing.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::SimError;
use crate::controller::refresh::RefreshMode;
use crate::controller::row_policy::RowPolicyKind;
use crate::controller::scheduler::SchedulerKind;
use crate::memory::mapping::{AddressMapping, Translation};

const DEFAULT_CHANNELS: usize = 8;
const DEFAULT_RANKS: usize = 1;
const DEFAULT_QUEUE_CAPACITY: usize = 32;
const DEFAULT_SCHEDULER_CAP: u64 = 16;
const DEFAULT_ROW_TIMEOUT: u64 = 50;
const DEFAULT_CPU_TICK: u64 = 4;
const DEFAULT_MEM_TICK: u64 = 1;

/// Device density grade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Organization {
    #[serde(rename = "density_1Gb", alias = "1Gb", alias = "HBM_1Gb")]
    Density1Gb,
    #[serde(rename = "density_2Gb", alias = "2Gb", alias = "HBM_2Gb")]
    Density2Gb,
    #[serde(rename = "density_4Gb", alias = "4Gb", alias = "HBM_4Gb")]
    Density4Gb,
}

/// Device speed grade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Speed {
    #[serde(rename = "1Gbps", alias = "HBM_1Gbps")]
    Speed1Gbps,
}

/// Complete simulator configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_standard")]
    pub standard: String,

    #[serde(default = "default_channels")]
    pub channels: usize,

    #[serde(default = "default_ranks")]
    pub ranks: usize,

    #[serde(default)]
    pub subarrays: usize,

    #[serde(default = "default_organization", alias = "org")]
    pub organization: Organization,

    #[serde(default = "default_speed")]
    pub speed: Speed,

    #[serde(default = "default_translation")]
    pub translation: Translation,

    #[serde(default)]
    pub translation_seed: u64,

    #[serde(default = "default_mapping")]
    pub mapping: AddressMapping,

    #[serde(default = "default_cpu_tick")]
    pub cpu_tick: u64,

    #[serde(default = "default_mem_tick")]
    pub mem_tick: u64,

    /// Trace requests simulated before statistics are reset.
    #[serde(default)]
    pub warmup_insts: u64,

    /// Trace requests after which no more are sent (0 = whole trace).
    #[serde(default)]
    pub expected_limit_insts: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_scheduler")]
    pub scheduler: SchedulerKind,

    #[serde(default = "default_scheduler_cap")]
    pub scheduler_cap: u64,

    #[serde(default = "default_row_policy")]
    pub row_policy: RowPolicyKind,

    #[serde(default = "default_row_timeout")]
    pub row_timeout: u64,

    #[serde(default = "default_high_watermark")]
    pub write_high_watermark: f64,

    #[serde(default = "default_low_watermark")]
    pub write_low_watermark: f64,

    #[serde(default = "default_refresh_mode")]
    pub refresh_mode: RefreshMode,

    /// Stop after this many memory cycles.
    #[serde(default)]
    pub cycle_limit: Option<u64>,

    /// Print every issued command to stderr.
    #[serde(default)]
    pub print_cmd_trace: bool,
}

impl Default for Config {
    /// Returns the default value.
    fn default() -> Self {
        Self {
            standard: default_standard(),
            channels: default_channels(),
            ranks: default_ranks(),
            subarrays: 0,
            organization: default_organization(),
            speed: default_speed(),
            translation: default_translation(),
            translation_seed: 0,
            mapping: default_mapping(),
            cpu_tick: default_cpu_tick(),
            mem_tick: default_mem_tick(),
            warmup_insts: 0,
            expected_limit_insts: 0,
            queue_capacity: default_queue_capacity(),
            scheduler: default_scheduler(),
            scheduler_cap: default_scheduler_cap(),
            row_policy: default_row_policy(),
            row_timeout: default_row_timeout(),
            write_high_watermark: default_high_watermark(),
            write_low_watermark: default_low_watermark(),
            refresh_mode: default_refresh_mode(),
            cycle_limit: None,
            print_cmd_trace: false,
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// Files ending in `.toml` are parsed as TOML; anything else is read as
    /// the legacy `key = value` format.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the file cannot be read, and the errors of
    /// [`Config::from_toml`] / [`Config::from_legacy`] otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "toml") {
            Self::from_toml(&text)
        } else {
            Self::from_legacy(&text)
        }
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// * [`SimError::ConfigParse`] for syntax errors, unknown keys or bad values.
    /// * [`SimError::Config`] if the parsed values are inconsistent.
    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates legacy `key = value` text.
    ///
    /// Blank lines and `#` comments are skipped. Values that are not numbers,
    /// booleans or quoted strings are taken as strings; `on`/`off` are
    /// booleans.
    ///
    /// # Errors
    ///
    /// As [`Config::from_toml`], plus [`SimError::Config`] for lines without `=`.
    pub fn from_legacy(text: &str) -> Result<Self, SimError> {
        let mut normalized = String::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SimError::Config(format!("line {}: expected `key = value`, got '{}'", n + 1, line))
            })?;
            normalized.push_str(key.trim());
            normalized.push_str(" = ");
            normalized.push_str(&legacy_value(value.trim()));
            normalized.push('\n');
        }
        Self::from_toml(&normalized)
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.standard.eq_ignore_ascii_case("HBM") {
            return Err(SimError::Config(format!(
                "unsupported standard '{}', only HBM is modeled",
                self.standard
            )));
        }
        if self.queue_capacity == 0 {
            return Err(SimError::Config("queue_capacity must be at least 1".to_string()));
        }
        for (name, mark) in [
            ("write_high_watermark", self.write_high_watermark),
            ("write_low_watermark", self.write_low_watermark),
        ] {
            if !(0.0..=1.0).contains(&mark) {
                return Err(SimError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, mark
                )));
            }
        }
        if self.mem_tick == 0 || self.cpu_tick == 0 {
            return Err(SimError::Config("cpu_tick and mem_tick must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn legacy_value(value: &str) -> String {
    let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    match value {
        "on" => "true".to_string(),
        "off" => "false".to_string(),
        "true" | "false" => value.to_string(),
        _ if quoted => value.to_string(),
        _ if value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok() => value.to_string(),
        _ => format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

fn default_standard() -> String {
    "HBM".to_string()
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

fn default_ranks() -> usize {
    DEFAULT_RANKS
}

fn default_organization() -> Organization {
    Organization::Density4Gb
}

fn default_speed() -> Speed {
    Speed::Speed1Gbps
}

fn default_translation() -> Translation {
    Translation::None
}

fn default_mapping() -> AddressMapping {
    AddressMapping::RoBaRaCoCh
}

fn default_cpu_tick() -> u64 {
    DEFAULT_CPU_TICK
}

fn default_mem_tick() -> u64 {
    DEFAULT_MEM_TICK
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_scheduler() -> SchedulerKind {
    SchedulerKind::FrFcfsCap
}

fn default_scheduler_cap() -> u64 {
    DEFAULT_SCHEDULER_CAP
}

fn default_row_policy() -> RowPolicyKind {
    RowPolicyKind::Opened
}

fn default_row_timeout() -> u64 {
    DEFAULT_ROW_TIMEOUT
}

fn default_high_watermark() -> f64 {
    0.8
}

fn default_low_watermark() -> f64 {
    0.2
}

fn default_refresh_mode() -> RefreshMode {
    RefreshMode::Rank
}
