//! HBM Protocol Enumerations.
//!
//! Levels of the device hierarchy, the DRAM command set and the FSM states a
//! node can be in. Command classifications are fixed by the protocol and do
//! not depend on organization or speed.

use std::fmt;

/// Level of the device hierarchy, outermost first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Channel = 0,
    Rank = 1,
    BankGroup = 2,
    Bank = 3,
    Row = 4,
    Column = 5,
}

impl Level {
    /// Number of levels.
    pub const COUNT: usize = 6;

    /// All levels in hierarchy order.
    pub const ALL: [Level; Level::COUNT] = [
        Level::Channel,
        Level::Rank,
        Level::BankGroup,
        Level::Bank,
        Level::Row,
        Level::Column,
    ];

    /// Position of the level in an address vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The next level down, if any.
    pub fn child(self) -> Option<Level> {
        Level::ALL.get(self.index() + 1).copied()
    }

    /// Lower-case level name.
    pub fn name(self) -> &'static str {
        match self {
            Level::Channel => "channel",
            Level::Rank => "rank",
            Level::BankGroup => "bankgroup",
            Level::Bank => "bank",
            Level::Row => "row",
            Level::Column => "column",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HBM command set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    /// Activate (open a row).
    Act = 0,
    /// Precharge one bank.
    Pre = 1,
    /// Precharge all banks of a rank.
    PreA = 2,
    /// Read.
    Rd = 3,
    /// Read with auto-precharge.
    RdA = 4,
    /// Write.
    Wr = 5,
    /// Write with auto-precharge.
    WrA = 6,
    /// Rank refresh.
    Ref = 7,
    /// Single-bank refresh.
    RefSb = 8,
    /// Power-down entry.
    Pde = 9,
    /// Power-down exit.
    Pdx = 10,
    /// Self-refresh entry.
    Sre = 11,
    /// Self-refresh exit.
    Srx = 12,
}

impl Command {
    /// Number of commands.
    pub const COUNT: usize = 13;

    /// All commands in table order.
    pub const ALL: [Command; Command::COUNT] = [
        Command::Act,
        Command::Pre,
        Command::PreA,
        Command::Rd,
        Command::RdA,
        Command::Wr,
        Command::WrA,
        Command::Ref,
        Command::RefSb,
        Command::Pde,
        Command::Pdx,
        Command::Sre,
        Command::Srx,
    ];

    /// Table index of the command.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Mnemonic as printed in command traces.
    pub fn name(self) -> &'static str {
        match self {
            Command::Act => "ACT",
            Command::Pre => "PRE",
            Command::PreA => "PREA",
            Command::Rd => "RD",
            Command::RdA => "RDA",
            Command::Wr => "WR",
            Command::WrA => "WRA",
            Command::Ref => "REF",
            Command::RefSb => "REFSB",
            Command::Pde => "PDE",
            Command::Pdx => "PDX",
            Command::Sre => "SRE",
            Command::Srx => "SRX",
        }
    }

    /// Opens a row.
    pub fn is_opening(self) -> bool {
        matches!(self, Command::Act)
    }

    /// Transfers column data.
    pub fn is_accessing(self) -> bool {
        matches!(
            self,
            Command::Rd | Command::Wr | Command::RdA | Command::WrA
        )
    }

    /// Closes one or more rows.
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            Command::Pre | Command::PreA | Command::RdA | Command::WrA
        )
    }

    /// Refreshes cells.
    pub fn is_refreshing(self) -> bool {
        matches!(self, Command::Ref | Command::RefSb)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// FSM state of a rank or bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Rank powered up and idle.
    PowerUp,
    /// Bank precharged.
    Closed,
    /// Bank has an open row.
    Opened,
    /// Rank in power-down with at least one open bank.
    ActPowerDown,
    /// Rank in power-down with all banks precharged.
    PrePowerDown,
    /// Rank in self-refresh.
    SelfRefresh,
}
