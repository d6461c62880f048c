//! Driver configuration
use fugit::{ExtU32, MillisDurationU32};

/// Verbosity of transaction logging. Diagnostic commands are available from [DebugLevel::High].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    /// No transaction logging
    None,
    /// Commands and responses as text
    Low,
    /// Additional hex dumps, diagnostic commands enabled
    High,
    All,
}

/// Response timeouts per operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Generic command
    pub command: MillisDurationU32,

    /// Waiting for `ready` after restart
    pub reset: MillisDurationU32,

    /// Joining an access point
    pub join: MillisDurationU32,

    /// TCP client connect
    pub connect: MillisDurationU32,

    /// Reachability probe
    pub ping: MillisDurationU32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: 1_000.millis(),
            reset: 5_000.millis(),
            join: 30_000.millis(),
            connect: 5_000.millis(),
            ping: 3_000.millis(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub debug_level: DebugLevel,

    pub timeouts: Timeouts,

    /// Time the reset line is held low
    pub reset_hold: MillisDurationU32,

    /// Delay after the module signaled `ready`
    pub restart_settle: MillisDurationU32,

    /// Read timeout for draining residual bytes after a hardware reset
    pub drain_timeout: MillisDurationU32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_level: DebugLevel::Low,
            timeouts: Timeouts::default(),
            reset_hold: 1_000.millis(),
            restart_settle: 2_000.millis(),
            drain_timeout: 1_000.millis(),
        }
    }
}

impl Config {
    /// True if diagnostic commands (version, echo, baud, mode/AP query, ping) may be used
    pub fn diagnostics_enabled(&self) -> bool {
        self.debug_level >= DebugLevel::High
    }
}
