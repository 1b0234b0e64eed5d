//! Kill-switch capability
//!
//! An external override that halts all order admission. The mechanism
//! (file, flag, remote config) is decoupled from the policy: the risk
//! manager only asks `is_halted()` on every check.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// External halt signal queried before every admission check
pub trait KillSwitch: Send + Sync {
    fn is_halted(&self) -> bool;
}

/// Halts when a marker file exists.
///
/// Dropping a file next to the process is the lowest-tech way for an
/// operator to stop order flow without touching the process.
pub struct FileKillSwitch {
    path: PathBuf,
}

impl FileKillSwitch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KillSwitch for FileKillSwitch {
    fn is_halted(&self) -> bool {
        self.path.exists()
    }
}

/// In-process flag, used in tests and embedded setups
#[derive(Default)]
pub struct StaticKillSwitch {
    halted: AtomicBool,
}

impl StaticKillSwitch {
    pub fn new(halted: bool) -> Self {
        Self {
            halted: AtomicBool::new(halted),
        }
    }

    pub fn set_halted(&self, halted: bool) {
        self.halted.store(halted, Ordering::SeqCst);
    }
}

impl KillSwitch for StaticKillSwitch {
    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}
