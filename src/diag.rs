// Diagnostics go to stderr through atomic-dbg, which formats into a fixed buffer instead of
// allocating. Anything printed in the middle of a run must not touch the allocator we are timing.

use std::sync::atomic::{AtomicBool, Ordering};

#[doc(hidden)]
pub use atomic_dbg;

/// An on/off switch for verbose diagnostics.
pub struct Verbosity(AtomicBool);

impl Verbosity {
    pub const fn new(on: bool) -> Self {
        Self(AtomicBool::new(on))
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

static VERBOSE: Verbosity = Verbosity::new(false);

pub fn set_verbose(on: bool) {
    VERBOSE.set(on);
}

pub fn verbose() -> bool {
    VERBOSE.get()
}

/// Prints to stderr only when `--verbose` was given.
#[macro_export]
macro_rules! diag_info {
    ($($arg:tt)*) => {
        if $crate::diag::verbose() {
            $crate::diag::atomic_dbg::eprintln!("allocbench: {}", format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! diag_warn {
    ($($arg:tt)*) => {
        $crate::diag::atomic_dbg::eprintln!("allocbench: warning: {}", format_args!($($arg)*));
    };
}
