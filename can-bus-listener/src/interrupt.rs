//! Operator interrupt handling
//!
//! SIGINT/SIGTERM only set a flag; the receive loop polls it between
//! iterations so shutdown always runs on the loop's own thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static PROCESS_FLAG: OnceLock<InterruptFlag> = OnceLock::new();

/// Shared "stop requested" flag
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Install SIGINT and SIGTERM handlers that trigger the process-wide flag
    pub fn install() -> io::Result<Self> {
        let flag = PROCESS_FLAG.get_or_init(InterruptFlag::new).clone();

        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        for signal in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: the handler only performs an atomic store
            let previous = unsafe { libc::signal(signal, handler) };
            if previous == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(flag)
    }
}

extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(flag) = PROCESS_FLAG.get() {
        flag.trigger();
    }
}
