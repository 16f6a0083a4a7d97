//! SIGINT wiring for [`CancelFlag`].
//!
//! First Ctrl-C raises the flag so the current waiting loop can unwind with a
//! `Cancelled` error. A second Ctrl-C exits immediately with status 130, which
//! is the only way out of a blocking prompt read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Result};

use crate::retry::CancelFlag;

static INTERRUPT: OnceLock<Arc<AtomicBool>> = OnceLock::new();

const NOTICE: &[u8] = b"\ninterrupt received; finishing current step (press Ctrl-C again to abort)\n";

extern "C" fn on_sigint(_signum: libc::c_int) {
    let Some(flag) = INTERRUPT.get() else {
        unsafe { libc::_exit(130) }
    };
    if flag.swap(true, Ordering::SeqCst) {
        unsafe { libc::_exit(130) }
    }
    // write(2) is async-signal-safe; the result is irrelevant here.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            NOTICE.as_ptr() as *const libc::c_void,
            NOTICE.len(),
        );
    }
}

/// Route SIGINT into `cancel`. May only be called once per process.
pub fn install_interrupt_handler(cancel: &CancelFlag) -> Result<()> {
    if INTERRUPT.set(cancel.shared()).is_err() {
        bail!("interrupt handler already installed");
    }
    let handler = on_sigint as extern "C" fn(libc::c_int);
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        bail!(
            "installing SIGINT handler: {}",
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}
