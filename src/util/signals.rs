use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Installs SIGINT/SIGTERM handlers that raise the returned flag.
///
/// The first signal only sets the flag so the running trial is reported as
/// interrupted; a second one terminates the process with status 1.
pub fn install_interrupt_flag() -> io::Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        // order matters: the shutdown check must see the flag before it is set
        flag::register_conditional_shutdown(sig, 1, Arc::clone(&interrupted))?;
        flag::register(sig, Arc::clone(&interrupted))?;
    }
    Ok(interrupted)
}
