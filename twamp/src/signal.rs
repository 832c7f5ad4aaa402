//! SIGINT handling: a process-wide flag flipped from signal context, bridged
//! onto whichever component's `running: Arc<AtomicBool>` the CLI constructed
//! (§5's "Cancellation").
//!
//! A signal handler cannot safely touch an `Arc` (allocation, atomics with
//! anything beyond relaxed ordering, and locking are all off-limits inside a
//! handler), so it only ever sets a single `static AtomicBool`. A small watcher
//! thread polls that static and propagates it to the real `running` flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

extern "C" fn handle_sigint(_signum: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Installs the process-wide `SIGINT` handler. Call once from `main`.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }
}

/// Spawns a background thread that flips `running` to `false` as soon as
/// `SIGINT` arrives, so a blocking component's poll loop (reflector, sender)
/// observes it on its next timeout tick.
pub fn watch(running: Arc<AtomicBool>) {
    std::thread::spawn(move || loop {
        if SIGINT_RECEIVED.load(Ordering::SeqCst) {
            running.store(false, Ordering::SeqCst);
            return;
        }
        if !running.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(WATCH_POLL_INTERVAL);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_stops_on_its_own_once_running_is_already_false() {
        let running = Arc::new(AtomicBool::new(false));
        watch(running.clone());
        std::thread::sleep(Duration::from_millis(200));
        assert!(!running.load(Ordering::SeqCst));
    }
}
