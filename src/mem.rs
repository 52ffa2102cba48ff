//! Memory pressure probe. The pending-question table and the comment index are the two
//! unbounded structures of a run; both are built while streaming, so the readers back off
//! briefly when the machine is close to running out of RAM.

use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

struct Probe {
    sys: System,
    last_check: Instant,
    last_frac: f64, // available / total (0.0..1.0)
}

static PROBE: OnceLock<Mutex<Probe>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);
const BACKOFF: Duration = Duration::from_millis(25);

/// Recent estimate of the available memory fraction (0.0..1.0), refreshed at most every 500ms.
pub fn available_memory_fraction() -> f64 {
    let probe = PROBE.get_or_init(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        Mutex::new(Probe {
            sys,
            last_check: Instant::now() - REFRESH_EVERY * 2,
            last_frac: 1.0,
        })
    });
    let mut p = probe.lock();
    let now = Instant::now();
    if now.duration_since(p.last_check) >= REFRESH_EVERY {
        p.sys.refresh_memory();
        let total = p.sys.total_memory() as f64;
        let avail = p.sys.available_memory() as f64;
        p.last_frac = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
        p.last_check = now;
    }
    p.last_frac
}

pub fn is_low_memory(threshold: f64) -> bool {
    available_memory_fraction() < threshold
}

/// Sleep briefly if less than `threshold` of RAM is available.
pub fn maybe_throttle_low_memory(threshold: f64) {
    if is_low_memory(threshold) {
        std::thread::sleep(BACKOFF);
    }
}
