//! Phase timings and process CPU time.

use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

/// Total CPU time (user + system) consumed by the current process.
///
/// Returns `Duration::ZERO` if the platform is not supported or the call fails.
pub fn cpu_time() -> Duration {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
        // SAFETY: `usage.as_mut_ptr()` points to writable storage for one
        // `libc::rusage` and `RUSAGE_SELF` is a valid target.
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) } == 0 {
            // SAFETY: `getrusage` returned 0, so `usage` is initialized.
            let usage = unsafe { usage.assume_init() };
            let secs = usage.ru_utime.tv_sec as u64 + usage.ru_stime.tv_sec as u64;
            let micros = usage.ru_utime.tv_usec as u64 + usage.ru_stime.tv_usec as u64;
            Duration::from_secs(secs) + Duration::from_micros(micros)
        } else {
            tracing::warn!("getrusage failed, CPU time unavailable");
            Duration::ZERO
        }
    }
    #[cfg(not(unix))]
    {
        Duration::ZERO
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Wall time per build phase, in milliseconds when serialized.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseTimings {
    #[serde(serialize_with = "as_millis")]
    pub load: Duration,
    #[serde(serialize_with = "as_millis")]
    pub build: Duration,
    #[serde(serialize_with = "as_millis")]
    pub rebalance: Duration,
    #[serde(serialize_with = "as_millis")]
    pub refine: Duration,
    #[serde(serialize_with = "as_millis")]
    pub persist: Duration,
    /// CPU time of the whole run.
    #[serde(serialize_with = "as_millis")]
    pub cpu: Duration,
}

impl PhaseTimings {
    /// Sum of the phase wall times.
    pub fn total(&self) -> Duration {
        self.load + self.build + self.rebalance + self.refine + self.persist
    }
}

/// Runs `f`, adding its wall time to `slot`.
pub fn timed<T>(slot: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    *slot += start.elapsed();
    out
}
