// src/profiler.rs
//
// Resource measurement around a single task execution:
//   wall time   monotonic clock delta
//   CPU time    user + system time of the calling thread (getrusage)
//   peak memory max resident set size seen by a sampler thread
//
// Each measurement wraps its own invocation of the closure.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::constants::{BYTES_PER_MIB, DEFAULT_SAMPLE_INTERVAL};
use crate::error::{BenchError, Result};

/// Run `f` and return its output with elapsed wall time in seconds
pub fn measure_wall_time<T>(f: impl FnOnce() -> Result<T>) -> Result<(T, f64)> {
    let start = Instant::now();
    let out = f()?;
    Ok((out, start.elapsed().as_secs_f64()))
}

/// Run `f` and return its output with the CPU seconds the current thread spent in it
pub fn measure_cpu_time<T>(f: impl FnOnce() -> Result<T>) -> Result<(T, f64)> {
    let before = thread_cpu_time()?;
    let out = f()?;
    let after = thread_cpu_time()?;
    Ok((out, after.saturating_sub(before).as_secs_f64()))
}

/// User + system CPU time consumed so far by the calling thread.
/// Falls back to whole-process usage where per-thread accounting is unavailable.
pub fn thread_cpu_time() -> Result<Duration> {
    #[cfg(target_os = "linux")]
    let who = libc::RUSAGE_THREAD;
    #[cfg(not(target_os = "linux"))]
    let who = libc::RUSAGE_SELF;

    // SAFETY: rusage is plain old data and getrusage only writes into it
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(who, &mut usage) };
    if rc != 0 {
        return Err(BenchError::Profiler(format!(
            "getrusage failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let tv = |t: libc::timeval| Duration::from_secs(t.tv_sec as u64) + Duration::from_micros(t.tv_usec as u64);
    Ok(tv(usage.ru_utime) + tv(usage.ru_stime))
}

/// Current resident set size of the process in bytes
pub fn resident_bytes() -> Result<usize> {
    memory_stats::memory_stats()
        .map(|usage| usage.physical_mem)
        .ok_or_else(|| BenchError::Profiler("resident memory not available on this platform".to_string()))
}

/// Peak memory sampler
#[derive(Debug, Clone)]
pub struct Profiler {
    sample_interval: Duration,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl Profiler {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Run `f` while a background thread samples resident memory.
    /// Returns the output and the peak in MiB, including one sample taken
    /// immediately before and one immediately after `f`.
    pub fn measure_peak_memory<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<(T, f64)> {
        let before = resident_bytes()?;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = self.sample_interval;
        let sampler = thread::Builder::new()
            .name("chunkbench-mem-sampler".to_string())
            .spawn(move || {
                let mut peak = 0usize;
                let mut samples = 0u64;
                loop {
                    if let Some(usage) = memory_stats::memory_stats() {
                        peak = peak.max(usage.physical_mem);
                        samples += 1;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                (peak, samples)
            })
            .map_err(|e| BenchError::Profiler(format!("cannot start memory sampler: {}", e)))?;

        let out = f();
        let after = resident_bytes();

        // Stop the sampler even when f failed
        let _ = stop_tx.send(());
        let (sampled, samples) = sampler
            .join()
            .map_err(|_| BenchError::Profiler("memory sampler panicked".to_string()))?;

        let value = out?;
        let peak = before.max(after?).max(sampled);
        trace!("Peak memory {} bytes over {} samples", peak, samples);
        Ok((value, peak as f64 / BYTES_PER_MIB))
    }
}
