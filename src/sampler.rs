//! # Resource Sampler
//!
//! Tracks peak CPU utilization and peak resident memory of the benchmark
//! process while a trial runs. Sampling happens on a dedicated thread at a
//! fixed cadence; the thread is stopped and joined when the sampler is
//! stopped or dropped, so a trial that bails out early never leaks it.
//!
//! CPU utilization for an interval is
//!
//! ```text
//! cpu% = ΔcpuTime / ΔwallTime / cores × 100
//! ```
//!
//! Probe failures are ignored. A missing reading never aborts a trial, it
//! only leaves the peaks where they were.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use nix::time::{clock_gettime, ClockId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

/// Source of process-level readings.
pub trait ProcessProbe: Send + 'static {
    /// Total CPU time consumed by the process so far.
    fn cpu_time(&mut self) -> Option<Duration>;

    /// Current resident set size in bytes.
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Reads the current process through the OS.
pub struct SystemProbe {
    sys: System,
    pid: Pid,
}

impl SystemProbe {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory());
        Self {
            sys: System::new_with_specifics(refresh),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn cpu_time(&mut self) -> Option<Duration> {
        let ts = clock_gettime(ClockId::CLOCK_PROCESS_CPUTIME_ID).ok()?;
        Some(Duration::new(ts.tv_sec() as u64, ts.tv_nsec() as u32))
    }

    fn resident_bytes(&mut self) -> Option<u64> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        // sysinfo reports bytes on every platform since 0.30.
        self.sys.process(self.pid).map(|p| p.memory())
    }
}

#[derive(Debug)]
struct SamplerState {
    last_cpu: Option<Duration>,
    last_wall: Instant,
    peak_cpu_percent: f64,
    peak_memory_bytes: u64,
    ticks: u64,
}

impl SamplerState {
    fn observe<P: ProcessProbe>(&mut self, probe: &mut P, cores: usize) {
        let now = Instant::now();
        let cpu = probe.cpu_time();

        if let (Some(cpu), Some(last)) = (cpu, self.last_cpu) {
            let wall = now.duration_since(self.last_wall);
            if wall >= Duration::from_millis(1) {
                let busy = cpu.saturating_sub(last).as_secs_f64();
                let percent = busy / wall.as_secs_f64() / cores as f64 * 100.0;
                let percent = percent.clamp(0.0, 100.0 * cores as f64);
                if percent > self.peak_cpu_percent {
                    self.peak_cpu_percent = percent;
                }
            }
        }
        if cpu.is_some() {
            self.last_cpu = cpu;
            self.last_wall = now;
        }

        if let Some(rss) = probe.resident_bytes() {
            self.peak_memory_bytes = self.peak_memory_bytes.max(rss);
        }
        self.ticks += 1;
    }
}

/// Background peak tracker scoped to one trial.
pub struct ResourceSampler {
    state: Arc<Mutex<SamplerState>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ResourceSampler {
    /// Start sampling the current process.
    pub fn start(interval: Duration) -> Self {
        Self::start_with_probe(SystemProbe::new(), interval, num_cpus::get())
    }

    /// Start sampling through `probe`. The first reading is taken before this
    /// returns; another one is taken when the sampler stops.
    pub fn start_with_probe<P: ProcessProbe>(mut probe: P, interval: Duration, cores: usize) -> Self {
        let cores = cores.max(1);
        let mut initial = SamplerState {
            last_cpu: None,
            last_wall: Instant::now(),
            peak_cpu_percent: 0.0,
            peak_memory_bytes: 0,
            ticks: 0,
        };
        initial.observe(&mut probe, cores);

        let state = Arc::new(Mutex::new(initial));
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("resource-sampler".to_string())
            .spawn(move || loop {
                let stopping = match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => false,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                };
                thread_state.lock().observe(&mut probe, cores);
                if stopping {
                    break;
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                debug!("resource sampler thread failed to start: {}", e);
                None
            }
        };

        Self {
            state,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub fn peak_cpu_percent(&self) -> f64 {
        self.state.lock().peak_cpu_percent
    }

    pub fn peak_memory_bytes(&self) -> u64 {
        self.state.lock().peak_memory_bytes
    }

    /// Number of readings taken so far.
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Take a final reading and join the sampling thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Reports CPU time advancing at a fixed multiple of wall time.
    struct FakeProbe {
        started: Instant,
        busy_factor: f64,
        rss: Arc<AtomicU64>,
    }

    impl ProcessProbe for FakeProbe {
        fn cpu_time(&mut self) -> Option<Duration> {
            Some(self.started.elapsed().mul_f64(self.busy_factor))
        }

        fn resident_bytes(&mut self) -> Option<u64> {
            Some(self.rss.load(Ordering::Relaxed))
        }
    }

    struct FailingProbe;

    impl ProcessProbe for FailingProbe {
        fn cpu_time(&mut self) -> Option<Duration> {
            None
        }

        fn resident_bytes(&mut self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn tracks_peaks_across_ticks() {
        let rss = Arc::new(AtomicU64::new(10 * 1024 * 1024));
        let probe = FakeProbe {
            started: Instant::now(),
            busy_factor: 2.0,
            rss: Arc::clone(&rss),
        };

        let mut sampler = ResourceSampler::start_with_probe(probe, Duration::from_millis(10), 4);
        thread::sleep(Duration::from_millis(40));
        rss.store(64 * 1024 * 1024, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(40));
        rss.store(32 * 1024 * 1024, Ordering::Relaxed);
        sampler.stop();

        assert_eq!(sampler.peak_memory_bytes(), 64 * 1024 * 1024);
        // Two busy cores out of four.
        let cpu = sampler.peak_cpu_percent();
        assert!(cpu > 30.0 && cpu <= 400.0, "cpu = {}", cpu);
        assert!(sampler.ticks() >= 3);
    }

    #[test]
    fn short_lived_sampler_still_takes_start_and_stop_readings() {
        let probe = FakeProbe {
            started: Instant::now(),
            busy_factor: 1.0,
            rss: Arc::new(AtomicU64::new(4096)),
        };
        let mut sampler = ResourceSampler::start_with_probe(probe, Duration::from_secs(60), 1);
        sampler.stop();
        sampler.stop();
        assert!(sampler.ticks() >= 2);
        assert_eq!(sampler.peak_memory_bytes(), 4096);
    }

    #[test]
    fn probe_failures_are_swallowed() {
        let sampler = ResourceSampler::start_with_probe(FailingProbe, Duration::from_millis(5), 2);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sampler.peak_cpu_percent(), 0.0);
        assert_eq!(sampler.peak_memory_bytes(), 0);
        drop(sampler);
    }

    #[test]
    fn system_probe_reads_this_process() {
        let mut probe = SystemProbe::new();
        assert!(probe.cpu_time().is_some());
        assert!(probe.resident_bytes().unwrap_or(0) > 0);
    }
}
