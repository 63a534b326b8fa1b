use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mtl_wire::{FRAME_LEN, MESSAGE_DATA_LENGTH};

use crate::directory::Directory;
use crate::shutdown::{StopFlag, sleep_until_or_stop};

#[derive(Default)]
pub struct MetricsCounters {
    forwarded: AtomicU64,
}

impl MetricsCounters {
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    fn take_forwarded(&self) -> u64 {
        self.forwarded.swap(0, Ordering::Relaxed)
    }
}

/// One row of the periodic log: `<elapsed_ms> <messages_sent_in_interval>
/// <cpu_fraction> <connected_peer_count>`, per the original spec's log file
/// format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed_ms: u128,
    pub messages_sent: u64,
    pub cpu_fraction: f64,
    pub connected_peers: usize,
}

/// Runs the periodic sampler until `stop` is set, writing one CSV-like line
/// per second to `path`. Armed only when a log file was given on the CLI.
pub fn run(
    path: &Path,
    directory: &Directory,
    counters: &Arc<MetricsCounters>,
    stop: &StopFlag,
) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{FRAME_LEN} {MESSAGE_DATA_LENGTH}")?;
    file.flush()?;

    let start = Instant::now();
    let mut target = Instant::now();
    let mut cpu = CpuSampler::new();

    loop {
        target += Duration::from_secs(1);
        if !sleep_until_or_stop(target, stop) {
            break;
        }
        let sample = Sample {
            elapsed_ms: start.elapsed().as_millis(),
            messages_sent: counters.take_forwarded(),
            cpu_fraction: cpu.sample(),
            connected_peers: directory.len(),
        };
        write_sample(&mut file, &sample)?;
    }
    Ok(())
}

fn write_sample(file: &mut File, sample: &Sample) -> io::Result<()> {
    writeln!(
        file,
        "{} {} {:.3} {}",
        sample.elapsed_ms, sample.messages_sent, sample.cpu_fraction, sample.connected_peers
    )?;
    file.flush()
}

/// Approximates the broker process's CPU fraction between successive
/// samples from `/proc/self/stat` utime+stime deltas. Reads `0.0` where
/// `/proc` is unavailable, e.g. non-Linux targets.
struct CpuSampler {
    last_wall: Instant,
    last_ticks: u64,
    ticks_per_sec: f64,
}

impl CpuSampler {
    fn new() -> Self {
        Self {
            last_wall: Instant::now(),
            last_ticks: read_cpu_ticks().unwrap_or(0),
            ticks_per_sec: clock_ticks_per_sec(),
        }
    }

    fn sample(&mut self) -> f64 {
        let now = Instant::now();
        let Some(ticks) = read_cpu_ticks() else {
            self.last_wall = now;
            return 0.0;
        };
        let wall_dt = now.duration_since(self.last_wall).as_secs_f64();
        let cpu_dt = ticks.saturating_sub(self.last_ticks) as f64 / self.ticks_per_sec;
        self.last_wall = now;
        self.last_ticks = ticks;
        if wall_dt <= 0.0 { 0.0 } else { (cpu_dt / wall_dt).clamp(0.0, 1.0) }
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_ticks() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // Fields after ')' start at overall field 3 (state); utime is overall
    // field 14, stime is field 15, i.e. indices 11 and 12 here.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_ticks() -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn clock_ticks_per_sec() -> f64 {
    // SAFETY: sysconf with a well-known, always-valid name never fails in a
    // way that invalidates memory; it returns -1 on error which we guard.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as f64 } else { 100.0 }
}

#[cfg(not(target_os = "linux"))]
fn clock_ticks_per_sec() -> f64 {
    100.0
}
