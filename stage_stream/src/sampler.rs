//! Deadline-driven position sampler.
//!
//! A single loop on a dedicated thread. Each tick stamps the monotonic
//! clock, reads every connected axis, marks per-axis validity and pushes
//! the record onto the sample ring; a full ring costs one drop count, never
//! a stall. Deadlines advance by exactly one interval per tick
//! (`previous + interval`), so wall-clock jitter in any one tick never
//! shifts the grid.
//!
//! The wait is hybrid: coarse sleep until ~50 µs before the deadline, then
//! busy-yield across the final window. That bounds scheduler wake-up jitter
//! without burning a full core.
//!
//! SCHED_FIFO priority and CPU pinning are attempted on Linux at thread
//! start; either failing is a warning, not fatal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use stage_common::sample::PositionSample;
use stage_hal::controllers::ControllerTable;
use stage_hal::topology::TopologyMap;

use crate::ring::Producer;
use crate::status::SharedState;

/// Busy-yield window at the end of the hybrid wait.
const BUSY_WINDOW: Duration = Duration::from_micros(50);

/// Below this remaining time the wait skips the coarse sleep entirely.
const MIN_SLEEP: Duration = Duration::from_micros(100);

/// The sampling loop and its wiring.
pub struct Sampler {
    shared: Arc<SharedState>,
    table: Arc<ControllerTable>,
    topology: Arc<TopologyMap>,
    producer: Producer,
    cpu_core: Option<usize>,
    rt_priority: i32,
}

impl Sampler {
    pub fn new(
        shared: Arc<SharedState>,
        table: Arc<ControllerTable>,
        topology: Arc<TopologyMap>,
        producer: Producer,
        cpu_core: Option<usize>,
        rt_priority: i32,
    ) -> Self {
        Self {
            shared,
            table,
            topology,
            producer,
            cpu_core,
            rt_priority,
        }
    }

    /// Thread entry point. Returns when the running flag clears.
    pub fn run(mut self) {
        apply_rt_priority(self.rt_priority);
        if let Some(cpu) = self.cpu_core {
            apply_cpu_affinity(cpu);
        }

        info!(
            "sampler started at {} Hz",
            self.shared.sample_rate_hz()
        );

        let mut next_deadline = Instant::now();
        while self.shared.is_running() {
            // Reload the interval every tick so SET_RATE takes effect on
            // the tick after its result is published.
            let interval = Duration::from_nanos(self.shared.sample_interval_ns());
            next_deadline += interval;

            let sample = self.capture();
            if self.producer.try_push(sample) {
                self.shared.add_captured(1);
            } else {
                self.shared.add_dropped(1);
            }

            hybrid_wait(next_deadline);
        }

        info!(
            "sampler stopped: captured={}, dropped={}",
            self.shared.captured(),
            self.shared.dropped()
        );
    }

    /// Read all connected axes into one record. Per-axis read errors leave
    /// the validity bit clear and are otherwise absorbed.
    fn capture(&self) -> PositionSample {
        let mut sample = PositionSample::at(self.shared.now_ns());
        for (axis, slot, axis_index) in self.topology.iter_connected() {
            if let Ok(position) = self.table.read_position(slot, axis_index) {
                sample.record(axis, position);
            }
        }
        sample
    }
}

/// Sleep until shortly before `deadline`, then busy-yield to it.
fn hybrid_wait(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        // Already late; the next deadline still advances by one interval.
        return;
    }
    let remaining = deadline - now;
    if remaining > MIN_SLEEP {
        std::thread::sleep(remaining - BUSY_WINDOW);
    }
    while Instant::now() < deadline {
        std::thread::yield_now();
    }
}

/// Request SCHED_FIFO at the given priority for the calling thread.
#[cfg(target_os = "linux")]
fn apply_rt_priority(priority: i32) {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret == 0 {
        info!("sampler running with SCHED_FIFO priority {priority}");
    } else {
        warn!(
            "could not enable SCHED_FIFO (priority {priority}): {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_rt_priority(_priority: i32) {
    warn!("real-time scheduling not available on this platform");
}

/// Pin the calling thread to one CPU core.
#[cfg(target_os = "linux")]
fn apply_cpu_affinity(cpu: usize) {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    let pinned = cpuset
        .set(cpu)
        .and_then(|()| sched_setaffinity(Pid::from_raw(0), &cpuset));
    match pinned {
        Ok(()) => info!("sampler pinned to CPU {cpu}"),
        Err(e) => warn!("could not pin sampler to CPU {cpu}: {e}"),
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_cpu_affinity(cpu: usize) {
    warn!("CPU pinning not available on this platform (requested core {cpu})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::sample_ring;
    use stage_common::axis::AxisId;
    use stage_hal::sim::{SimAxis, SimBackend, SimController};

    fn fixture(backend: SimBackend) -> Sampler {
        let table = Arc::new(ControllerTable::initialize(&backend).unwrap());
        let topology = Arc::new(TopologyMap::build(&table, 4, 2222));
        let shared = Arc::new(SharedState::new(1000));
        let (producer, _consumer) = sample_ring(8);
        Sampler::new(shared, table, topology, producer, None, 50)
    }

    #[test]
    fn capture_marks_all_connected_axes_valid() {
        let sampler = fixture(SimBackend::default_stage());
        let sample = sampler.capture();
        assert_eq!(sample.valid_mask, 0b1111);
    }

    #[test]
    fn failed_read_leaves_bit_clear() {
        // Y lives on axis index 0 of the XYZ controller.
        let backend = SimBackend::new(vec![
            SimController::new(4)
                .with_axis(0, SimAxis::linear("ECSx5050").failing_reads())
                .with_axis(1, SimAxis::linear("ECSx5050"))
                .with_axis(2, SimAxis::linear("ECSx3030")),
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
        ]);
        let sampler = fixture(backend);
        let sample = sampler.capture();
        assert_eq!(sample.position(AxisId::Y), None);
        assert!(sample.position(AxisId::X).is_some());
        assert!(sample.position(AxisId::Z).is_some());
        assert!(sample.position(AxisId::R).is_some());
    }

    #[test]
    fn absent_topology_yields_empty_mask() {
        // No controller matches the configured ids.
        let backend = SimBackend::new(vec![
            SimController::new(77).with_axis(0, SimAxis::linear("ECSx5050")),
        ]);
        let sampler = fixture(backend);
        let sample = sampler.capture();
        assert_eq!(sample.valid_mask, 0);
    }

    #[test]
    fn hybrid_wait_reaches_the_deadline() {
        let deadline = Instant::now() + Duration::from_millis(2);
        hybrid_wait(deadline);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn hybrid_wait_returns_immediately_when_late() {
        let deadline = Instant::now() - Duration::from_millis(5);
        let start = Instant::now();
        hybrid_wait(deadline);
        assert!(start.elapsed() < Duration::from_millis(2));
    }
}
