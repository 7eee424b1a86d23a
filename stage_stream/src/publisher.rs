//! Batch position publisher.
//!
//! Runs two orders of magnitude slower than the sampler: each batch period
//! it drains up to `batch_max` records from the ring, formats them into one
//! newline-separated payload and publishes a single QoS 0 message on the
//! position topic. Batching collapses per-sample broker overhead; QoS 0 is
//! enough because a missing sample out of thousands per second is
//! immaterial and retransmission would fight the real-time pacing.
//!
//! Each sample is formatted into a fixed-capacity line buffer and appended
//! to a payload string whose capacity is reserved once, so steady-state
//! publication does not allocate per sample.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use stage_common::sample::PositionSample;
use stage_common::wire::{write_position_line, LineBuf, MAX_LINE_LEN};

use crate::bus::BusClient;
use crate::ring::Consumer;
use crate::status::SharedState;

/// The batch publishing loop and its wiring.
pub struct Publisher {
    shared: Arc<SharedState>,
    consumer: Consumer,
    bus: BusClient,
    batch_max: usize,
    batch_interval: Duration,
}

impl Publisher {
    pub fn new(
        shared: Arc<SharedState>,
        consumer: Consumer,
        bus: BusClient,
        batch_max: usize,
        batch_interval: Duration,
    ) -> Self {
        Self {
            shared,
            consumer,
            bus,
            batch_max,
            batch_interval,
        }
    }

    /// Thread entry point. Returns when the running flag clears.
    pub fn run(mut self) {
        let mut batch: Vec<PositionSample> = Vec::with_capacity(self.batch_max);
        let mut payload = String::with_capacity(self.batch_max * (MAX_LINE_LEN + 1));
        let mut next_flush = Instant::now() + self.batch_interval;
        let mut batches = 0u64;

        while self.shared.is_running() {
            while batch.len() < self.batch_max {
                match self.consumer.try_pop() {
                    Some(sample) => batch.push(sample),
                    None => break,
                }
            }

            if !batch.is_empty() {
                format_batch(&batch, &mut payload);
                match self.bus.publish_position(&payload) {
                    Ok(()) => {
                        self.shared.add_published(batch.len() as u64);
                        batches += 1;
                        if batches % 50 == 0 {
                            debug!(
                                "published batch {batches} (total {} samples)",
                                self.shared.published()
                            );
                        }
                    }
                    // Telemetry, not history: a failed batch is discarded.
                    Err(e) => warn!("position batch dropped: {e}"),
                }
                batch.clear();
            }

            sleep_until(next_flush);
            next_flush += self.batch_interval;
        }

        debug!("publisher stopped: published={}", self.shared.published());
    }
}

/// Format a batch as newline-separated position lines into `payload`.
///
/// The previous payload content is replaced; capacity is retained.
pub fn format_batch(samples: &[PositionSample], payload: &mut String) {
    payload.clear();
    let mut line = LineBuf::new();
    for (i, sample) in samples.iter().enumerate() {
        line.clear();
        // A line always fits: LineBuf capacity exceeds the worst case.
        if write_position_line(sample, &mut line).is_ok() {
            if i > 0 {
                payload.push('\n');
            }
            payload.push_str(&line);
        }
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_common::axis::AxisId;

    #[test]
    fn batch_joins_lines_with_newlines() {
        let mut a = PositionSample::at(100);
        a.record(AxisId::X, 1);
        a.record(AxisId::Y, 2);
        a.record(AxisId::Z, 3);
        a.record(AxisId::R, 4);
        let mut b = PositionSample::at(200);
        b.record(AxisId::X, 5);

        let mut payload = String::new();
        format_batch(&[a, b], &mut payload);
        assert_eq!(payload, "100/1/2/3/4\n200/5/NaN/NaN/NaN");
    }

    #[test]
    fn single_sample_has_no_separator() {
        let s = PositionSample::at(1);
        let mut payload = String::new();
        format_batch(&[s], &mut payload);
        assert_eq!(payload, "1/NaN/NaN/NaN/NaN");
    }

    #[test]
    fn formatting_replaces_previous_payload() {
        let mut payload = String::from("stale");
        format_batch(&[PositionSample::at(9)], &mut payload);
        assert_eq!(payload, "9/NaN/NaN/NaN/NaN");

        format_batch(&[], &mut payload);
        assert!(payload.is_empty());
    }
}
