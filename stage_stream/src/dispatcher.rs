//! Command dispatcher.
//!
//! Single-threaded consumer of a bounded FIFO fed by the bus callback.
//! Commands are operator input, not telemetry: on overflow the FIFO drops
//! the *oldest* entry and the drop is counted. Every payload — parseable or
//! not — produces exactly one result message on the result topic, and
//! results leave in arrival order.
//!
//! All device calls issued here run on the dispatcher thread and never
//! block the sampler beyond the per-handle lock of the single call.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use stage_common::axis::AxisId;
use stage_common::command::{Command, CommandParseError};
use stage_common::consts::{MAX_SAMPLE_RATE_HZ, MIN_SAMPLE_RATE_HZ};
use stage_common::wire::{Channel, Outcome, ResultMessage, Scope};
use stage_hal::controllers::ControllerTable;
use stage_hal::driver::AXES_PER_CONTROLLER;
use stage_hal::topology::TopologyMap;

use crate::bus::BusClient;
use crate::ring::RingDepth;
use crate::status::SharedState;

/// How long one FIFO wait may block before the loop rechecks the running
/// flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One raw command payload as delivered by the bus.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Arrival time [ns since process-start epoch].
    pub received_ns: u64,
}

/// Bounded multi-producer FIFO between the bus callback and the dispatcher.
///
/// Mutex-protected with short critical sections; arrival order is
/// preserved, which carries the per-axis command ordering guarantee.
pub struct CommandFifo {
    capacity: usize,
    queue: Mutex<VecDeque<CommandRecord>>,
    ready: Condvar,
}

impl CommandFifo {
    /// Create a FIFO bounded at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
        }
    }

    /// Append a record. Returns `true` when the FIFO was full and the
    /// oldest entry was evicted to make room.
    pub fn push(&self, record: CommandRecord) -> bool {
        let mut queue = self.queue.lock().expect("command fifo lock poisoned");
        let evicted = if queue.len() == self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(record);
        drop(queue);
        self.ready.notify_one();
        evicted
    }

    /// Dequeue the oldest record, waiting up to `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<CommandRecord> {
        let mut queue = self.queue.lock().expect("command fifo lock poisoned");
        if queue.is_empty() {
            let (guard, _timed_out) = self
                .ready
                .wait_timeout(queue, timeout)
                .expect("command fifo lock poisoned");
            queue = guard;
        }
        queue.pop_front()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("command fifo lock poisoned").len()
    }

    /// True when no record is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The dispatch loop and its wiring.
pub struct Dispatcher {
    shared: Arc<SharedState>,
    table: Arc<ControllerTable>,
    topology: Arc<TopologyMap>,
    fifo: Arc<CommandFifo>,
    ring_depth: RingDepth,
}

impl Dispatcher {
    pub fn new(
        shared: Arc<SharedState>,
        table: Arc<ControllerTable>,
        topology: Arc<TopologyMap>,
        fifo: Arc<CommandFifo>,
        ring_depth: RingDepth,
    ) -> Self {
        Self {
            shared,
            table,
            topology,
            fifo,
            ring_depth,
        }
    }

    /// Thread entry point. Returns when the running flag clears.
    pub fn run(self, bus: BusClient) {
        while self.shared.is_running() {
            let Some(record) = self.fifo.pop_timeout(POLL_INTERVAL) else {
                continue;
            };
            debug!(
                "command received ({} bytes, t={} ns)",
                record.payload.len(),
                record.received_ns
            );
            let result = self.handle_payload(&record.payload);
            if let Err(e) = bus.publish_result(&result.encode()) {
                warn!("failed to publish result for {}: {e}", result.subject);
            }
        }
        debug!("dispatcher stopped");
    }

    /// Parse and execute one raw payload, producing exactly one result.
    pub fn handle_payload(&self, payload: &[u8]) -> ResultMessage {
        let Ok(text) = std::str::from_utf8(payload) else {
            return self.result(
                Channel::Error,
                "UNKNOWN",
                Scope::System,
                Outcome::Failed,
                "Invalid command payload".to_string(),
            );
        };

        match Command::parse(text.trim_end_matches(['\r', '\n'])) {
            Ok(command) => self.execute(command),
            Err(e @ CommandParseError::UnknownCommand(_)) => self.result(
                Channel::Error,
                e.subject(),
                Scope::System,
                Outcome::Failed,
                e.to_string(),
            ),
            Err(e) => self.result(
                Channel::Command,
                e.subject(),
                Scope::All,
                Outcome::Failed,
                e.to_string(),
            ),
        }
    }

    /// Execute a parsed command against the device layer.
    fn execute(&self, command: Command) -> ResultMessage {
        match command {
            Command::Status => self.result(
                Channel::Status,
                "SYSTEM_INFO",
                Scope::All,
                Outcome::Success,
                self.status_report(),
            ),

            Command::SetRate(rate) => {
                let range = MIN_SAMPLE_RATE_HZ as i64..=MAX_SAMPLE_RATE_HZ as i64;
                if range.contains(&rate) {
                    // Atomics first, result second: the new interval is
                    // live no later than the tick after this result.
                    self.shared.set_sample_rate(rate as u32);
                    self.command_result(
                        command,
                        Outcome::Success,
                        format!("Sampling rate set to {rate} Hz"),
                    )
                } else {
                    self.command_result(
                        command,
                        Outcome::Failed,
                        format!(
                            "Invalid rate (must be {MIN_SAMPLE_RATE_HZ}-{MAX_SAMPLE_RATE_HZ} Hz)"
                        ),
                    )
                }
            }

            Command::SetAmp(axis, millivolts) => {
                self.axis_command(command, axis, |table, slot, index| {
                    match table.with_handle(slot, |h| h.set_amplitude(index, millivolts)) {
                        Ok(()) => (
                            Outcome::Success,
                            format!("Amplitude set to {millivolts} mV"),
                        ),
                        Err(e) => {
                            warn!("SET_AMP {axis}: {e}");
                            (Outcome::Failed, "Failed to set amplitude".to_string())
                        }
                    }
                })
            }

            Command::SetFreq(axis, millihertz) => {
                self.axis_command(command, axis, |table, slot, index| {
                    match table.with_handle(slot, |h| h.set_frequency(index, millihertz)) {
                        Ok(()) => (
                            Outcome::Success,
                            format!("Frequency set to {millihertz} mHz"),
                        ),
                        Err(e) => {
                            warn!("SET_FREQ {axis}: {e}");
                            (Outcome::Failed, "Failed to set frequency".to_string())
                        }
                    }
                })
            }

            Command::Move(axis, position) => {
                self.axis_command(command, axis, |table, slot, index| {
                    if let Err(e) = table.with_handle(slot, |h| h.set_target(index, position)) {
                        warn!("MOVE {axis}: target rejected: {e}");
                        return (Outcome::Failed, "Failed to set target position".to_string());
                    }
                    match table.with_handle(slot, |h| h.set_move_enable(index, true)) {
                        Ok(()) => (
                            Outcome::Success,
                            format!("Movement started to {position}"),
                        ),
                        Err(e) => {
                            warn!("MOVE {axis}: enable rejected: {e}");
                            // Target is already set: make sure the axis does
                            // not start moving later, best effort.
                            if let Err(e) =
                                table.with_handle(slot, |h| h.set_move_enable(index, false))
                            {
                                warn!("MOVE {axis}: rollback failed: {e}");
                            }
                            (Outcome::Failed, "Failed to enable movement".to_string())
                        }
                    }
                })
            }

            Command::Stop(axis) => self.axis_command(command, axis, |table, slot, index| {
                match table.with_handle(slot, |h| h.set_move_enable(index, false)) {
                    Ok(()) => (Outcome::Success, "Movement stopped".to_string()),
                    Err(e) => {
                        warn!("STOP {axis}: {e}");
                        (Outcome::Failed, "Failed to stop movement".to_string())
                    }
                }
            }),
        }
    }

    /// Resolve the axis and run `op`; an unresolved axis answers
    /// `Axis not connected` without touching the device layer.
    fn axis_command(
        &self,
        command: Command,
        axis: AxisId,
        op: impl FnOnce(&ControllerTable, usize, u8) -> (Outcome, String),
    ) -> ResultMessage {
        match self.topology.resolve(axis) {
            Some((slot, index)) => {
                let (outcome, detail) = op(&self.table, slot, index);
                self.command_result(command, outcome, detail)
            }
            None => {
                self.command_result(command, Outcome::Failed, "Axis not connected".to_string())
            }
        }
    }

    fn command_result(&self, command: Command, outcome: Outcome, detail: String) -> ResultMessage {
        self.result(
            Channel::Command,
            command.subject(),
            command.scope(),
            outcome,
            detail,
        )
    }

    fn result(
        &self,
        channel: Channel,
        subject: &'static str,
        scope: Scope,
        outcome: Outcome,
        detail: String,
    ) -> ResultMessage {
        ResultMessage {
            timestamp_ns: self.shared.now_ns(),
            channel,
            subject,
            scope,
            outcome,
            detail,
        }
    }

    /// Build the multi-line STATUS snapshot.
    ///
    /// Per-field device reads are best effort: a failed read skips its line
    /// rather than failing the report.
    fn status_report(&self) -> String {
        let mut report = String::with_capacity(1024);
        let yes_no = |b: bool| if b { "YES" } else { "NO" };

        let _ = writeln!(report, "=== Stage Stream System Status ===");
        let _ = writeln!(report, "MQTT Connected: {}", yes_no(self.shared.mqtt_connected()));
        let _ = writeln!(
            report,
            "Controllers Connected: {}",
            yes_no(self.shared.controllers_connected())
        );
        let _ = writeln!(report, "Sample Rate: {} Hz", self.shared.sample_rate_hz());
        let _ = writeln!(report, "Total Captured: {}", self.shared.captured());
        let _ = writeln!(report, "Total Published: {}", self.shared.published());
        let _ = writeln!(report, "Total Dropped: {}", self.shared.dropped());
        let _ = writeln!(
            report,
            "Buffer Usage: {}/{}",
            self.ring_depth.occupancy(),
            self.ring_depth.capacity()
        );
        let _ = writeln!(report);

        for (slot, entry) in self.table.slots().iter().enumerate() {
            let _ = writeln!(report, "Controller {slot} (ID={})", entry.info.id);

            if let Ok(version) = self.table.with_handle(slot, |h| h.firmware_version()) {
                let _ = writeln!(report, "  Firmware Version: {version}");
            }

            for axis_index in 0..AXES_PER_CONTROLLER {
                if !entry.axes_connected[axis_index as usize] {
                    continue;
                }
                self.axis_report(&mut report, slot, axis_index);
            }
            let _ = writeln!(report);
        }

        report
    }

    fn axis_report(&self, report: &mut String, slot: usize, axis_index: u8) {
        let name = self
            .topology
            .logical_name(slot, axis_index)
            .map(AxisId::as_str)
            .unwrap_or("UNKNOWN");
        let _ = write!(report, "  Axis {axis_index} ({name}):");

        if let Ok(position) = self.table.read_position(slot, axis_index) {
            let _ = write!(report, " {position}");
            if let Ok(kind) = self.table.with_handle(slot, |h| h.actor_kind(axis_index)) {
                let _ = write!(report, " {}", kind.label());
            }
            if let Ok(actor) = self.table.with_handle(slot, |h| h.actor_name(axis_index)) {
                let _ = write!(report, " ({actor})");
            }
        }
        let _ = writeln!(report);

        if let Ok(amplitude) = self.table.with_handle(slot, |h| h.amplitude(axis_index)) {
            let _ = writeln!(report, "    Amplitude: {amplitude} mV");
        }
        if let Ok(frequency) = self.table.with_handle(slot, |h| h.frequency(axis_index)) {
            let _ = writeln!(report, "    Frequency: {frequency} mHz");
        }
        if let Ok(range) = self.table.with_handle(slot, |h| h.target_range(axis_index)) {
            let _ = writeln!(report, "    Target Range: {range} nm/µ°");
        }

        if let Ok(status) = self.table.with_handle(slot, |h| h.read_status(axis_index)) {
            let _ = write!(report, "    Reference Valid: {}", if status.ref_valid { "YES" } else { "NO" });
            if status.ref_valid {
                if let Ok(reference) =
                    self.table.with_handle(slot, |h| h.reference_position(axis_index))
                {
                    let _ = write!(report, " (Position: {reference})");
                }
            }
            let _ = writeln!(report);
            let _ = writeln!(report, "    Moving Status: {}", status.moving.as_str());
            let _ = writeln!(
                report,
                "    In Target Range: {}",
                if status.in_target { "YES" } else { "NO" }
            );
            let _ = writeln!(
                report,
                "    EOT Forward: {}",
                if status.eot_fwd { "DETECTED" } else { "Clear" }
            );
            let _ = writeln!(
                report,
                "    EOT Backward: {}",
                if status.eot_bkwd { "DETECTED" } else { "Clear" }
            );
        }
        let _ = writeln!(report);
    }
}
