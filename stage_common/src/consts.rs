//! Topics and tuning constants shared across the workspace.

/// Outbound topic for batched position lines.
pub const TOPIC_POSITION: &str = "microscope/stage/position";

/// Inbound topic carrying operator commands.
pub const TOPIC_COMMAND: &str = "microscope/stage/command";

/// Outbound topic for per-command result messages.
pub const TOPIC_RESULT: &str = "microscope/stage/result";

/// Outbound topic for lifecycle strings (`SYSTEM_READY`, `SYSTEM_SHUTDOWN`).
pub const TOPIC_STATUS: &str = "microscope/stage/status";

/// Lowest sample rate accepted by SET_RATE and configuration [Hz].
pub const MIN_SAMPLE_RATE_HZ: u32 = 100;

/// Highest sample rate accepted by SET_RATE and configuration [Hz].
pub const MAX_SAMPLE_RATE_HZ: u32 = 15_000;

/// Maximum samples per published batch.
pub const DEFAULT_BATCH_MAX: usize = 1000;

/// Batch period for the publisher [ms].
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 100;

/// Sample ring capacity. Power of two, 4x the batch size so the ring
/// absorbs publication jitter without dropping at steady state.
pub const DEFAULT_RING_CAPACITY: usize = 4096;

/// Bounded command FIFO depth; overflow drops the oldest entry.
pub const DEFAULT_COMMAND_FIFO_CAPACITY: usize = 64;

/// Controller id driving the three linear axes (X/Y/Z).
pub const DEFAULT_XYZ_CONTROLLER_ID: i32 = 4;

/// Controller id driving the rotational axis (R).
pub const DEFAULT_ROT_CONTROLLER_ID: i32 = 2222;
