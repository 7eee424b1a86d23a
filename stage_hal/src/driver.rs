//! Controller driver contract.
//!
//! This module defines:
//! - `ControllerBackend` trait - enumeration and connection
//! - `ControllerHandle` trait - per-controller operations
//! - `DeviceError` enum - error types for device operations
//! - `AxisStatus` / `MoveState` / `ActorKind` - status vocabulary
//!
//! Every operation is synchronous and expected to complete within a few
//! hundred microseconds in the normal case; the sampler accepts that
//! latency on its tick, everything slower belongs on the dispatcher's
//! thread. Reads never mutate device state.

use thiserror::Error;

/// Axes per controller.
pub const AXES_PER_CONTROLLER: u8 = 3;

/// Error types for device operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The driver layer itself is unreachable (no transport, library failure).
    #[error("driver unreachable: {0}")]
    Unreachable(String),

    /// No controller at the requested slot.
    #[error("no controller at slot {0}")]
    NotFound(u32),

    /// The controller is locked by another host.
    #[error("controller at slot {0} is locked")]
    Locked(u32),

    /// A device operation was rejected or the device stopped responding.
    #[error("device error: {0}")]
    Device(String),
}

/// Result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Closed-loop motion state reported by a controller axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MoveState {
    /// No motion in progress.
    #[default]
    Idle = 0,
    /// Closed-loop motion active.
    Moving = 1,
    /// Motion commanded but not yet started.
    Pending = 2,
}

impl MoveState {
    /// Upper-case wire/report name.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            MoveState::Idle => "IDLE",
            MoveState::Moving => "MOVING",
            MoveState::Pending => "PENDING",
        }
    }
}

/// Hardware-reported status flags for one axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisStatus {
    /// Closed-loop motion state.
    pub moving: MoveState,
    /// The axis has an established zero point.
    pub ref_valid: bool,
    /// Forward end-of-travel reached.
    pub eot_fwd: bool,
    /// Backward end-of-travel reached.
    pub eot_bkwd: bool,
    /// Within the configured target range.
    pub in_target: bool,
    /// Axis error flag.
    pub error: bool,
}

/// Kind of actor attached to a controller axis; determines the unit of the
/// raw position values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    /// Linear positioner [nm].
    Linear,
    /// Goniometer [µ°].
    Goniometer,
    /// Rotator [µ°].
    Rotator,
}

impl ActorKind {
    /// Unit and kind label as shown in status reports, e.g. `nm [Linear]`.
    pub const fn label(self) -> &'static str {
        match self {
            ActorKind::Linear => "nm [Linear]",
            ActorKind::Goniometer => "µ° [Goniometer]",
            ActorKind::Rotator => "µ° [Rotator]",
        }
    }
}

/// One entry of the enumeration result.
#[derive(Debug, Clone, Copy)]
pub struct ControllerInfo {
    /// Enumeration slot, stable for the lifetime of the process.
    pub slot: u32,
    /// Controller id as configured on the hardware.
    pub id: i32,
    /// Locked by another host; a locked controller cannot be connected.
    pub locked: bool,
}

/// Discovery and connection entry point for one driver backend.
pub trait ControllerBackend: Send + Sync {
    /// Backend identifier, e.g. `"simulation"`.
    fn name(&self) -> &'static str;

    /// Enumerate reachable controllers in slot order.
    ///
    /// # Errors
    /// Returns `DeviceError::Unreachable` if the driver layer cannot be
    /// queried at all; an empty device set is `Ok(vec![])`.
    fn enumerate(&self) -> DeviceResult<Vec<ControllerInfo>>;

    /// Connect to the controller at `slot`.
    ///
    /// # Errors
    /// `NotFound` if the slot is empty, `Locked` if another host holds it.
    fn connect(&self, slot: u32) -> DeviceResult<Box<dyn ControllerHandle>>;
}

/// Operations on one connected controller.
///
/// Methods take `&mut self`; callers that share a handle across threads
/// wrap it in a mutex (the controller table does exactly that).
pub trait ControllerHandle: Send {
    /// Controller id reported by the device.
    fn controller_id(&self) -> i32;

    /// Firmware revision.
    fn firmware_version(&mut self) -> DeviceResult<i32>;

    /// Whether an actor is connected on `axis`.
    fn is_axis_connected(&mut self, axis: u8) -> DeviceResult<bool>;

    /// Current position [nm or µ° depending on the actor].
    fn read_position(&mut self, axis: u8) -> DeviceResult<i32>;

    /// Hardware status flags.
    fn read_status(&mut self, axis: u8) -> DeviceResult<AxisStatus>;

    /// Kind of the attached actor.
    fn actor_kind(&mut self, axis: u8) -> DeviceResult<ActorKind>;

    /// Vendor name of the attached actor.
    fn actor_name(&mut self, axis: u8) -> DeviceResult<String>;

    /// Set the closed-loop target position.
    fn set_target(&mut self, axis: u8, position: i32) -> DeviceResult<()>;

    /// Enable or disable closed-loop motion.
    fn set_move_enable(&mut self, axis: u8, enable: bool) -> DeviceResult<()>;

    /// Enable or disable the output stage.
    fn set_output(&mut self, axis: u8, enable: bool) -> DeviceResult<()>;

    /// Set the drive amplitude [mV].
    fn set_amplitude(&mut self, axis: u8, millivolts: i32) -> DeviceResult<()>;

    /// Set the drive frequency [mHz].
    fn set_frequency(&mut self, axis: u8, millihertz: i32) -> DeviceResult<()>;

    /// Set the on-target tolerance band [nm or µ°].
    fn set_target_range(&mut self, axis: u8, range: i32) -> DeviceResult<()>;

    /// Current drive amplitude [mV].
    fn amplitude(&mut self, axis: u8) -> DeviceResult<i32>;

    /// Current drive frequency [mHz].
    fn frequency(&mut self, axis: u8) -> DeviceResult<i32>;

    /// Current on-target tolerance band [nm or µ°].
    fn target_range(&mut self, axis: u8) -> DeviceResult<i32>;

    /// Reference position, meaningful when `AxisStatus::ref_valid` is set.
    fn reference_position(&mut self, axis: u8) -> DeviceResult<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_display() {
        let err = DeviceError::Locked(1);
        assert!(err.to_string().contains("slot 1"));

        let err = DeviceError::Device("axis 2 fault".to_string());
        assert!(err.to_string().contains("axis 2 fault"));
    }

    #[test]
    fn move_state_labels() {
        assert_eq!(MoveState::Idle.as_str(), "IDLE");
        assert_eq!(MoveState::Moving.as_str(), "MOVING");
        assert_eq!(MoveState::Pending.as_str(), "PENDING");
    }

    #[test]
    fn actor_labels_carry_units() {
        assert_eq!(ActorKind::Linear.label(), "nm [Linear]");
        assert!(ActorKind::Rotator.label().contains("µ°"));
    }
}
