//! Simulated controller and axis state.

use crate::driver::{ActorKind, AXES_PER_CONTROLLER};

/// Default approach step per position read [device units].
const DEFAULT_STEP: i32 = 500;

/// State of one simulated controller.
#[derive(Debug)]
pub struct SimController {
    /// Controller id as it would be configured on the hardware.
    pub id: i32,
    /// Locked by another host.
    pub locked: bool,
    /// Reported firmware revision.
    pub firmware_version: i32,
    /// Up to three actors.
    pub axes: [Option<SimAxis>; AXES_PER_CONTROLLER as usize],
}

impl SimController {
    /// New controller with no actors attached.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            locked: false,
            firmware_version: 0x0104,
            axes: [None, None, None],
        }
    }

    /// Attach an actor at `axis`.
    pub fn with_axis(mut self, axis: usize, state: SimAxis) -> Self {
        self.axes[axis] = Some(state);
        self
    }

    /// Mark the controller as locked by another host.
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Immutable view of the actor at `axis`, if any.
    pub fn axis(&self, axis: usize) -> Option<&SimAxis> {
        self.axes[axis].as_ref()
    }
}

/// State of one simulated actor.
#[derive(Debug, Clone)]
pub struct SimAxis {
    /// Actor kind (determines the position unit).
    pub actor: ActorKind,
    /// Vendor actor name.
    pub name: String,
    /// Current position [device units].
    pub position: i32,
    /// Closed-loop target [device units].
    pub target: i32,
    /// Closed-loop motion enabled.
    pub move_enabled: bool,
    /// Output stage enabled.
    pub output_enabled: bool,
    /// Drive amplitude [mV].
    pub amplitude: i32,
    /// Drive frequency [mHz].
    pub frequency: i32,
    /// On-target tolerance band [device units].
    pub target_range: i32,
    /// Zero point established.
    pub ref_valid: bool,
    /// Reference position [device units].
    pub reference_position: i32,
    /// Approach step per position read [device units].
    pub step_per_read: i32,

    // ── Error injection ──
    /// Fail every `read_position`.
    pub fail_reads: bool,
    /// Reject `set_target`.
    pub fail_targets: bool,
    /// Reject `set_move_enable(true)`.
    pub fail_moves: bool,
    /// Reject amplitude/frequency changes.
    pub fail_tuning: bool,

    // ── Call counters (test observability) ──
    /// Number of accepted `set_target` calls.
    pub targets_set: u32,
    /// Number of `set_move_enable` calls, either direction.
    pub move_commands: u32,
}

impl SimAxis {
    fn new(actor: ActorKind, name: &str, amplitude: i32, frequency: i32) -> Self {
        Self {
            actor,
            name: name.to_string(),
            position: 0,
            target: 0,
            move_enabled: false,
            output_enabled: false,
            amplitude,
            frequency,
            target_range: 100,
            ref_valid: true,
            reference_position: 0,
            step_per_read: DEFAULT_STEP,
            fail_reads: false,
            fail_targets: false,
            fail_moves: false,
            fail_tuning: false,
            targets_set: 0,
            move_commands: 0,
        }
    }

    /// A linear positioner with typical bench defaults.
    pub fn linear(name: &str) -> Self {
        Self::new(ActorKind::Linear, name, 45_000, 1_000_000)
    }

    /// A rotator with typical bench defaults.
    pub fn rotator(name: &str) -> Self {
        Self::new(ActorKind::Rotator, name, 30_000, 2_000_000)
    }

    /// Override the per-read approach step.
    pub fn with_step(mut self, step: i32) -> Self {
        self.step_per_read = step;
        self
    }

    /// Start at `position` [device units].
    pub fn at_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Make every position read fail.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Reject `set_target`.
    pub fn failing_targets(mut self) -> Self {
        self.fail_targets = true;
        self
    }

    /// Reject `set_move_enable(true)`.
    pub fn failing_moves(mut self) -> Self {
        self.fail_moves = true;
        self
    }

    /// Reject amplitude/frequency changes.
    pub fn failing_tuning(mut self) -> Self {
        self.fail_tuning = true;
        self
    }

    /// Advance one kinematic step toward the target when motion is enabled.
    pub fn step(&mut self) {
        if !self.move_enabled || self.position == self.target {
            return;
        }
        let delta = (self.target as i64 - self.position as i64)
            .clamp(-(self.step_per_read as i64), self.step_per_read as i64);
        self.position = (self.position as i64 + delta) as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_clamps_to_target() {
        let mut axis = SimAxis::linear("ECSx5050").with_step(1000);
        axis.target = 1500;
        axis.move_enabled = true;

        axis.step();
        assert_eq!(axis.position, 1000);
        axis.step();
        assert_eq!(axis.position, 1500);
        axis.step();
        assert_eq!(axis.position, 1500);
    }

    #[test]
    fn step_moves_backwards_too() {
        let mut axis = SimAxis::rotator("ECR3030").at_position(200).with_step(150);
        axis.target = -100;
        axis.move_enabled = true;

        axis.step();
        assert_eq!(axis.position, 50);
        axis.step();
        assert_eq!(axis.position, -100);
    }
}
