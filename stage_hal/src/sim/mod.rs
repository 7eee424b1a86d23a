//! Simulation backend.
//!
//! Software-emulated controllers for development and testing without
//! physical hardware. Axis motion is a simple constant-step approach toward
//! the target while move-enable is set, advanced on every position read.
//!
//! Each simulated controller lives behind an `Arc<Mutex<..>>` shared between
//! the backend and every handle connected to it, so tests can hold a
//! reference and inspect device state after driving the dispatcher.

mod controller;

pub use controller::{SimAxis, SimController};

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::driver::{
    ActorKind, AxisStatus, ControllerBackend, ControllerHandle, ControllerInfo, DeviceError,
    DeviceResult, MoveState, AXES_PER_CONTROLLER,
};

/// Simulation backend holding a fixed set of controllers.
pub struct SimBackend {
    controllers: Vec<Arc<Mutex<SimController>>>,
}

impl SimBackend {
    /// Create a backend over the given controllers, in slot order.
    pub fn new(controllers: Vec<SimController>) -> Self {
        Self {
            controllers: controllers
                .into_iter()
                .map(|c| Arc::new(Mutex::new(c)))
                .collect(),
        }
    }

    /// The default bench: controller 4 with three linear actors (X/Y/Z)
    /// and controller 2222 with one rotator (R).
    pub fn default_stage() -> Self {
        Self::new(vec![
            SimController::new(4)
                .with_axis(0, SimAxis::linear("ECSx5050"))
                .with_axis(1, SimAxis::linear("ECSx5050"))
                .with_axis(2, SimAxis::linear("ECSx3030")),
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
        ])
    }

    /// Shared state of the controller at `slot`, for test inspection.
    pub fn controller(&self, slot: usize) -> Arc<Mutex<SimController>> {
        Arc::clone(&self.controllers[slot])
    }
}

impl ControllerBackend for SimBackend {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn enumerate(&self) -> DeviceResult<Vec<ControllerInfo>> {
        Ok(self
            .controllers
            .iter()
            .enumerate()
            .map(|(slot, c)| {
                let c = c.lock().expect("sim controller lock poisoned");
                ControllerInfo {
                    slot: slot as u32,
                    id: c.id,
                    locked: c.locked,
                }
            })
            .collect())
    }

    fn connect(&self, slot: u32) -> DeviceResult<Box<dyn ControllerHandle>> {
        let state = self
            .controllers
            .get(slot as usize)
            .ok_or(DeviceError::NotFound(slot))?;
        {
            let c = state.lock().expect("sim controller lock poisoned");
            if c.locked {
                return Err(DeviceError::Locked(slot));
            }
            debug!("sim: connected controller id={} at slot {}", c.id, slot);
        }
        Ok(Box::new(SimHandle {
            state: Arc::clone(state),
        }))
    }
}

/// Handle onto one simulated controller.
struct SimHandle {
    state: Arc<Mutex<SimController>>,
}

impl SimHandle {
    fn with_axis<T>(
        &self,
        axis: u8,
        f: impl FnOnce(&mut SimAxis) -> DeviceResult<T>,
    ) -> DeviceResult<T> {
        if axis >= AXES_PER_CONTROLLER {
            return Err(DeviceError::Device(format!("axis index {axis} out of range")));
        }
        let mut c = self.state.lock().expect("sim controller lock poisoned");
        match c.axes[axis as usize].as_mut() {
            Some(axis_state) => f(axis_state),
            None => Err(DeviceError::Device(format!("no actor on axis {axis}"))),
        }
    }
}

impl ControllerHandle for SimHandle {
    fn controller_id(&self) -> i32 {
        self.state.lock().expect("sim controller lock poisoned").id
    }

    fn firmware_version(&mut self) -> DeviceResult<i32> {
        Ok(self
            .state
            .lock()
            .expect("sim controller lock poisoned")
            .firmware_version)
    }

    fn is_axis_connected(&mut self, axis: u8) -> DeviceResult<bool> {
        if axis >= AXES_PER_CONTROLLER {
            return Ok(false);
        }
        let c = self.state.lock().expect("sim controller lock poisoned");
        Ok(c.axes[axis as usize].is_some())
    }

    fn read_position(&mut self, axis: u8) -> DeviceResult<i32> {
        self.with_axis(axis, |a| {
            if a.fail_reads {
                return Err(DeviceError::Device("position read failed".to_string()));
            }
            a.step();
            Ok(a.position)
        })
    }

    fn read_status(&mut self, axis: u8) -> DeviceResult<AxisStatus> {
        self.with_axis(axis, |a| {
            let moving = if a.move_enabled && a.position != a.target {
                MoveState::Moving
            } else {
                MoveState::Idle
            };
            Ok(AxisStatus {
                moving,
                ref_valid: a.ref_valid,
                eot_fwd: false,
                eot_bkwd: false,
                in_target: (a.position as i64 - a.target as i64).unsigned_abs()
                    <= a.target_range as u64,
                error: false,
            })
        })
    }

    fn actor_kind(&mut self, axis: u8) -> DeviceResult<ActorKind> {
        self.with_axis(axis, |a| Ok(a.actor))
    }

    fn actor_name(&mut self, axis: u8) -> DeviceResult<String> {
        self.with_axis(axis, |a| Ok(a.name.clone()))
    }

    fn set_target(&mut self, axis: u8, position: i32) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            if a.fail_targets {
                return Err(DeviceError::Device("target rejected".to_string()));
            }
            a.target = position;
            a.targets_set += 1;
            Ok(())
        })
    }

    fn set_move_enable(&mut self, axis: u8, enable: bool) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            if a.fail_moves && enable {
                return Err(DeviceError::Device("move enable rejected".to_string()));
            }
            a.move_enabled = enable;
            a.move_commands += 1;
            Ok(())
        })
    }

    fn set_output(&mut self, axis: u8, enable: bool) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            a.output_enabled = enable;
            Ok(())
        })
    }

    fn set_amplitude(&mut self, axis: u8, millivolts: i32) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            if a.fail_tuning {
                return Err(DeviceError::Device("amplitude rejected".to_string()));
            }
            a.amplitude = millivolts;
            Ok(())
        })
    }

    fn set_frequency(&mut self, axis: u8, millihertz: i32) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            if a.fail_tuning {
                return Err(DeviceError::Device("frequency rejected".to_string()));
            }
            a.frequency = millihertz;
            Ok(())
        })
    }

    fn set_target_range(&mut self, axis: u8, range: i32) -> DeviceResult<()> {
        self.with_axis(axis, |a| {
            a.target_range = range;
            Ok(())
        })
    }

    fn amplitude(&mut self, axis: u8) -> DeviceResult<i32> {
        self.with_axis(axis, |a| Ok(a.amplitude))
    }

    fn frequency(&mut self, axis: u8) -> DeviceResult<i32> {
        self.with_axis(axis, |a| Ok(a.frequency))
    }

    fn target_range(&mut self, axis: u8) -> DeviceResult<i32> {
        self.with_axis(axis, |a| Ok(a.target_range))
    }

    fn reference_position(&mut self, axis: u8) -> DeviceResult<i32> {
        self.with_axis(axis, |a| Ok(a.reference_position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_reports_slots_in_order() {
        let backend = SimBackend::default_stage();
        let infos = backend.enumerate().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!((infos[0].slot, infos[0].id), (0, 4));
        assert_eq!((infos[1].slot, infos[1].id), (1, 2222));
    }

    #[test]
    fn locked_controller_refuses_connection() {
        let backend = SimBackend::new(vec![SimController::new(7).locked()]);
        assert!(backend.enumerate().unwrap()[0].locked);
        assert!(matches!(backend.connect(0), Err(DeviceError::Locked(0))));
    }

    #[test]
    fn connect_out_of_range_slot() {
        let backend = SimBackend::default_stage();
        assert!(matches!(backend.connect(9), Err(DeviceError::NotFound(9))));
    }

    #[test]
    fn motion_approaches_target_across_reads() {
        let backend = SimBackend::new(vec![
            SimController::new(1).with_axis(0, SimAxis::linear("ECSx5050").with_step(100)),
        ]);
        let mut handle = backend.connect(0).unwrap();

        handle.set_target(0, 250).unwrap();
        handle.set_move_enable(0, true).unwrap();

        assert_eq!(handle.read_position(0).unwrap(), 100);
        assert_eq!(handle.read_position(0).unwrap(), 200);
        assert_eq!(handle.read_position(0).unwrap(), 250);
        assert_eq!(handle.read_position(0).unwrap(), 250);
        assert_eq!(handle.read_status(0).unwrap().moving, MoveState::Idle);
    }

    #[test]
    fn disabled_axis_does_not_move() {
        let backend = SimBackend::new(vec![
            SimController::new(1).with_axis(0, SimAxis::linear("ECSx5050")),
        ]);
        let mut handle = backend.connect(0).unwrap();
        handle.set_target(0, 5000).unwrap();
        assert_eq!(handle.read_position(0).unwrap(), 0);
    }

    #[test]
    fn read_failure_injection() {
        let backend = SimBackend::new(vec![
            SimController::new(1).with_axis(0, SimAxis::linear("ECSx5050").failing_reads()),
        ]);
        let mut handle = backend.connect(0).unwrap();
        assert!(handle.read_position(0).is_err());
        // Status reads are unaffected.
        assert!(handle.read_status(0).is_ok());
    }

    #[test]
    fn absent_axis_operations_fail() {
        let backend = SimBackend::new(vec![
            SimController::new(1).with_axis(0, SimAxis::linear("ECSx5050")),
        ]);
        let mut handle = backend.connect(0).unwrap();
        assert!(!handle.is_axis_connected(1).unwrap());
        assert!(handle.read_position(1).is_err());
        assert!(handle.set_target(1, 0).is_err());
    }
}
