//! Controller table.
//!
//! Built once at startup from enumeration: connect every unlocked
//! controller, probe which axes carry an actor, and enable the output stage
//! on each connected axis. The table then lives until shutdown, which
//! disables move and output on every connected axis before the handles are
//! dropped.
//!
//! Handles are wrapped in per-handle mutexes so the sampler and the
//! dispatcher may issue calls concurrently without assuming the underlying
//! driver is thread-safe. Critical sections are single driver calls.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::driver::{
    ControllerBackend, ControllerHandle, ControllerInfo, DeviceError, DeviceResult,
    AXES_PER_CONTROLLER,
};

/// One connected controller.
pub struct ControllerSlot {
    /// Enumeration info for this controller.
    pub info: ControllerInfo,
    /// Which of the three axes carry an actor.
    pub axes_connected: [bool; AXES_PER_CONTROLLER as usize],
    handle: Mutex<Box<dyn ControllerHandle>>,
}

/// Table of connected controllers, indexed by enumeration slot order.
pub struct ControllerTable {
    slots: Vec<ControllerSlot>,
}

impl ControllerTable {
    /// Enumerate, connect and probe all reachable controllers.
    ///
    /// Locked controllers and per-controller connect failures are skipped
    /// with a warning; the affected axes simply stay absent. An empty
    /// result set is fatal.
    ///
    /// # Errors
    /// `DeviceError::Unreachable` if enumeration fails or no controller
    /// could be connected.
    pub fn initialize(backend: &dyn ControllerBackend) -> DeviceResult<Self> {
        let infos = backend.enumerate()?;
        if infos.is_empty() {
            return Err(DeviceError::Unreachable(
                "no controllers found".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(infos.len());
        for info in infos {
            if info.locked {
                warn!(
                    "controller id={} at slot {} is locked, skipping",
                    info.id, info.slot
                );
                continue;
            }
            let mut handle = match backend.connect(info.slot) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(
                        "failed to connect controller id={} at slot {}: {e}",
                        info.id, info.slot
                    );
                    continue;
                }
            };

            let mut axes_connected = [false; AXES_PER_CONTROLLER as usize];
            for axis in 0..AXES_PER_CONTROLLER {
                let connected = handle.is_axis_connected(axis).unwrap_or(false);
                axes_connected[axis as usize] = connected;
                if connected {
                    if let Err(e) = handle.set_output(axis, true) {
                        warn!("failed to enable output on slot {} axis {axis}: {e}", info.slot);
                    }
                    info!("controller id={} axis {axis} connected", info.id);
                }
            }

            slots.push(ControllerSlot {
                info,
                axes_connected,
                handle: Mutex::new(handle),
            });
        }

        if slots.is_empty() {
            return Err(DeviceError::Unreachable(
                "no controller could be connected".to_string(),
            ));
        }

        info!("controller table ready: {} controller(s)", slots.len());
        Ok(Self { slots })
    }

    /// Number of connected controllers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the table holds no controllers.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All connected controllers in table order.
    pub fn slots(&self) -> &[ControllerSlot] {
        &self.slots
    }

    /// Resolve a controller id to its table index. Linear scan, first match
    /// wins, independent of enumeration order.
    pub fn find_slot_by_id(&self, id: i32) -> Option<usize> {
        self.slots.iter().position(|s| s.info.id == id)
    }

    /// Whether `axis` on the controller at `slot` carries an actor.
    pub fn axis_connected(&self, slot: usize, axis: u8) -> bool {
        self.slots
            .get(slot)
            .map(|s| s.axes_connected[axis as usize])
            .unwrap_or(false)
    }

    /// Run `f` against the handle at `slot`, serialized per handle.
    pub fn with_handle<T>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut dyn ControllerHandle) -> DeviceResult<T>,
    ) -> DeviceResult<T> {
        let entry = self
            .slots
            .get(slot)
            .ok_or(DeviceError::NotFound(slot as u32))?;
        let mut handle = entry.handle.lock().expect("controller handle lock poisoned");
        f(&mut **handle)
    }

    /// Read one axis position. Convenience wrapper for the sampler tick.
    #[inline]
    pub fn read_position(&self, slot: usize, axis: u8) -> DeviceResult<i32> {
        self.with_handle(slot, |h| h.read_position(axis))
    }

    /// Disable move and output on every connected axis.
    ///
    /// Called once during orderly shutdown, before handles are dropped.
    /// Failures are logged and do not stop the sweep.
    pub fn shutdown(&self) {
        for (slot, entry) in self.slots.iter().enumerate() {
            for axis in 0..AXES_PER_CONTROLLER {
                if !entry.axes_connected[axis as usize] {
                    continue;
                }
                let result = self.with_handle(slot, |h| {
                    h.set_move_enable(axis, false)?;
                    h.set_output(axis, false)
                });
                if let Err(e) = result {
                    warn!("shutdown: slot {slot} axis {axis}: {e}");
                }
            }
        }
        info!("controller outputs disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimAxis, SimBackend, SimController};

    #[test]
    fn initialize_probes_axes_and_enables_output() {
        let backend = SimBackend::default_stage();
        let table = ControllerTable::initialize(&backend).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.slots()[0].axes_connected, [true, true, true]);
        assert_eq!(table.slots()[1].axes_connected, [true, false, false]);

        let xyz = backend.controller(0);
        let xyz = xyz.lock().unwrap();
        assert!(xyz.axis(0).unwrap().output_enabled);
        assert!(xyz.axis(2).unwrap().output_enabled);
    }

    #[test]
    fn find_slot_by_id_is_enumeration_order_independent() {
        // Rotator enumerates first here.
        let backend = SimBackend::new(vec![
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
            SimController::new(4)
                .with_axis(0, SimAxis::linear("ECSx5050"))
                .with_axis(1, SimAxis::linear("ECSx5050"))
                .with_axis(2, SimAxis::linear("ECSx3030")),
        ]);
        let table = ControllerTable::initialize(&backend).unwrap();

        assert_eq!(table.find_slot_by_id(4), Some(1));
        assert_eq!(table.find_slot_by_id(2222), Some(0));
        assert_eq!(table.find_slot_by_id(7), None);
    }

    #[test]
    fn locked_controllers_are_skipped() {
        let backend = SimBackend::new(vec![
            SimController::new(4)
                .with_axis(0, SimAxis::linear("ECSx5050"))
                .locked(),
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
        ]);
        let table = ControllerTable::initialize(&backend).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.slots()[0].info.id, 2222);
        assert_eq!(table.find_slot_by_id(4), None);
    }

    #[test]
    fn empty_device_set_is_fatal() {
        let backend = SimBackend::new(vec![]);
        assert!(matches!(
            ControllerTable::initialize(&backend),
            Err(DeviceError::Unreachable(_))
        ));
    }

    #[test]
    fn shutdown_disables_move_and_output() {
        let backend = SimBackend::default_stage();
        let table = ControllerTable::initialize(&backend).unwrap();

        table
            .with_handle(0, |h| {
                h.set_target(1, 1000)?;
                h.set_move_enable(1, true)
            })
            .unwrap();

        table.shutdown();

        let xyz = backend.controller(0);
        let xyz = xyz.lock().unwrap();
        assert!(!xyz.axis(1).unwrap().move_enabled);
        assert!(!xyz.axis(1).unwrap().output_enabled);
    }
}
