//! Logical axis topology.
//!
//! Maps the logical axes {X, Y, Z, R} to physical (slot, axis-index) pairs,
//! independent of enumeration order. Built once after the controller table
//! and immutable afterwards; re-enumeration requires a restart.
//!
//! The fixed assignment on the XYZ controller is `Y=0, X=1, Z=2`; the
//! rotator controller drives R on its axis 0. Which physical controller is
//! "the XYZ one" and which is "the rotator" is decided by the configured
//! controller ids (defaults 4 and 2222).

use tracing::{info, warn};

use stage_common::axis::AxisId;

use crate::controllers::ControllerTable;

/// One logical axis binding.
#[derive(Debug, Clone, Copy)]
pub struct TopologyEntry {
    /// The logical axis.
    pub axis: AxisId,
    /// Controller table index, when the controller was found.
    pub slot: Option<usize>,
    /// Axis index on that controller.
    pub axis_index: u8,
    /// The controller is present and the axis carries an actor.
    pub connected: bool,
}

/// Immutable logical-to-physical axis map.
pub struct TopologyMap {
    entries: [TopologyEntry; 4],
}

impl TopologyMap {
    /// Axis indices on the XYZ controller, in `AxisId` order (X, Y, Z).
    const XYZ_AXIS_INDEX: [u8; 3] = [1, 0, 2];

    /// Build the map against a controller table.
    ///
    /// Missing controllers leave the affected axes absent; the system still
    /// starts and their samples stay invalid.
    pub fn build(table: &ControllerTable, xyz_id: i32, rot_id: i32) -> Self {
        let xyz_slot = table.find_slot_by_id(xyz_id);
        let rot_slot = table.find_slot_by_id(rot_id);

        if xyz_slot.is_none() {
            warn!("XYZ controller id={xyz_id} not found; X/Y/Z will stream NaN");
        }
        if rot_slot.is_none() {
            warn!("rotator controller id={rot_id} not found; R will stream NaN");
        }

        let mut entries = [TopologyEntry {
            axis: AxisId::X,
            slot: None,
            axis_index: 0,
            connected: false,
        }; 4];

        for axis in AxisId::ALL {
            let (slot, axis_index) = match axis {
                AxisId::X | AxisId::Y | AxisId::Z => {
                    (xyz_slot, Self::XYZ_AXIS_INDEX[axis as usize])
                }
                AxisId::R => (rot_slot, 0),
            };
            let connected = slot
                .map(|s| table.axis_connected(s, axis_index))
                .unwrap_or(false);
            entries[axis as usize] = TopologyEntry {
                axis,
                slot,
                axis_index,
                connected,
            };
            info!(
                "topology: {axis} -> {}",
                match slot {
                    Some(s) if connected => format!("slot {s} axis {axis_index}"),
                    Some(s) => format!("slot {s} axis {axis_index} (no actor)"),
                    None => "absent".to_string(),
                }
            );
        }

        Self { entries }
    }

    /// Resolve a logical axis to its physical (slot, axis-index) pair.
    /// Returns `None` when the axis is not connected.
    #[inline]
    pub fn resolve(&self, axis: AxisId) -> Option<(usize, u8)> {
        let entry = &self.entries[axis as usize];
        if !entry.connected {
            return None;
        }
        entry.slot.map(|slot| (slot, entry.axis_index))
    }

    /// Whether the logical axis is connected.
    #[inline]
    pub fn is_connected(&self, axis: AxisId) -> bool {
        self.entries[axis as usize].connected
    }

    /// Iterate connected axes as (axis, slot, axis-index).
    pub fn iter_connected(&self) -> impl Iterator<Item = (AxisId, usize, u8)> + '_ {
        self.entries.iter().filter_map(|e| {
            if e.connected {
                e.slot.map(|slot| (e.axis, slot, e.axis_index))
            } else {
                None
            }
        })
    }

    /// Reverse lookup: the logical name of a physical (slot, axis) pair.
    pub fn logical_name(&self, slot: usize, axis_index: u8) -> Option<AxisId> {
        self.entries
            .iter()
            .find(|e| e.slot == Some(slot) && e.axis_index == axis_index)
            .map(|e| e.axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimAxis, SimBackend, SimController};

    fn full_bench() -> (SimBackend, ControllerTable) {
        let backend = SimBackend::default_stage();
        let table = ControllerTable::initialize(&backend).unwrap();
        (backend, table)
    }

    #[test]
    fn resolves_the_streaming_axis_assignment() {
        let (_backend, table) = full_bench();
        let topology = TopologyMap::build(&table, 4, 2222);

        assert_eq!(topology.resolve(AxisId::X), Some((0, 1)));
        assert_eq!(topology.resolve(AxisId::Y), Some((0, 0)));
        assert_eq!(topology.resolve(AxisId::Z), Some((0, 2)));
        assert_eq!(topology.resolve(AxisId::R), Some((1, 0)));
    }

    #[test]
    fn survives_swapped_enumeration_order() {
        let backend = SimBackend::new(vec![
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
            SimController::new(4)
                .with_axis(0, SimAxis::linear("ECSx5050"))
                .with_axis(1, SimAxis::linear("ECSx5050"))
                .with_axis(2, SimAxis::linear("ECSx3030")),
        ]);
        let table = ControllerTable::initialize(&backend).unwrap();
        let topology = TopologyMap::build(&table, 4, 2222);

        assert_eq!(topology.resolve(AxisId::X), Some((1, 1)));
        assert_eq!(topology.resolve(AxisId::R), Some((0, 0)));
    }

    #[test]
    fn missing_rotator_leaves_r_absent() {
        let backend = SimBackend::new(vec![SimController::new(4)
            .with_axis(0, SimAxis::linear("ECSx5050"))
            .with_axis(1, SimAxis::linear("ECSx5050"))
            .with_axis(2, SimAxis::linear("ECSx3030"))]);
        let table = ControllerTable::initialize(&backend).unwrap();
        let topology = TopologyMap::build(&table, 4, 2222);

        assert!(!topology.is_connected(AxisId::R));
        assert_eq!(topology.resolve(AxisId::R), None);
        let connected: Vec<_> = topology.iter_connected().map(|(a, ..)| a).collect();
        assert_eq!(connected, vec![AxisId::X, AxisId::Y, AxisId::Z]);
    }

    #[test]
    fn actorless_axis_is_not_connected() {
        // XYZ controller with an actor only on axis index 0 (logical Y).
        let backend = SimBackend::new(vec![
            SimController::new(4).with_axis(0, SimAxis::linear("ECSx5050")),
            SimController::new(2222).with_axis(0, SimAxis::rotator("ECR3030")),
        ]);
        let table = ControllerTable::initialize(&backend).unwrap();
        let topology = TopologyMap::build(&table, 4, 2222);

        assert!(topology.is_connected(AxisId::Y));
        assert!(!topology.is_connected(AxisId::X));
        assert!(!topology.is_connected(AxisId::Z));
        assert_eq!(topology.resolve(AxisId::X), None);
    }

    #[test]
    fn reverse_lookup_names_physical_pairs() {
        let (_backend, table) = full_bench();
        let topology = TopologyMap::build(&table, 4, 2222);

        assert_eq!(topology.logical_name(0, 0), Some(AxisId::Y));
        assert_eq!(topology.logical_name(0, 1), Some(AxisId::X));
        assert_eq!(topology.logical_name(0, 2), Some(AxisId::Z));
        assert_eq!(topology.logical_name(1, 0), Some(AxisId::R));
        assert_eq!(topology.logical_name(1, 2), None);
    }
}
