use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

/// Mission request sent from PLD to Planner: how many vehicles, and the
/// coordinates to route between. The first `num_drones` entries of
/// `pos_targets` are each vehicle's start position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneData {
    pub num_drones: usize,
    pub pos_targets: Vec<Coordinate>,
}

impl DroneData {
    /// `pos_targets[..num_drones]`, one per vehicle.
    pub fn start_positions(&self) -> &[Coordinate] {
        &self.pos_targets[..self.num_drones.min(self.pos_targets.len())]
    }

    pub fn is_well_formed(&self) -> bool {
        self.num_drones > 0 && self.pos_targets.len() >= self.num_drones
    }
}
