use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraAction {
    None,
    TakePhoto,
    StartPhotoInterval,
    StopPhotoInterval,
    StartVideo,
    StopVideo,
    StartPhotoDistance,
    StopPhotoDistance,
}

/// One waypoint in a vehicle's mission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissionItem {
    pub coordinate: Coordinate,
    pub relative_altitude_m: f64,
    pub speed_mps: f64,
    pub fly_through: bool,
    pub gimbal_pitch_deg: f64,
    pub gimbal_yaw_deg: f64,
    pub camera_action: CameraAction,
}

impl MissionItem {
    /// `false` if the item violates an invariant (altitude ≥ 0, speed > 0).
    pub fn is_valid(&self) -> bool {
        self.relative_altitude_m >= 0.0 && self.speed_mps > 0.0
    }
}

/// Two items count as a degenerate (no-op) mission when their coordinates
/// are within the engine's 1e-4 degree tolerance on both axes.
pub fn is_degenerate_mission(items: &[MissionItem]) -> bool {
    items.len() == 2 && items[0].coordinate.nearly_equal(&items[1].coordinate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(lat: f64, lon: f64) -> MissionItem {
        MissionItem {
            coordinate: Coordinate::new(lat, lon),
            relative_altitude_m: 10.0,
            speed_mps: 5.0,
            fly_through: false,
            gimbal_pitch_deg: 0.0,
            gimbal_yaw_deg: 0.0,
            camera_action: CameraAction::None,
        }
    }

    #[test]
    fn detects_degenerate_pair() {
        let items = [item(45.0, 9.0), item(45.00001, 9.00001)];
        assert!(is_degenerate_mission(&items));
    }

    #[test]
    fn three_items_never_degenerate() {
        let items = [item(45.0, 9.0), item(45.0, 9.0), item(45.0, 9.0)];
        assert!(!is_degenerate_mission(&items));
    }

    #[test]
    fn validity_rejects_nonpositive_speed() {
        let mut it = item(0.0, 0.0);
        it.speed_mps = 0.0;
        assert!(!it.is_valid());
    }
}
