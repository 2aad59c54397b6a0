use std::time::{Duration, Instant};

use mission_types::{Coordinate, MissionItem};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum AutopilotError {
    #[error("failed to connect to autopilot at {0}")]
    Connect(String),
    #[error("timed out waiting for autopilot system after {0:?}")]
    Timeout(Duration),
    #[error("mission upload rejected")]
    Upload,
    #[error("arming rejected")]
    Arm,
    #[error("takeoff command rejected")]
    Takeoff,
    #[error("mission start rejected")]
    MissionStart,
    #[error("return-to-launch command rejected")]
    Rtl,
}

/// The capability bundle a flight-controller client exposes (§1, §4.3): the
/// real MAVLink client library is out of scope, so every drone engine is
/// generic over this trait and driven here by [`SimulatedAutopilot`].
pub trait Autopilot: Send + Sync {
    async fn connect(&self, connection_url: &str) -> Result<(), AutopilotError>;
    async fn health_all_ok(&self) -> bool;
    async fn arm(&self) -> Result<(), AutopilotError>;
    async fn set_takeoff_altitude(&self, meters: f64) -> Result<(), AutopilotError>;
    async fn takeoff(&self) -> Result<(), AutopilotError>;
    async fn relative_altitude_m(&self) -> f64;
    async fn upload_mission(&self, items: &[MissionItem]) -> Result<(), AutopilotError>;
    async fn start_mission(&self) -> Result<(), AutopilotError>;
    /// `(current_index, total)`.
    async fn mission_progress(&self) -> (usize, usize);
    async fn is_mission_finished(&self) -> bool;
    async fn return_to_launch(&self) -> Result<(), AutopilotError>;
    async fn armed(&self) -> bool;
    async fn position(&self) -> Coordinate;
}

const CLIMB_DURATION: Duration = Duration::from_secs(3);
const RTL_DISARM_DELAY: Duration = Duration::from_secs(2);
const MISSION_ITEM_DURATION: Duration = Duration::from_millis(800);

#[derive(Debug, Default)]
struct SimState {
    armed: bool,
    takeoff_started: Option<Instant>,
    rtl_started: Option<Instant>,
    mission_started: Option<Instant>,
    mission: Vec<MissionItem>,
    takeoff_altitude_target_m: f64,
    position: Coordinate,
}

/// In-process simulated autopilot: every blocking PX4 wait becomes an
/// elapsed-time computation, so callers can poll it exactly the way
/// `PX4_Wrapper` polls the real telemetry plugin (1 Hz spin loops).
pub struct SimulatedAutopilot {
    home: Coordinate,
    state: Mutex<SimState>,
}

impl SimulatedAutopilot {
    pub fn new(home: Coordinate) -> Self {
        Self {
            home,
            state: Mutex::new(SimState { position: home, ..SimState::default() }),
        }
    }
}

impl Autopilot for SimulatedAutopilot {
    async fn connect(&self, _connection_url: &str) -> Result<(), AutopilotError> {
        // Jittered settle time, standing in for MAVSDK's `first_autopilot()` wait.
        let jitter_ms = rand::thread_rng().gen_range(50..250);
        sleep(Duration::from_millis(jitter_ms)).await;
        Ok(())
    }

    async fn health_all_ok(&self) -> bool {
        true
    }

    async fn arm(&self) -> Result<(), AutopilotError> {
        self.state.lock().await.armed = true;
        Ok(())
    }

    async fn set_takeoff_altitude(&self, meters: f64) -> Result<(), AutopilotError> {
        self.state.lock().await.takeoff_altitude_target_m = meters;
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), AutopilotError> {
        self.state.lock().await.takeoff_started = Some(Instant::now());
        Ok(())
    }

    async fn relative_altitude_m(&self) -> f64 {
        let state = self.state.lock().await;
        match state.takeoff_started {
            None => 0.0,
            Some(started) => {
                let fraction = (started.elapsed().as_secs_f64() / CLIMB_DURATION.as_secs_f64()).min(1.0);
                fraction * state.takeoff_altitude_target_m
            }
        }
    }

    async fn upload_mission(&self, items: &[MissionItem]) -> Result<(), AutopilotError> {
        if items.is_empty() {
            return Err(AutopilotError::Upload);
        }
        self.state.lock().await.mission = items.to_vec();
        Ok(())
    }

    async fn start_mission(&self) -> Result<(), AutopilotError> {
        self.state.lock().await.mission_started = Some(Instant::now());
        Ok(())
    }

    async fn mission_progress(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        let total = state.mission.len();
        let Some(started) = state.mission_started else {
            return (0, total);
        };
        let elapsed_items = (started.elapsed().as_secs_f64() / MISSION_ITEM_DURATION.as_secs_f64()) as usize;
        (elapsed_items.min(total.saturating_sub(1)), total)
    }

    async fn is_mission_finished(&self) -> bool {
        let state = self.state.lock().await;
        let Some(started) = state.mission_started else {
            return false;
        };
        let total_duration = MISSION_ITEM_DURATION * state.mission.len().max(1) as u32;
        started.elapsed() >= total_duration
    }

    async fn return_to_launch(&self) -> Result<(), AutopilotError> {
        self.state.lock().await.rtl_started = Some(Instant::now());
        Ok(())
    }

    async fn armed(&self) -> bool {
        let mut state = self.state.lock().await;
        if let Some(rtl_started) = state.rtl_started {
            if rtl_started.elapsed() >= RTL_DISARM_DELAY {
                state.armed = false;
            }
        }
        state.armed
    }

    async fn position(&self) -> Coordinate {
        let state = self.state.lock().await;
        match state.mission.last() {
            Some(last) if state.mission_started.is_some() => last.coordinate,
            _ => self.home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(lat: f64, lon: f64) -> MissionItem {
        MissionItem {
            coordinate: Coordinate::new(lat, lon),
            relative_altitude_m: 20.0,
            speed_mps: 5.0,
            fly_through: false,
            gimbal_pitch_deg: 0.0,
            gimbal_yaw_deg: 0.0,
            camera_action: mission_types::CameraAction::None,
        }
    }

    #[tokio::test]
    async fn altitude_climbs_toward_target_after_takeoff() {
        let ap = SimulatedAutopilot::new(Coordinate::new(0.0, 0.0));
        ap.set_takeoff_altitude(20.0).await.unwrap();
        assert_eq!(ap.relative_altitude_m().await, 0.0);
        ap.takeoff().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ap.relative_altitude_m().await > 0.0);
    }

    #[tokio::test]
    async fn upload_rejects_empty_mission() {
        let ap = SimulatedAutopilot::new(Coordinate::new(0.0, 0.0));
        assert!(ap.upload_mission(&[]).await.is_err());
        assert!(ap.upload_mission(&[item(0.0, 0.0)]).await.is_ok());
    }

    #[tokio::test]
    async fn mission_finishes_after_its_simulated_duration() {
        let ap = SimulatedAutopilot::new(Coordinate::new(0.0, 0.0));
        ap.upload_mission(&[item(0.0, 0.0)]).await.unwrap();
        ap.start_mission().await.unwrap();
        assert!(!ap.is_mission_finished().await);
        tokio::time::sleep(MISSION_ITEM_DURATION + Duration::from_millis(50)).await;
        assert!(ap.is_mission_finished().await);
    }
}
