use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use mission_types::{CameraAction, Coordinate, MissionItem};
use tokio::sync::Notify;
use tracing::warn;

use crate::autopilot::Autopilot;
use crate::engine::DroneEngine;
use crate::mission_buffer::MessagePx4;
use crate::release::ReleaseLatch;

/// Owns every per-vehicle engine and the shared release latch, and routes
/// inbound `DroneCommandString` traffic to the right engine (§4.4).
///
/// Command dispatch runs single-threaded on the caller's task, so the
/// rotating `current_drone_index` and each engine's own mailbox mutex are
/// enough to keep state consistent without cross-engine locking.
pub struct MultiDroneSupervisor<A: Autopilot> {
    engines: Vec<Arc<DroneEngine<A>>>,
    release: Arc<ReleaseLatch>,
    current_drone_index: AtomicUsize,
    completed: AtomicUsize,
    first_error_drone: AtomicI32,
    error_fired: AtomicBool,
    on_all_complete: Notify,
    on_error: Notify,
}

impl<A: Autopilot + 'static> MultiDroneSupervisor<A> {
    pub fn new(engines: Vec<Arc<DroneEngine<A>>>, release: Arc<ReleaseLatch>) -> Self {
        Self {
            engines,
            release,
            current_drone_index: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            first_error_drone: AtomicI32::new(-1),
            error_fired: AtomicBool::new(false),
            on_all_complete: Notify::new(),
            on_error: Notify::new(),
        }
    }

    /// Spawns every engine's `run()` loop as its own task. Completion and
    /// error callbacks feed this supervisor's aggregation counters.
    pub fn start_all(self: &Arc<Self>) {
        for engine in &self.engines {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.run().await;
            });
        }
    }

    pub fn num_drones(&self) -> usize {
        self.engines.len()
    }

    /// `increment completed`; fires `all_missions_complete` once every
    /// engine has reported in.
    pub fn on_drone_complete(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done == self.engines.len() {
            self.on_all_complete.notify_waiters();
        }
    }

    /// First error wins (`AtomicBool::compare_exchange`, equivalent to
    /// `std::call_once`).
    pub fn on_drone_error(&self, drone_id: i32) {
        if self
            .error_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.first_error_drone.store(drone_id, Ordering::SeqCst);
            self.on_error.notify_waiters();
        }
    }

    pub async fn wait_all_complete(&self) {
        let notified = self.on_all_complete.notified();
        if self.completed.load(Ordering::SeqCst) == self.engines.len() {
            return;
        }
        notified.await;
    }

    pub async fn wait_first_error(&self) -> i32 {
        let notified = self.on_error.notified();
        if self.error_fired.load(Ordering::SeqCst) {
            return self.first_error_drone.load(Ordering::SeqCst);
        }
        notified.await;
        self.first_error_drone.load(Ordering::SeqCst)
    }

    /// Routes one `DroneCommandString` (§4.4, §6.2). `type_command` is one
    /// of `""`, `"START"`, `"FINISH"`, `"START_ALL"`.
    pub async fn dispatch_command(&self, type_command: &str, command: Coordinate) {
        match type_command {
            "START_ALL" => {
                for engine in &self.engines {
                    engine.buffer().mark_ready();
                }
                self.release.trip();
            }
            "START" => {
                let n = self.engines.len();
                let next = (self.current_drone_index.load(Ordering::SeqCst) + 1) % n;
                self.current_drone_index.store(next, Ordering::SeqCst);
                self.forward_to_current(type_command, command).await;
            }
            "" | "FINISH" => {
                self.forward_to_current(type_command, command).await;
            }
            other => {
                warn!("supervisor: unrecognized command type {other}, drone_id=-1");
                self.on_drone_error(-1);
            }
        }
    }

    async fn forward_to_current(&self, type_command: &str, command: Coordinate) {
        let idx = self.current_drone_index.load(Ordering::SeqCst);
        let Some(engine) = self.engines.get(idx) else {
            return;
        };
        let item = MissionItem {
            coordinate: command,
            relative_altitude_m: 20.0,
            speed_mps: 5.0,
            fly_through: false,
            gimbal_pitch_deg: 0.0,
            gimbal_yaw_deg: 0.0,
            camera_action: CameraAction::None,
        };
        engine
            .buffer()
            .append(MessagePx4 { command_type: type_command.to_string(), item })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autopilot::SimulatedAutopilot;
    use crate::engine::{EngineConfig, EngineHandlers};
    use mission_support::Recorder;

    fn test_engine(id: i32) -> Arc<DroneEngine<SimulatedAutopilot>> {
        let home = Coordinate::new(0.0, 0.0);
        let config = EngineConfig {
            drone_id: id,
            autostart: false,
            command_px4: None,
            connection_url: "udp://:14540".into(),
            takeoff_altitude_m: 10.0,
            home,
            pause_at_second_waypoint: false,
            health_gate_timeout_s: 5.0,
        };
        Arc::new(DroneEngine::new(
            config,
            SimulatedAutopilot::new(home),
            Arc::new(Recorder::new("drone-test", std::env::temp_dir())),
            Arc::new(ReleaseLatch::new()),
            EngineHandlers::default(),
        ))
    }

    #[tokio::test]
    async fn start_rotates_to_next_drone_before_forwarding() {
        let engines = vec![test_engine(0), test_engine(1)];
        let release = Arc::new(ReleaseLatch::new());
        let supervisor = MultiDroneSupervisor::new(engines.clone(), release);

        supervisor.dispatch_command("START", Coordinate::new(1.0, 1.0)).await;
        assert_eq!(engines[1].buffer().snapshot().await.len(), 1);
        assert_eq!(engines[0].buffer().snapshot().await.len(), 0);
    }

    #[tokio::test]
    async fn start_all_trips_release_and_marks_every_engine_ready() {
        let engines = vec![test_engine(0), test_engine(1)];
        let release = Arc::new(ReleaseLatch::new());
        let supervisor = MultiDroneSupervisor::new(engines.clone(), release.clone());

        supervisor.dispatch_command("START_ALL", Coordinate::new(0.0, 0.0)).await;
        assert!(release.is_tripped());
        for engine in &engines {
            engine.buffer().wait_ready().await; // returns immediately, already marked
        }
    }

    #[tokio::test]
    async fn unknown_command_reports_error_with_sentinel_drone_id() {
        let engines = vec![test_engine(0)];
        let release = Arc::new(ReleaseLatch::new());
        let supervisor = MultiDroneSupervisor::new(engines, release);
        supervisor.dispatch_command("BOGUS", Coordinate::new(0.0, 0.0)).await;
        assert_eq!(supervisor.wait_first_error().await, -1);
    }
}
