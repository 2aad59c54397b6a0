use std::os::unix::process::CommandExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mission_support::{kill_process_tree, PidRegistry, Recorder};
use mission_types::{is_degenerate_mission, Coordinate, MissionItem};
use serde_json::json;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::autopilot::Autopilot;
use crate::mission_buffer::MissionBuffer;
use crate::release::ReleaseLatch;

const AUTOPILOT_TIMEOUT_S: f64 = 220.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub drone_id: i32,
    pub autostart: bool,
    pub command_px4: Option<String>,
    pub connection_url: String,
    pub takeoff_altitude_m: f64,
    pub home: Coordinate,
    pub pause_at_second_waypoint: bool,
    pub health_gate_timeout_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Spawning = 1,
    Connecting = 2,
    AwaitingHealthy = 3,
    BufferingMission = 4,
    MissionReady = 5,
    Arming = 6,
    AwaitingRelease = 7,
    TakingOff = 8,
    Flying = 9,
    Rtl = 10,
    Disarmed = 11,
    Error = 12,
}

/// Mirrors `Handlers` in `PX4_Wrapper`: boxed callbacks the supervisor
/// registers to learn about completion/failure (§4.3, §4.4).
#[derive(Default)]
pub struct EngineHandlers {
    pub mission_complete: Option<Box<dyn Fn(i32) + Send + Sync>>,
    pub error: Option<Box<dyn Fn(i32) + Send + Sync>>,
}

pub struct DroneEngine<A: Autopilot> {
    config: EngineConfig,
    autopilot: A,
    recorder: Arc<Recorder>,
    buffer: Arc<MissionBuffer>,
    release: Arc<ReleaseLatch>,
    handlers: EngineHandlers,
    state: AtomicU8,
    simulator_pid: tokio::sync::Mutex<Option<u32>>,
}

impl<A: Autopilot> DroneEngine<A> {
    pub fn new(
        config: EngineConfig,
        autopilot: A,
        recorder: Arc<Recorder>,
        release: Arc<ReleaseLatch>,
        handlers: EngineHandlers,
    ) -> Self {
        Self {
            config,
            autopilot,
            recorder,
            buffer: Arc::new(MissionBuffer::new()),
            release,
            simulator_pid: tokio::sync::Mutex::new(None),
            handlers,
            state: AtomicU8::new(EngineState::Idle as u8),
        }
    }

    pub fn buffer(&self) -> Arc<MissionBuffer> {
        self.buffer.clone()
    }

    pub fn state(&self) -> EngineState {
        match self.state.load(Ordering::SeqCst) {
            1 => EngineState::Spawning,
            2 => EngineState::Connecting,
            3 => EngineState::AwaitingHealthy,
            4 => EngineState::BufferingMission,
            5 => EngineState::MissionReady,
            6 => EngineState::Arming,
            7 => EngineState::AwaitingRelease,
            8 => EngineState::TakingOff,
            9 => EngineState::Flying,
            10 => EngineState::Rtl,
            11 => EngineState::Disarmed,
            12 => EngineState::Error,
            _ => EngineState::Idle,
        }
    }

    fn set_state(&self, s: EngineState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    fn fail(&self, reason: &str) {
        error!("drone {}: {reason}", self.config.drone_id);
        self.set_state(EngineState::Error);
        if let Some(f) = &self.handlers.error {
            f(self.config.drone_id);
        }
    }

    /// Drives the full Idle→...→Disarmed sequence (§4.3). Spawns the
    /// simulator child process if configured, then waits for buffered
    /// commands, arms, waits on the shared release latch, flies, and
    /// returns to launch.
    pub async fn run(&self) {
        self.set_state(EngineState::Spawning);
        if let Err(e) = self.spawn_simulator().await {
            self.fail(&format!("failed to spawn simulator: {e}"));
            return;
        }

        self.set_state(EngineState::Connecting);
        if self.autopilot.connect(&self.config.connection_url).await.is_err() {
            self.fail("autopilot connection failed");
            return;
        }

        self.set_state(EngineState::AwaitingHealthy);
        if timeout(Duration::from_secs_f64(AUTOPILOT_TIMEOUT_S), self.autopilot.health_all_ok())
            .await
            .is_err()
        {
            self.fail("timed out waiting for autopilot system");
            return;
        }

        self.set_state(EngineState::BufferingMission);
        self.buffer.wait_ready().await;
        info!("drone {}: all mission commands received", self.config.drone_id);

        let commands = self.buffer.snapshot().await;
        let mut mission_items: Vec<MissionItem> = commands.into_iter().map(|c| c.item).collect();
        if mission_items.len() == 1 {
            // A single-coordinate path is a valid engine input (§4.3, §9): duplicate
            // the sole waypoint so it serves as both the mission's start and end.
            mission_items.push(mission_items[0]);
        }

        if is_degenerate_mission(&mission_items) {
            warn!("drone {}: mission has only duplicate waypoints, skipping flight", self.config.drone_id);
            self.recorder
                .write_event(
                    "MISSION_SKIPPED",
                    json!({ "drone_id": self.config.drone_id, "reason": "duplicate waypoints" }),
                )
                .await;
            self.recorder.flush().await;
            self.set_state(EngineState::Disarmed);
            if let Some(f) = &self.handlers.mission_complete {
                f(self.config.drone_id);
            }
            return;
        }

        self.set_state(EngineState::MissionReady);
        if self.autopilot.upload_mission(&mission_items).await.is_err() {
            self.fail("mission upload failed");
            return;
        }

        if !self.wait_healthy_bounded().await {
            self.fail("health gate timed out");
            return;
        }

        self.set_state(EngineState::Arming);
        if self.autopilot.arm().await.is_err() {
            self.fail("arming failed");
            return;
        }
        if self
            .autopilot
            .set_takeoff_altitude(self.config.takeoff_altitude_m)
            .await
            .is_err()
        {
            warn!("drone {}: failed to set takeoff altitude, continuing with default", self.config.drone_id);
        }

        self.set_state(EngineState::AwaitingRelease);
        self.release.wait().await;

        self.set_state(EngineState::TakingOff);
        if self.autopilot.takeoff().await.is_err() {
            self.fail("takeoff command rejected");
            return;
        }
        while self.autopilot.relative_altitude_m().await < self.config.takeoff_altitude_m - 0.5 {
            sleep(Duration::from_millis(100)).await;
        }
        let pos = self.autopilot.position().await;
        self.recorder
            .write_event("TAKEOFF", json!({ "drone_id": self.config.drone_id, "lat": pos.lat, "lon": pos.lon }))
            .await;

        self.set_state(EngineState::Flying);
        if self.autopilot.start_mission().await.is_err() {
            self.fail("mission start rejected");
            return;
        }
        self.recorder
            .write_event("MISSION_START", json!({ "drone_id": self.config.drone_id }))
            .await;

        let mut paused = false;
        loop {
            if self.autopilot.is_mission_finished().await {
                break;
            }
            let (current, total) = self.autopilot.mission_progress().await;
            if current < mission_items.len() {
                self.recorder
                    .write_event(
                        "WAYPOINT_REACHED",
                        json!({ "drone_id": self.config.drone_id, "current": current, "total": total }),
                    )
                    .await;
            }
            if self.config.pause_at_second_waypoint && !paused && current >= 2 {
                paused = true;
                sleep(Duration::from_secs(5)).await;
            }
            sleep(Duration::from_secs(1)).await;
        }
        self.recorder
            .write_event("MISSION_COMPLETE", json!({ "drone_id": self.config.drone_id }))
            .await;

        self.set_state(EngineState::Rtl);
        if self.autopilot.return_to_launch().await.is_err() {
            self.fail("return-to-launch rejected");
            return;
        }
        self.recorder
            .write_event("RTL_START", json!({ "drone_id": self.config.drone_id }))
            .await;
        sleep(Duration::from_secs(2)).await;
        while self.autopilot.armed().await {
            sleep(Duration::from_secs(1)).await;
        }

        self.recorder.flush().await;
        self.set_state(EngineState::Disarmed);
        if let Some(f) = &self.handlers.mission_complete {
            f(self.config.drone_id);
        }
    }

    async fn wait_healthy_bounded(&self) -> bool {
        timeout(Duration::from_secs_f64(self.config.health_gate_timeout_s), async {
            loop {
                if self.autopilot.health_all_ok().await {
                    return;
                }
                sleep(Duration::from_secs(1)).await;
            }
        })
        .await
        .is_ok()
    }

    async fn spawn_simulator(&self) -> std::io::Result<()> {
        let Some(command_px4) = (self.config.autostart.then(|| self.config.command_px4.clone()).flatten()) else {
            info!("drone {}: skipping simulator autostart", self.config.drone_id);
            return Ok(());
        };

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&command_px4).process_group(0);
        let child = cmd.spawn()?;
        if let Some(pid) = child.id() {
            info!("drone {}: simulator started with pid {pid}", self.config.drone_id);
            let registry = PidRegistry::default_path();
            let _ = registry.register(&format!("px4_drone_{}", self.config.drone_id), pid).await;
            *self.simulator_pid.lock().await = Some(pid);
        }
        // Don't await the child: the shell and its descendants keep running,
        // reaped later via `kill_process_tree` during cleanup.
        std::mem::drop(child);
        sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    /// Process-group teardown for the spawned simulator (§4.3 Cleanup). A
    /// no-op when `autostart` is disabled, since no process group was ever
    /// recorded.
    pub async fn cleanup(&self) {
        if let Some(pid) = *self.simulator_pid.lock().await {
            kill_process_tree(pid).await;
        }
    }
}
