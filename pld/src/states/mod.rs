pub mod drone_mission;
pub mod off;
pub mod planner;

use std::sync::atomic::{AtomicBool, AtomicU8};
use std::sync::Arc;

use mission_net::{Handlers, SessionServer};
use mission_support::Recorder;
use mission_types::{
    guard_transition, Coordinate, DroneData, Message, ModuleDeployment, PldStatus, SignalServerConfig,
};
use tokio::sync::{mpsc, Notify};

use crate::config::PldTuning;

/// Shared state threaded through every PLD state function: the client
/// link, shutdown flag, and timing knobs. Each state owns (and tears down)
/// its own child-module link locally rather than storing it here, matching
/// §4.5's "a fresh state task, never interleaving handlers from two
/// states" note.
pub struct PldContext {
    pub recorder: Arc<Recorder>,
    pub status: Arc<AtomicU8>,
    pub shutting_down: Arc<AtomicBool>,
    pub client_rx: mpsc::UnboundedReceiver<Message>,
    pub tuning: PldTuning,
}

/// What the outgoing state hands to the next one (§4.5).
pub enum NextState {
    Planner {
        planner_config: SignalServerConfig,
        info_planner: ModuleDeployment,
        info_drone: ModuleDeployment,
        drone_sim: DroneData,
    },
    DroneMission {
        info_drone: ModuleDeployment,
        paths: Vec<Vec<Coordinate>>,
    },
    Off,
    Exit,
}

pub fn status_to_u8(s: PldStatus) -> u8 {
    match s {
        PldStatus::Unknown => 0,
        PldStatus::Error => 1,
        PldStatus::WaitingInfo => 2,
        PldStatus::PlanningMission => 3,
        PldStatus::ExecutingMission => 4,
        PldStatus::Finish => 5,
    }
}

pub fn u8_to_status(v: u8) -> PldStatus {
    match v {
        1 => PldStatus::Error,
        2 => PldStatus::WaitingInfo,
        3 => PldStatus::PlanningMission,
        4 => PldStatus::ExecutingMission,
        5 => PldStatus::Finish,
        _ => PldStatus::Unknown,
    }
}

/// Stores `next` on `ctx.status` unless the current value is already
/// terminal (FINISH/ERROR), and returns whichever status actually landed.
pub fn advance_status(ctx: &PldContext, next: PldStatus) -> PldStatus {
    use std::sync::atomic::Ordering;
    let current = u8_to_status(ctx.status.load(Ordering::SeqCst));
    let resolved = guard_transition(current, next);
    ctx.status.store(status_to_u8(resolved), Ordering::SeqCst);
    resolved
}

pub fn status_str(s: PldStatus) -> &'static str {
    match s {
        PldStatus::Unknown => "UNKNOWN",
        PldStatus::Error => "ERROR",
        PldStatus::WaitingInfo => "WAITING_INFO",
        PldStatus::PlanningMission => "PLANNING_MISSION",
        PldStatus::ExecutingMission => "EXECUTING_MISSION",
        PldStatus::Finish => "FINISH",
    }
}

/// One TCP server for a child-module link, with its inbound messages
/// fanned into a channel and connect events signalled separately so a
/// caller can wait for "connected" without racing the first message.
pub fn new_link_server() -> (Arc<SessionServer>, mpsc::UnboundedReceiver<Message>, Arc<Notify>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connected = Arc::new(Notify::new());
    let connected_signal = connected.clone();

    let mut handlers = Handlers::default();
    handlers.on_connect = Some(Box::new(move || {
        connected_signal.notify_one();
    }));
    handlers.on_message = Some(Box::new(move |msg| {
        let _ = tx.send(msg);
    }));

    (Arc::new(SessionServer::new(handlers)), rx, connected)
}
