mod autopilot;
mod config;
mod engine;
mod mission_buffer;
mod release;
mod supervisor;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mission_net::{Handlers, SessionServer};
use mission_support::Recorder;
use mission_types::{guard_transition, Coordinate, Message};
use tokio::sync::mpsc;
use tracing::{info, warn};

use autopilot::SimulatedAutopilot;
use engine::{DroneEngine, EngineConfig, EngineHandlers};
use release::ReleaseLatch;
use supervisor::MultiDroneSupervisor;

enum EngineEvent {
    Complete(i32),
    Error(i32),
}

fn status_to_u8(s: mission_types::DroneStatus) -> u8 {
    match s {
        mission_types::DroneStatus::Unknown => 0,
        mission_types::DroneStatus::StartingSim => 1,
        mission_types::DroneStatus::Error => 2,
        mission_types::DroneStatus::ExecutingMission => 3,
        mission_types::DroneStatus::Finish => 4,
    }
}

fn u8_to_status(v: u8) -> mission_types::DroneStatus {
    match v {
        1 => mission_types::DroneStatus::StartingSim,
        2 => mission_types::DroneStatus::Error,
        3 => mission_types::DroneStatus::ExecutingMission,
        4 => mission_types::DroneStatus::Finish,
        _ => mission_types::DroneStatus::Unknown,
    }
}

fn u8_to_status_str(v: u8) -> &'static str {
    match v {
        1 => "STARTING_SIM",
        2 => "ERROR",
        3 => "EXECUTING_MISSION",
        4 => "FINISH",
        _ => "UNKNOWN",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mission_support::init_tracing("drone");
    let args = config::Args::parse();
    let tuning = config::load_tuning(args.config.as_deref()).await?;

    let recorder = Arc::new(Recorder::new("drone", "logs"));
    recorder.start_new_session().await;

    let status = Arc::new(AtomicU8::new(status_to_u8(mission_types::DroneStatus::StartingSim)));
    let release = Arc::new(ReleaseLatch::new());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();

    let mut engines = Vec::with_capacity(tuning.vehicles.len());
    for (id, vehicle) in tuning.vehicles.iter().enumerate() {
        let home = Coordinate::new(vehicle.home_lat, vehicle.home_lon);
        let engine_config = EngineConfig {
            drone_id: id as i32,
            autostart: vehicle.autostart,
            command_px4: vehicle.command_px4.clone(),
            connection_url: vehicle.connection_url.clone(),
            takeoff_altitude_m: vehicle.takeoff_altitude_m,
            home,
            pause_at_second_waypoint: tuning.pause_at_second_waypoint,
            health_gate_timeout_s: tuning.health_gate_timeout_s,
        };

        let tx_complete = event_tx.clone();
        let tx_error = event_tx.clone();
        let handlers = EngineHandlers {
            mission_complete: Some(Box::new(move |drone_id| {
                let _ = tx_complete.send(EngineEvent::Complete(drone_id));
            })),
            error: Some(Box::new(move |drone_id| {
                let _ = tx_error.send(EngineEvent::Error(drone_id));
            })),
        };

        engines.push(Arc::new(DroneEngine::new(
            engine_config,
            SimulatedAutopilot::new(home),
            recorder.clone(),
            release.clone(),
            handlers,
        )));
    }
    drop(event_tx);

    let supervisor = Arc::new(MultiDroneSupervisor::new(engines, release));

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
    let mut handlers = Handlers::default();
    handlers.on_message = Some(Box::new(move |msg| {
        let _ = msg_tx.send(msg);
    }));
    let server = Arc::new(SessionServer::new(handlers));

    let addr: SocketAddr = format!("{}:{}", args.pld_address, args.pld_port).parse()?;
    server.connect(addr).await?;

    // 1 Hz status heartbeat (§4.6).
    let status_server = server.clone();
    let status_flag = status.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let type_status = u8_to_status_str(status_flag.load(Ordering::SeqCst));
            let _ = status_server
                .deliver(&Message::Status { type_status: type_status.into() })
                .await;
        }
    });

    supervisor.start_all();
    status.store(status_to_u8(mission_types::DroneStatus::ExecutingMission), Ordering::SeqCst);
    recorder.write_state_transition("STARTING_SIM", "EXECUTING_MISSION").await;

    let aggregation_supervisor = supervisor.clone();
    let aggregation_status = status.clone();
    let aggregation_recorder = recorder.clone();
    let aggregation_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                EngineEvent::Complete(_) => aggregation_supervisor.on_drone_complete(),
                EngineEvent::Error(id) => {
                    aggregation_supervisor.on_drone_error(id);
                    let current = u8_to_status(aggregation_status.load(Ordering::SeqCst));
                    let next = guard_transition(current, mission_types::DroneStatus::Error);
                    aggregation_status.store(status_to_u8(next), Ordering::SeqCst);
                    aggregation_recorder.write_error(&format!("drone {id} reported an engine error")).await;
                }
            }
        }
    });

    loop {
        tokio::select! {
            Some(msg) = msg_rx.recv() => {
                match msg {
                    Message::DroneCommandString { type_command, command } => {
                        supervisor.dispatch_command(&type_command, command).await;
                    }
                    Message::Command { command } if command == "FINISH" => {
                        info!("received FINISH, shutting down");
                        break;
                    }
                    other => warn!("drone: ignoring unexpected message {other:?}"),
                }
            }
            _ = supervisor.wait_all_complete() => {
                info!("all missions complete");
                let current = u8_to_status(status.load(Ordering::SeqCst));
                let next = guard_transition(current, mission_types::DroneStatus::Finish);
                status.store(status_to_u8(next), Ordering::SeqCst);
                recorder.write_state_transition("EXECUTING_MISSION", u8_to_status_str(status_to_u8(next))).await;
                break;
            }
        }
    }

    drop(aggregation_task);
    recorder.flush().await;
    server.close();
    Ok(())
}
