mod config;
mod pipeline;
mod routing;
mod signal;
mod vrp;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mission_net::{Handlers, SessionServer};
use mission_support::Recorder;
use mission_types::wire::PlannerResponse;
use mission_types::{Message, PlannerStatus};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

fn status_to_u8(s: PlannerStatus) -> u8 {
    match s {
        PlannerStatus::ExpectingData => 0,
        PlannerStatus::Calculating => 1,
        PlannerStatus::Error => 2,
        PlannerStatus::Finish => 3,
    }
}

fn u8_to_status(v: u8) -> PlannerStatus {
    match v {
        1 => PlannerStatus::Calculating,
        2 => PlannerStatus::Error,
        3 => PlannerStatus::Finish,
        _ => PlannerStatus::ExpectingData,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mission_support::init_tracing("planner");
    let args = config::Args::parse();
    let tuning = config::load_tuning(args.config.as_deref()).await?;

    let recorder = Arc::new(Recorder::new("planner", "logs"));
    recorder.start_new_session().await;

    let status = Arc::new(AtomicU8::new(status_to_u8(PlannerStatus::ExpectingData)));
    let compute_gate = Arc::new(Semaphore::new(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut handlers = Handlers::default();
    handlers.on_message = Some(Box::new(move |msg| {
        let _ = tx.send(msg);
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
            let current = u8_to_status(status_flag.load(Ordering::SeqCst));
            let type_status = match current {
                PlannerStatus::ExpectingData => "EXPECTING_DATA",
                PlannerStatus::Calculating => "CALCULATING",
                PlannerStatus::Error => "ERROR",
                PlannerStatus::Finish => "FINISH",
            };
            let _ = status_server
                .deliver(&Message::Status { type_status: type_status.into() })
                .await;
        }
    });

    while let Some(msg) = rx.recv().await {
        match msg {
            Message::PlannerMessage { signal_server_config, drone_data } => {
                let permit = compute_gate.clone().try_acquire_owned();
                let Ok(permit) = permit else {
                    warn!("dropping compute request: a computation is already in flight");
                    continue;
                };

                status.store(status_to_u8(PlannerStatus::Calculating), Ordering::SeqCst);
                recorder.write_state_transition("EXPECTING_DATA", "CALCULATING").await;

                let server = server.clone();
                let status_flag = status.clone();
                let recorder = recorder.clone();
                let tuning = tuning.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let threshold = signal_server_config.signal_threshold_dbm.unwrap_or(-100.0);
                    let points = signal::calculate_signal(
                        &tuning.signal_server_executable_path,
                        &signal_server_config,
                        threshold,
                    )
                    .await;
                    signal::write_coverage_csv(&tuning.signal_server_executable_path, &points).await;

                    let result = tokio::task::spawn_blocking(move || {
                        pipeline::compute_routes(
                            &drone_data,
                            &points,
                            tuning.max_distance_for_neighbor,
                            tuning.max_neighbor,
                            tuning.max_neighbor_distance_m,
                            Duration::from_secs_f64(tuning.max_solve_time_s),
                        )
                    })
                    .await;

                    match result {
                        Ok(Ok(routes)) => {
                            let items: Vec<PlannerResponse> =
                                routes.iter().map(|p| PlannerResponse::from_path(p)).collect();
                            if server.deliver(&Message::PlannerResponseList { items }).await.is_ok() {
                                status_flag.store(status_to_u8(PlannerStatus::Finish), Ordering::SeqCst);
                                recorder.write_state_transition("CALCULATING", "FINISH").await;
                            }
                        }
                        Ok(Err(e)) => {
                            error!("route computation failed: {e}");
                            recorder.write_error(&e.to_string()).await;
                            status_flag.store(status_to_u8(PlannerStatus::Error), Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!("route computation task panicked: {e}");
                            status_flag.store(status_to_u8(PlannerStatus::Error), Ordering::SeqCst);
                        }
                    }
                });
            }
            Message::Command { command } if command == "FINISH" => {
                info!("received FINISH, shutting down");
                recorder.flush().await;
                server.close();
                break;
            }
            other => {
                warn!("planner: ignoring unexpected message {other:?}");
            }
        }
    }

    Ok(())
}
