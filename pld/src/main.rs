mod config;
mod states;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mission_net::{Handlers, SessionServer};
use mission_support::Recorder;
use mission_types::{Message, PldStatus};
use tokio::sync::mpsc;
use tracing::info;

use states::{advance_status, status_str, status_to_u8, u8_to_status, NextState, PldContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mission_support::init_tracing("pld");
    let args = config::Args::parse();
    let tuning = config::load_tuning(args.config.as_deref()).await?;

    let recorder = Arc::new(Recorder::new("pld", "logs"));
    let status = Arc::new(AtomicU8::new(status_to_u8(PldStatus::Unknown)));
    let shutting_down = Arc::new(AtomicBool::new(false));

    let (client_tx, client_rx) = mpsc::unbounded_channel::<Message>();
    let mut handlers = Handlers::default();
    handlers.on_message = Some(Box::new(move |msg| {
        let _ = client_tx.send(msg);
    }));
    let client_server = Arc::new(SessionServer::new(handlers));

    let addr: SocketAddr = format!("{}:{}", args.own_address, args.own_port).parse()?;
    client_server.listen(addr).await?;
    info!("pld listening for the client on {addr}");

    // Idempotent shutdown: a signal handler flips `shutting_down` once,
    // every state's loop observes it and unwinds to `Exit` (§4.5 Shutdown
    // discipline).
    {
        let shutting_down = shutting_down.clone();
        let client_server = client_server.clone();
        tokio::spawn(async move {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            if shutting_down
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                info!("pld: shutdown signal received");
                client_server.close();
            }
        });
    }

    // 1 Hz status heartbeat (§4.6).
    {
        let status_server = client_server.clone();
        let status_flag = status.clone();
        let shutting_down = shutting_down.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                let type_status = status_str(u8_to_status(status_flag.load(Ordering::SeqCst)));
                let _ = status_server.deliver(&Message::Status { type_status: type_status.into() }).await;
            }
        });
    }

    let mut ctx = PldContext {
        recorder: recorder.clone(),
        status: status.clone(),
        shutting_down: shutting_down.clone(),
        client_rx,
        tuning,
    };

    let mut next = NextState::Off;
    loop {
        next = match next {
            NextState::Off => states::off::run(&mut ctx).await,
            NextState::Planner { planner_config, info_planner, info_drone, drone_sim } => {
                states::planner::run(&mut ctx, planner_config, info_planner, info_drone, drone_sim).await
            }
            NextState::DroneMission { info_drone, paths } => {
                states::drone_mission::run(&mut ctx, info_drone, paths).await
            }
            NextState::Exit => break,
        };
    }

    let resolved = advance_status(&ctx, PldStatus::Finish);
    recorder.write_state_transition("?", status_str(resolved)).await;
    recorder.flush().await;
    client_server.close();
    Ok(())
}
