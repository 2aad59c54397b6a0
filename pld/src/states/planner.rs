use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mission_support::SshExecutor;
use mission_types::wire::PlannerResponse;
use mission_types::{Coordinate, DroneData, Message, ModuleDeployment, PldStatus, SignalServerConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::warn;

use super::{advance_status, new_link_server, status_str, NextState, PldContext};

enum PlannerOutcome {
    Response(Vec<PlannerResponse>),
    Failed,
}

/// Publishes `PLANNING_MISSION`, deploys the Planner container over SSH,
/// and retries the compute request up to `max_attempts` times before
/// giving up (§4.5 Planner, Retry policy).
pub async fn run(
    ctx: &mut PldContext,
    planner_config: SignalServerConfig,
    info_planner: ModuleDeployment,
    info_drone: ModuleDeployment,
    drone_sim: DroneData,
) -> NextState {
    let resolved = advance_status(ctx, PldStatus::PlanningMission);
    ctx.recorder
        .write_state_transition(status_str(PldStatus::WaitingInfo), status_str(resolved))
        .await;

    let ssh = SshExecutor::new(info_planner.clone());
    if !ssh.test_connection().await {
        ctx.recorder.write_error("planner host unreachable over ssh").await;
        return NextState::Off;
    }
    if let Err(e) = ssh.start_container(&info_planner.docker_name).await {
        ctx.recorder.write_error(&format!("failed to start planner container: {e}")).await;
        return NextState::Off;
    }

    let addr: SocketAddr = match format!("{}:{}", info_planner.module_ip, info_planner.port).parse() {
        Ok(a) => a,
        Err(e) => {
            ctx.recorder.write_error(&format!("bad planner endpoint: {e}")).await;
            let _ = ssh.stop_container(&info_planner.docker_name).await;
            return NextState::Off;
        }
    };

    let request = Message::PlannerMessage {
        signal_server_config: planner_config,
        drone_data: drone_sim,
    };

    let mut attempt = 0;
    let items = loop {
        if ctx.shutting_down.load(Ordering::SeqCst) {
            let _ = ssh.stop_container(&info_planner.docker_name).await;
            return NextState::Exit;
        }
        attempt += 1;

        let (server, mut rx, connected) = new_link_server();
        if server.listen(addr).await.is_err() {
            if attempt >= ctx.tuning.max_attempts {
                ctx.recorder.write_error("planner link: attempts exhausted binding server").await;
                let _ = ssh.stop_container(&info_planner.docker_name).await;
                return NextState::Off;
            }
            continue;
        }

        let outcome = timeout(
            Duration::from_secs(ctx.tuning.wait_timer_s),
            wait_for_response(&server, &mut rx, &connected, &request),
        )
        .await;

        server.close();
        match outcome {
            Ok(PlannerOutcome::Response(items)) => break items,
            Ok(PlannerOutcome::Failed) => {
                ctx.recorder.write_error("planner reported an error or finished without a response").await;
                let _ = ssh.stop_container(&info_planner.docker_name).await;
                return NextState::Off;
            }
            Err(_) => {
                if attempt >= ctx.tuning.max_attempts {
                    ctx.recorder.write_error("planner link: attempts exhausted").await;
                    let _ = ssh.stop_container(&info_planner.docker_name).await;
                    return NextState::Off;
                }
                warn!("pld/planner: attempt {attempt} timed out, retrying");
            }
        }
    };

    let _ = ssh.stop_container(&info_planner.docker_name).await;

    let paths: Vec<Vec<Coordinate>> = items.iter().map(PlannerResponse::to_path).collect();
    NextState::DroneMission { info_drone, paths }
}

async fn wait_for_response(
    server: &mission_net::SessionServer,
    rx: &mut mpsc::UnboundedReceiver<Message>,
    connected: &tokio::sync::Notify,
    request: &Message,
) -> PlannerOutcome {
    connected.notified().await;
    if server.deliver(request).await.is_err() {
        return PlannerOutcome::Failed;
    }

    loop {
        match rx.recv().await {
            Some(Message::PlannerResponseList { items }) => return PlannerOutcome::Response(items),
            Some(Message::Status { type_status }) if type_status == "ERROR" => return PlannerOutcome::Failed,
            Some(Message::Command { command }) if command == "FINISH" => return PlannerOutcome::Failed,
            Some(_) => continue,
            None => return PlannerOutcome::Failed,
        }
    }
}
