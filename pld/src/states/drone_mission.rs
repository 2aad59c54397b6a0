use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mission_support::SshExecutor;
use mission_types::{Coordinate, Message, ModuleDeployment, PldStatus};
use tokio::time::timeout;
use tracing::warn;

use super::{advance_status, new_link_server, status_str, NextState, PldContext};

/// Publishes `EXECUTING_MISSION`, deploys the Drone container, then streams
/// every vehicle's path at 1 Hz with `START`/""/`FINISH` block markers and a
/// trailing `START_ALL` (§4.5 DroneMission).
pub async fn run(ctx: &mut PldContext, info_drone: ModuleDeployment, paths: Vec<Vec<Coordinate>>) -> NextState {
    let resolved = advance_status(ctx, PldStatus::ExecutingMission);
    ctx.recorder
        .write_state_transition(status_str(PldStatus::PlanningMission), status_str(resolved))
        .await;

    let ssh = SshExecutor::new(info_drone.clone());
    if !ssh.test_connection().await {
        ctx.recorder.write_error("drone host unreachable over ssh").await;
        return NextState::Off;
    }
    if let Err(e) = ssh.start_container(&info_drone.docker_name).await {
        ctx.recorder.write_error(&format!("failed to start drone container: {e}")).await;
        return NextState::Off;
    }

    let addr: SocketAddr = match format!("{}:{}", info_drone.module_ip, info_drone.port).parse() {
        Ok(a) => a,
        Err(e) => {
            ctx.recorder.write_error(&format!("bad drone endpoint: {e}")).await;
            let _ = ssh.stop_container(&info_drone.docker_name).await;
            return NextState::Off;
        }
    };

    let mut attempt = 0;
    let (server, mut rx, connected) = loop {
        if ctx.shutting_down.load(Ordering::SeqCst) {
            let _ = ssh.stop_container(&info_drone.docker_name).await;
            return NextState::Exit;
        }
        attempt += 1;

        let (server, rx, connected) = new_link_server();
        if server.listen(addr).await.is_err() {
            if attempt >= ctx.tuning.max_attempts {
                ctx.recorder.write_error("drone link: attempts exhausted binding server").await;
                let _ = ssh.stop_container(&info_drone.docker_name).await;
                return NextState::Off;
            }
            continue;
        }

        match timeout(Duration::from_secs(ctx.tuning.wait_timer_s), connected.notified()).await {
            Ok(()) => break (server, rx, connected),
            Err(_) => {
                server.close();
                if attempt >= ctx.tuning.max_attempts {
                    ctx.recorder.write_error("drone link: attempts exhausted waiting for connection").await;
                    let _ = ssh.stop_container(&info_drone.docker_name).await;
                    return NextState::Off;
                }
                warn!("pld/drone_mission: attempt {attempt} timed out waiting for connection, retrying");
            }
        }
    };
    drop(connected);

    if let Some(next) = stream_paths(ctx, &server, &paths).await {
        server.close();
        let _ = ssh.stop_container(&info_drone.docker_name).await;
        return next;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(Message::Status { type_status }) if type_status == "FINISH" => break,
                    Some(Message::Status { type_status }) if type_status == "ERROR" => {
                        ctx.recorder.write_error("drone module reported ERROR").await;
                        break;
                    }
                    Some(_) => continue,
                    None => {
                        ctx.recorder.write_error("drone link closed unexpectedly").await;
                        break;
                    }
                }
            }
            Some(msg) = ctx.client_rx.recv() => {
                if let Message::Command { command } = msg {
                    if command == "FINISH" {
                        break;
                    }
                }
            }
        }
    }

    server.close();
    let _ = ssh.stop_container(&info_drone.docker_name).await;
    NextState::Off
}

/// Sends every vehicle's waypoints at the configured send rate, then the
/// closing `START_ALL`. Returns `Some(NextState::Off)` on send failure so
/// the caller can clean up and bail without fully streaming.
async fn stream_paths(
    ctx: &PldContext,
    server: &mission_net::SessionServer,
    paths: &[Vec<Coordinate>],
) -> Option<NextState> {
    let mut ticker = tokio::time::interval(Duration::from_secs(ctx.tuning.send_timer_s));

    for path in paths {
        let mut points = path.clone();
        if points.len() == 1 {
            // A single-target vehicle still needs a START and a FINISH point.
            points.push(points[0]);
        }
        let last = points.len() - 1;

        for (j, point) in points.iter().enumerate() {
            ticker.tick().await;
            let type_command = if j == 0 {
                "START"
            } else if j == last {
                "FINISH"
            } else {
                ""
            };
            if server
                .deliver(&Message::DroneCommandString { type_command: type_command.into(), command: *point })
                .await
                .is_err()
            {
                ctx.recorder.write_error("drone link: send failed mid-stream").await;
                return Some(NextState::Off);
            }
        }
    }

    ticker.tick().await;
    if server
        .deliver(&Message::DroneCommandString {
            type_command: "START_ALL".into(),
            command: Coordinate::new(0.0, 0.0),
        })
        .await
        .is_err()
    {
        ctx.recorder.write_error("drone link: START_ALL send failed").await;
        return Some(NextState::Off);
    }

    None
}
