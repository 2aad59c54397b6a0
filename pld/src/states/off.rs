use std::sync::atomic::Ordering;

use mission_types::{Message, PldStatus};
use tracing::warn;

use super::{advance_status, status_str, NextState, PldContext};

/// Publishes `WAITING_INFO`, starts a fresh recorder session, and waits for
/// either a `ConfigMission` (→ Planner) or client `FINISH` (→ Exit). Any
/// other inbound message is logged and discarded (§4.5).
pub async fn run(ctx: &mut PldContext) -> NextState {
    let resolved = advance_status(ctx, PldStatus::WaitingInfo);
    ctx.recorder.start_new_session().await;
    ctx.recorder.write_state_transition("?", status_str(resolved)).await;

    loop {
        if ctx.shutting_down.load(Ordering::SeqCst) {
            return NextState::Exit;
        }

        let Some(msg) = ctx.client_rx.recv().await else {
            return NextState::Exit;
        };

        match msg {
            Message::ConfigMission { planner_config, info_planner, info_drone, drone_sim } => {
                return NextState::Planner { planner_config, info_planner, info_drone, drone_sim };
            }
            Message::Command { command } if command == "FINISH" => {
                return NextState::Exit;
            }
            other => {
                warn!("pld/off: ignoring unexpected message {other:?}");
            }
        }
    }
}
