use std::sync::atomic::{AtomicBool, Ordering};

use mission_types::MissionItem;
use tokio::sync::{Mutex, Notify};

/// One buffered waypoint command, as decoded off the wire (§4.3).
#[derive(Debug, Clone)]
pub struct MessagePx4 {
    pub command_type: String,
    pub item: MissionItem,
}

/// Per-engine mailbox: commands accumulate until `command_upload` goes
/// true, via either `append`'s own `"FINISH"` entry or an external
/// `mark_ready()` call from the supervisor's `START_ALL` handling — both
/// entry points notify the same waiter (§4.3, §9 Open Question).
#[derive(Default)]
pub struct MissionBuffer {
    commands: Mutex<Vec<MessagePx4>>,
    ready: AtomicBool,
    notify: Notify,
}

impl MissionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `cmd`; a `"FINISH"` type marks the buffer ready. Commands
    /// arriving after the buffer is already ready are silently dropped —
    /// late messages must not perturb a mission that is about to execute.
    pub async fn append(&self, cmd: MessagePx4) {
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        let is_finish = cmd.command_type == "FINISH";
        self.commands.lock().await.push(cmd);
        if is_finish {
            self.mark_ready();
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait_ready(&self) {
        let notified = self.notify.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub async fn snapshot(&self) -> Vec<MessagePx4> {
        self.commands.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_types::{CameraAction, Coordinate};

    fn cmd(command_type: &str) -> MessagePx4 {
        MessagePx4 {
            command_type: command_type.into(),
            item: MissionItem {
                coordinate: Coordinate::new(0.0, 0.0),
                relative_altitude_m: 10.0,
                speed_mps: 5.0,
                fly_through: false,
                gimbal_pitch_deg: 0.0,
                gimbal_yaw_deg: 0.0,
                camera_action: CameraAction::None,
            },
        }
    }

    #[tokio::test]
    async fn finish_command_marks_buffer_ready() {
        let buffer = MissionBuffer::new();
        buffer.append(cmd("START")).await;
        assert!(!buffer.ready.load(Ordering::SeqCst));
        buffer.append(cmd("FINISH")).await;
        assert!(buffer.ready.load(Ordering::SeqCst));
        assert_eq!(buffer.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn external_mark_ready_also_releases_waiter() {
        let buffer = std::sync::Arc::new(MissionBuffer::new());
        let waiter = tokio::spawn({
            let buffer = buffer.clone();
            async move {
                buffer.wait_ready().await;
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        buffer.mark_ready();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn commands_after_ready_are_dropped() {
        let buffer = MissionBuffer::new();
        buffer.append(cmd("FINISH")).await;
        buffer.append(cmd("")).await;
        assert_eq!(buffer.snapshot().await.len(), 1);
    }
}
