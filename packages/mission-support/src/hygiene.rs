use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

pub const DEFAULT_PID_FILE: &str = "/tmp/simulation_processes.pid";

/// Append-only registry of spawned simulator PIDs (§5, §6.6): last-writer
/// wins, line format `name:pid`.
pub struct PidRegistry {
    path: PathBuf,
}

impl PidRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Self {
        Self::new(DEFAULT_PID_FILE)
    }

    pub async fn register(&self, name: &str, pid: u32) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{name}:{pid}\n").as_bytes()).await?;
        file.flush().await
    }
}

/// Escalated process-group teardown: SIGTERM the group, poll for exit up to
/// 30×100ms, then SIGKILL the group plus a `pkill -9 -P` fallback for any
/// grandchildren that re-parented away from the group, and a final blocking
/// wait (§4.3 Cleanup, grounded in `PX4_Wrapper.cpp`'s destructor).
pub async fn kill_process_tree(pid: u32) {
    let pid = Pid::from_raw(pid as i32);

    if let Err(e) = killpg(pid, Signal::SIGTERM) {
        warn!("kill_process_tree: SIGTERM to pgid {pid} failed: {e}");
    } else {
        info!("kill_process_tree: sent SIGTERM to process group {pid}");
    }

    for _ in 0..30 {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(nix::sys::wait::WaitStatus::StillAlive) => {
                sleep(Duration::from_millis(100)).await;
            }
            Ok(_) => return,
            Err(_) => return,
        }
    }

    warn!("kill_process_tree: {pid} still alive after grace period, escalating to SIGKILL");
    if let Err(e) = killpg(pid, Signal::SIGKILL) {
        warn!("kill_process_tree: SIGKILL to pgid {pid} failed: {e}");
    }

    let raw_pid = pid.as_raw().to_string();
    if let Err(e) = Command::new("pkill")
        .args(["-9", "-P", &raw_pid])
        .status()
        .await
    {
        warn!("kill_process_tree: pkill fallback failed: {e}");
    }

    let _ = waitpid(pid, None);
}

/// Plain-text rolling log path, `logs/<module><timestamp>.log` (§6.6).
pub fn log_path(base_dir: &Path, module: &str) -> PathBuf {
    let now = chrono::Local::now();
    base_dir.join(format!("{module}{}.log", now.format("%Y%j_%H%M")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_multiple_pids_without_corruption() {
        let path = std::env::temp_dir().join(format!("pidreg-test-{}.pid", std::process::id()));
        let registry = PidRegistry::new(&path);

        let _ = tokio::join!(
            registry.register("drone0", 1001),
            registry.register("drone1", 1002),
            registry.register("drone2", 1003),
        );

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            assert!(line.contains(':'));
        }
        let _ = tokio::fs::remove_file(&path).await;
    }
}
