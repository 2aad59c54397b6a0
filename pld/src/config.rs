use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pld", about = "Mission orchestrator")]
pub struct Args {
    #[arg(long = "Own_Address")]
    pub own_address: IpAddr,

    #[arg(long = "Own_port")]
    pub own_port: u16,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Retry/timing knobs for the Planner and DroneMission states (§4.5). Every
/// deployment's SSH and container identity travels with the client's
/// `ConfigMission`, so the only thing left to configure here is timing.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PldTuning {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_wait_timer_s")]
    pub wait_timer_s: u64,
    #[serde(default = "default_send_timer_s")]
    pub send_timer_s: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_wait_timer_s() -> u64 {
    10
}

fn default_send_timer_s() -> u64 {
    1
}

impl Default for PldTuning {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait_timer_s: default_wait_timer_s(),
            send_timer_s: default_send_timer_s(),
        }
    }
}

pub async fn load_tuning(path: Option<&std::path::Path>) -> anyhow::Result<PldTuning> {
    match path {
        None => Ok(PldTuning::default()),
        Some(p) => {
            let text = tokio::fs::read_to_string(p).await?;
            Ok(toml::from_str(&text)?)
        }
    }
}
