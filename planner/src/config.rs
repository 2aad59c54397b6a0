use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// Small operational knobs come from the CLI (§6.5); anything structurally
/// larger lives in an optional TOML file, matching `uwb-simulator`'s
/// `Args`/`FullConfig` split.
#[derive(Debug, Parser)]
#[command(name = "planner", about = "Route-computation module")]
pub struct Args {
    #[arg(long = "PLD_Address")]
    pub pld_address: IpAddr,

    #[arg(long = "PLD_port")]
    pub pld_port: u16,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Structured tuning parameters for the k-NN graph and VRP solver (§4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerTuning {
    pub max_neighbor: usize,
    pub max_neighbor_distance_m: f64,
    pub max_distance_for_neighbor: f64,
    pub max_solve_time_s: f64,
    #[serde(default = "default_executable_path")]
    pub signal_server_executable_path: PathBuf,
}

fn default_executable_path() -> PathBuf {
    PathBuf::from("/opt/signal-server")
}

impl Default for PlannerTuning {
    fn default() -> Self {
        Self {
            max_neighbor: 6,
            max_neighbor_distance_m: 2000.0,
            max_distance_for_neighbor: 500.0,
            max_solve_time_s: 1.0,
            signal_server_executable_path: default_executable_path(),
        }
    }
}

pub async fn load_tuning(path: Option<&std::path::Path>) -> anyhow::Result<PlannerTuning> {
    match path {
        None => Ok(PlannerTuning::default()),
        Some(p) => {
            let text = tokio::fs::read_to_string(p).await?;
            Ok(toml::from_str(&text)?)
        }
    }
}
