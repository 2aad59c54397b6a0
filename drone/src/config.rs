use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "drone", about = "Multi-vehicle mission execution module")]
pub struct Args {
    #[arg(long = "PLD_Address")]
    pub pld_address: IpAddr,

    #[arg(long = "PLD_port")]
    pub pld_port: u16,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Static per-vehicle settings the wire protocol never carries (§4.3):
/// simulator autostart command, connection URL, takeoff altitude, home.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub connection_url: String,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub command_px4: Option<String>,
    #[serde(default = "default_takeoff_altitude")]
    pub takeoff_altitude_m: f64,
    pub home_lat: f64,
    pub home_lon: f64,
}

fn default_takeoff_altitude() -> f64 {
    20.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct DroneTuning {
    pub vehicles: Vec<VehicleConfig>,
    #[serde(default)]
    pub pause_at_second_waypoint: bool,
    #[serde(default = "default_health_gate_timeout")]
    pub health_gate_timeout_s: f64,
}

fn default_health_gate_timeout() -> f64 {
    60.0
}

impl Default for DroneTuning {
    fn default() -> Self {
        Self {
            vehicles: vec![VehicleConfig {
                connection_url: "udp://:14540".into(),
                autostart: false,
                command_px4: None,
                takeoff_altitude_m: default_takeoff_altitude(),
                home_lat: 0.0,
                home_lon: 0.0,
            }],
            pause_at_second_waypoint: false,
            health_gate_timeout_s: default_health_gate_timeout(),
        }
    }
}

pub async fn load_tuning(path: Option<&std::path::Path>) -> anyhow::Result<DroneTuning> {
    match path {
        None => Ok(DroneTuning::default()),
        Some(p) => {
            let text = tokio::fs::read_to_string(p).await?;
            Ok(toml::from_str(&text)?)
        }
    }
}
