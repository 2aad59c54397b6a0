use serde::{Deserialize, Serialize};

/// Where a child module's TCP endpoint lives, and how the PLD reaches the
/// remote host over SSH to manage its container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDeployment {
    pub user: String,
    pub ssh_ip: String,
    pub key_path: Option<String>,
    pub docker_file: String,
    pub docker_name: String,
    pub module_ip: String,
    pub port: u16,
}
