use mission_types::ModuleDeployment;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SshError {
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("remote command exited with status {0}")]
    NonZeroExit(i32),
}

/// Runs `docker compose` verbs against a remote host over SSH (key or
/// batch-mode auth), and parses `docker compose ps` output to answer
/// "is this container running" (§2, §4.5).
pub struct SshExecutor {
    deployment: ModuleDeployment,
}

impl SshExecutor {
    pub fn new(deployment: ModuleDeployment) -> Self {
        Self { deployment }
    }

    /// `true` if the remote host is reachable and accepts our auth.
    pub async fn test_connection(&self) -> bool {
        match self.run_remote("true").await {
            Ok(status) if status == 0 => true,
            Ok(status) => {
                error!("ssh test_connection: remote exited {status}");
                false
            }
            Err(e) => {
                error!("ssh test_connection failed: {e}");
                false
            }
        }
    }

    pub async fn start_container(&self, docker_name: &str) -> Result<(), SshError> {
        let cmd = format!(
            "docker compose -f {} up -d {docker_name}",
            self.deployment.docker_file
        );
        self.run_remote_checked(&cmd).await
    }

    pub async fn stop_container(&self, docker_name: &str) -> Result<(), SshError> {
        let cmd = format!(
            "docker compose -f {} stop {docker_name}",
            self.deployment.docker_file
        );
        self.run_remote_checked(&cmd).await
    }

    pub async fn is_container_running(&self, docker_name: &str) -> bool {
        let cmd = format!(
            "docker compose -f {} ps --status running --format '{{{{.Name}}}}'",
            self.deployment.docker_file
        );
        match self.run_remote_output(&cmd).await {
            Ok(output) => parse_running_names(&output).iter().any(|n| n == docker_name),
            Err(e) => {
                error!("ssh is_container_running failed: {e}");
                false
            }
        }
    }

    fn ssh_invocation(&self, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        if let Some(key) = &self.deployment.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", self.deployment.user, self.deployment.ssh_ip));
        cmd.arg(remote_cmd);
        cmd
    }

    async fn run_remote(&self, remote_cmd: &str) -> Result<i32, SshError> {
        let status = self.ssh_invocation(remote_cmd).status().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn run_remote_checked(&self, remote_cmd: &str) -> Result<(), SshError> {
        let status = self.run_remote(remote_cmd).await?;
        if status != 0 {
            return Err(SshError::NonZeroExit(status));
        }
        info!("ssh remote command succeeded: {remote_cmd}");
        Ok(())
    }

    async fn run_remote_output(&self, remote_cmd: &str) -> Result<String, SshError> {
        let output = self.ssh_invocation(remote_cmd).output().await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_running_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_running_names() {
        let out = "planner-container\ndrone-container\n\n";
        let names = parse_running_names(out);
        assert_eq!(names, vec!["planner-container", "drone-container"]);
    }

    #[test]
    fn ssh_invocation_includes_key_when_present() {
        let dep = ModuleDeployment {
            user: "pilot".into(),
            ssh_ip: "10.0.0.5".into(),
            key_path: Some("/home/pilot/.ssh/id_ed25519".into()),
            docker_file: "docker-compose.yml".into(),
            docker_name: "planner".into(),
            module_ip: "10.0.0.5".into(),
            port: 9000,
        };
        let executor = SshExecutor::new(dep);
        let cmd = executor.ssh_invocation("true");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"-i".to_string()));
        assert!(args.iter().any(|a| a == "pilot@10.0.0.5"));
    }
}
