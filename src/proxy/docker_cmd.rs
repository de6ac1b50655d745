use crate::database::models::DatabaseStatus;
use anyhow::{anyhow, Context, Result};
use log::info;
use shell_escape::escape;
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::timeout;

/// A docker CLI invocation plus the parser for its output. Commands run on
/// the deployment host itself through `sh -c`.
pub trait DockerCommand {
    type Output;

    fn to_shell_string(&self) -> String;

    fn build_shell_string(&self, use_sudo: bool) -> String {
        let shell_string = self.to_shell_string();
        if use_sudo {
            format!("sudo -n {}", shell_string)
        } else {
            shell_string
        }
    }

    fn parse_output(&self, output: &str) -> Option<Self::Output>;
}

pub struct ContainerInfo {
    pub id: String,
    pub image: String,
    pub name: String,
    pub ports: Vec<String>,
    pub status: String,
}

pub struct GetContainerInfoCmd {
    pub keyword: Option<String>,
}

impl DockerCommand for GetContainerInfoCmd {
    type Output = Vec<ContainerInfo>;

    fn to_shell_string(&self) -> String {
        if let Some(keyword) = &self.keyword {
            let keyword = Cow::from(keyword);
            format!("docker ps --format '{{{{.ID}}}}|{{{{.Image}}}}|{{{{.Names}}}}|{{{{.Ports}}}}|{{{{.Status}}}}' | grep {}", escape(keyword))
        } else {
            "docker ps --format '{{.ID}}|{{.Image}}|{{.Names}}|{{.Ports}}|{{.Status}}'".to_string()
        }
    }

    fn parse_output(&self, output: &str) -> Option<Self::Output> {
        let mut containers = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parts = line.split('|').collect::<Vec<&str>>();
            if parts.len() < 5 {
                info!("Invalid line: {}, parts is {:?}, len < 5", line, parts);
                continue;
            }

            let ports = parts[3]
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect::<Vec<String>>();

            containers.push(ContainerInfo {
                id: parts[0].to_string(),
                image: parts[1].to_string(),
                name: parts[2].to_string(),
                ports,
                status: parts[4].to_string(),
            });
        }

        Some(containers)
    }
}

pub struct GetContainerAddrCmd {
    pub container_name: String,
}

impl DockerCommand for GetContainerAddrCmd {
    type Output = String;

    fn to_shell_string(&self) -> String {
        let container_name = Cow::from(&self.container_name);
        format!(
            "docker inspect -f '{{{{range .NetworkSettings.Networks}}}}{{{{.IPAddress}}}}{{{{end}}}}' {}",
            escape(container_name)
        )
    }

    fn parse_output(&self, output: &str) -> Option<Self::Output> {
        let ip = output.trim().to_string();

        if ip.is_empty() {
            return None;
        }
        Some(ip)
    }
}

/// Reads the container's `status:health` pair, the same shape the platform
/// stores on the database record.
pub struct GetContainerStatusCmd {
    pub container_name: String,
}

impl DockerCommand for GetContainerStatusCmd {
    type Output = DatabaseStatus;

    fn to_shell_string(&self) -> String {
        let container_name = Cow::from(&self.container_name);
        format!(
            "docker inspect -f '{{{{.State.Status}}}}:{{{{if .State.Health}}}}{{{{.State.Health.Status}}}}{{{{else}}}}unknown{{{{end}}}}' {}",
            escape(container_name)
        )
    }

    fn parse_output(&self, output: &str) -> Option<Self::Output> {
        let trimmed = output.trim();

        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse().ok()
    }
}

/// Runs a command on the host shell and feeds the output to the parser.
pub async fn exec_local<C: DockerCommand>(
    command: &C,
    time_limit: Duration,
) -> Result<Option<C::Output>> {
    let shell_string = command.build_shell_string(false);

    let output = timeout(
        time_limit,
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&shell_string)
            .output(),
    )
    .await
    .with_context(|| format!("Command timed out: {shell_string}"))?
    .with_context(|| format!("Failed to run command: {shell_string}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "Command failed ({}): {}",
            output.status,
            stderr.trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(command.parse_output(&stdout))
}
