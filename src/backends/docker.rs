use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::{
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    models::{ImageMetadata, ImageName},
    services::ContainerBackend,
};

const DOCKER: &str = "docker";

/// Talks to the local docker daemon through the CLI. Build and pull output
/// is silenced; only the exit status matters.
pub struct DockerBackend;

impl DockerBackend {
    pub fn new() -> DockerBackend {
        DockerBackend
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Config", default)]
    config: InspectConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Entrypoint", default)]
    entrypoint: Option<Vec<String>>,

    #[serde(rename = "Cmd", default)]
    cmd: Option<Vec<String>>,
}

impl ContainerBackend for DockerBackend {
    fn build_image(
        &mut self,
        name: &ImageName,
        context: &Path,
        build_args: &[String],
    ) -> Result<()> {
        let mut command = Command::new(DOCKER);
        command.args(&["build", "-t", name.0.as_str()]).arg(context);
        for build_arg in build_args.iter() {
            command.arg("--build-arg").arg(build_arg);
        }

        let status = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(anyhow!("docker build of {} exited with {}", name.0, status));
        }

        Ok(())
    }

    fn pull_image(&mut self, name: &ImageName) -> Result<()> {
        let status = Command::new(DOCKER)
            .args(&["image", "pull", name.0.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(anyhow!("docker pull of {} exited with {}", name.0, status));
        }

        Ok(())
    }

    fn inspect_image(&mut self, name: &ImageName) -> Result<ImageMetadata> {
        let output = Command::new(DOCKER)
            .args(&["inspect", name.0.as_str()])
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(anyhow!(
                "docker inspect of {} exited with {}",
                name.0,
                output.status
            ));
        }

        let entries: Vec<InspectEntry> = serde_json::from_slice(&output.stdout)?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("docker inspect returned nothing for {}", name.0))?;

        // Images routinely define only one of the two; an absent field is an
        // empty token sequence, not an error.
        Ok(ImageMetadata {
            entrypoint: entry.config.entrypoint.unwrap_or_default(),
            command: entry.config.cmd.unwrap_or_default(),
        })
    }
}
