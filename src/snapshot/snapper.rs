// src/snapshot/snapper.rs

//! snapper-backed checkpoints

use super::CheckpointBackend;
use crate::error::{Error, Result};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Upper bound for a single `snapper create`
const SNAPPER_TIMEOUT: Duration = Duration::from_secs(300);

/// Creates pre/post snapshot pairs with the `number` cleanup algorithm
pub struct SnapperBackend {
    use_sudo: bool,
}

impl SnapperBackend {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    /// Probe for a working snapper; `None` when the tool is missing
    pub fn detect(use_sudo: bool) -> Option<Self> {
        let probe = Command::new("snapper")
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match probe {
            Ok(status) if status.success() => Some(Self::new(use_sudo)),
            _ => None,
        }
    }

    fn create(&self, args: &[String]) -> Result<u32> {
        let needs_sudo = self.use_sudo && !nix::unistd::geteuid().is_root();
        let mut command = if needs_sudo {
            let mut c = Command::new("sudo");
            c.arg("snapper");
            c
        } else {
            Command::new("snapper")
        };

        command
            .arg("create")
            .args(args)
            .args(["--cleanup-algorithm", "number", "--print-number"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("snapper create {}", args.join(" "));

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: "snapper create".to_string(),
            source,
        })?;

        match child.wait_timeout(SNAPPER_TIMEOUT)? {
            Some(_) => {
                let output = child.wait_with_output()?;
                if !output.status.success() {
                    return Err(Error::Checkpoint(format!(
                        "snapper exited with {}: {}",
                        output.status.code().unwrap_or(-1),
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                parse_snapshot_number(&String::from_utf8_lossy(&output.stdout))
            }
            None => {
                let _ = child.kill();
                Err(Error::Checkpoint(format!(
                    "snapper timed out after {} seconds",
                    SNAPPER_TIMEOUT.as_secs()
                )))
            }
        }
    }
}

impl CheckpointBackend for SnapperBackend {
    fn name(&self) -> &str {
        "snapper"
    }

    fn create_pre(&self, description: &str) -> Result<u32> {
        let number = self.create(&[
            "--type".to_string(),
            "pre".to_string(),
            "--description".to_string(),
            description.to_string(),
        ])?;
        info!("Snapper PRE-snapshot #{} created: {}", number, description);
        Ok(number)
    }

    fn create_post(&self, pre_id: Option<u32>, description: &str) -> Result<u32> {
        let mut args = match pre_id {
            Some(pre) => vec![
                "--type".to_string(),
                "post".to_string(),
                "--pre-number".to_string(),
                pre.to_string(),
            ],
            // No pre to pair with: record a standalone snapshot instead
            None => vec!["--type".to_string(), "single".to_string()],
        };
        args.extend(["--description".to_string(), description.to_string()]);

        let number = self.create(&args)?;
        match pre_id {
            Some(pre) => info!(
                "Snapper POST-snapshot #{} (paired with pre #{}): {}",
                number, pre, description
            ),
            None => info!("Snapper snapshot #{} created: {}", number, description),
        }
        Ok(number)
    }
}

/// Parse the `--print-number` output
fn parse_snapshot_number(stdout: &str) -> Result<u32> {
    stdout
        .trim()
        .parse()
        .map_err(|_| Error::Checkpoint(format!("unexpected snapper output: {:?}", stdout.trim())))
}
