//! Local execution node.
//!
//! Programs run directly (no shell). Blocking commands stay in the harness's
//! foreground process group so `sudo` can prompt on the terminal. Spawned
//! daemons get a fresh process group, so they survive the harness and an
//! interrupt delivered to the harness's own group does not reach them.

use std::fs::File;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Node, NodeCommand, ProcessId, LOOPBACK_ADDRESS};
use crate::error::{HarnessError, Result};

/// Node executing in the harness's own environment.
#[derive(Debug, Clone)]
pub struct LocalNode {
    user: String,
}

impl LocalNode {
    pub fn new() -> Self {
        Self {
            user: current_user(),
        }
    }

    /// Local node executing as an explicit identity.
    pub fn with_user(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn command(cmd: &NodeCommand) -> std::process::Command {
        let argv = cmd.argv();
        let mut command = std::process::Command::new(&argv[0]);
        command.args(&argv[1..]).stdin(Stdio::null());
        command
    }
}

impl Default for LocalNode {
    fn default() -> Self {
        Self::new()
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::getuid())
                .ok()
                .flatten()
                .map(|u| u.name)
        })
        .unwrap_or_else(|| "root".to_string())
}

#[async_trait]
impl Node for LocalNode {
    fn label(&self) -> &str {
        "local"
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn address(&self) -> &str {
        LOOPBACK_ADDRESS
    }

    async fn run(&self, cmd: &NodeCommand) -> Result<()> {
        info!(node = "local", command = %cmd, "run");
        let status = tokio::process::Command::from(Self::command(cmd))
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(HarnessError::ProcessExecution {
                command: cmd.to_string(),
                status: status.code(),
                stderr: String::new(),
            })
        }
    }

    async fn spawn(&self, cmd: &NodeCommand, log_path: &Path) -> Result<ProcessId> {
        info!(node = "local", command = %cmd, log = %log_path.display(), "spawn");
        let log = File::create(log_path)?;
        let child = Self::command(cmd)
            .process_group(0)
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()?;
        // Never waited on: the daemon outlives the harness.
        Ok(ProcessId(child.id()))
    }

    async fn kill(&self, pattern: &str) {
        debug!(node = "local", pattern, "kill by pattern");
        let cmd = NodeCommand::new("pkill").args(["-9", "-f", pattern]).elevated();
        let _ = tokio::process::Command::from(Self::command(&cmd))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }

    async fn terminate(&self, pid: ProcessId) {
        debug!(node = "local", %pid, "terminate process group");
        // Spawned processes lead their own group, so the negated pid reaches
        // the elevation wrapper and everything it started.
        let group = format!("-{pid}");
        let cmd = NodeCommand::new("kill")
            .args(["-9", "--", group.as_str()])
            .elevated();
        let _ = tokio::process::Command::from(Self::command(&cmd))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        if src == dst {
            debug!(path = %src.display(), "copy onto itself skipped");
            return Ok(());
        }
        info!(src = %src.display(), dst = %dst.display(), "copy");
        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| HarnessError::transfer(src, e))?;
        Ok(())
    }

    async fn copy_from_remote(&self, src: &Path, dst: &Path) -> Result<()> {
        if src == dst {
            return Ok(());
        }
        info!(src = %src.display(), dst = %dst.display(), "copy from node");
        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| HarnessError::transfer(src, e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_copy_from_remote_identity_is_noop() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("never-created.log");
        let node = LocalNode::with_user("tester");
        // A transfer would fail on the missing file; the identity case must not touch it.
        node.copy_from_remote(&missing, &missing).await.unwrap();
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_copy_from_remote_distinct_paths_transfers() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.log");
        let dst = dir.path().join("b.log");
        std::fs::write(&src, "hello").unwrap();
        let node = LocalNode::with_user("tester");
        node.copy_from_remote(&src, &dst).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("remote-proxy-config.json");
        std::fs::write(&cfg, "{}").unwrap();
        let node = LocalNode::with_user("tester");
        node.copy(&cfg, &cfg).await.unwrap();
        assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_transfer_error() {
        let dir = tempdir().unwrap();
        let node = LocalNode::with_user("tester");
        let err = node
            .copy(&dir.path().join("nope"), &dir.path().join("dst"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_run_reports_exit_status() {
        let node = LocalNode::with_user("tester");
        node.run(&NodeCommand::new("true")).await.unwrap();
        let err = node.run(&NodeCommand::new("false")).await.unwrap_err();
        match err {
            HarnessError::ProcessExecution { status, .. } => assert_eq!(status, Some(1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_writes_log_and_returns_pid() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("echo.log");
        let node = LocalNode::with_user("tester");
        let pid = node
            .spawn(&NodeCommand::new("echo").arg("started"), &log)
            .await
            .unwrap();
        assert!(pid.0 > 0);
        for _ in 0..50 {
            if std::fs::read_to_string(&log).unwrap_or_default().contains("started") {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("spawned process never wrote its log");
    }

    /// Process group id of `pid` (or `self`) from procfs.
    fn pgrp_of(pid: &str) -> String {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
        let after_comm = &stat[stat.rfind(')').unwrap() + 1..];
        after_comm.split_whitespace().nth(2).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_run_stays_in_foreground_group() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("pgrp");
        let script = format!("cut -d' ' -f5 /proc/$$/stat > {}", out.display());
        let node = LocalNode::with_user("tester");
        node.run(&NodeCommand::new("sh").args(["-c", script.as_str()]))
            .await
            .unwrap();
        let child_group = std::fs::read_to_string(&out).unwrap();
        assert_eq!(child_group.trim(), pgrp_of("self"));
    }

    #[tokio::test]
    async fn test_spawn_leads_own_group() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("sleep.log");
        let node = LocalNode::with_user("tester");
        let pid = node
            .spawn(&NodeCommand::new("sleep").arg("1"), &log)
            .await
            .unwrap();
        // Never reaped, so the entry outlives the process.
        assert_eq!(pgrp_of(&pid.to_string()), pid.to_string());
        assert_ne!(pgrp_of("self"), pid.to_string());
    }

    #[test]
    fn test_local_identity() {
        let node = LocalNode::with_user("alice");
        assert_eq!(node.user(), "alice");
        assert_eq!(node.address(), LOOPBACK_ADDRESS);
        assert_eq!(node.label(), "local");
    }
}
