//! Shared fixtures: a node that records every call instead of executing it.

#![allow(dead_code)]

pub mod net;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use cocoon_harness::config::{HarnessConfig, Warmups};
use cocoon_harness::node::{Node, NodeCommand, ProcessId};
use cocoon_harness::scenario::RunContext;
use cocoon_harness::{HarnessError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run(String),
    Spawn { command: String, log: PathBuf },
    Kill(String),
    Terminate(ProcessId),
    Copy { src: PathBuf, dst: PathBuf },
    CopyFromRemote { src: PathBuf, dst: PathBuf },
    Close,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Exit,
    Session,
}

pub struct RecordingNode {
    label: String,
    user: String,
    address: String,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<(String, Failure)>>,
    next_pid: AtomicU32,
}

impl RecordingNode {
    pub fn local() -> Arc<Self> {
        Arc::new(Self::new("local", "tester", "127.0.0.1", 100))
    }

    pub fn remote() -> Arc<Self> {
        Arc::new(Self::new("ubuntu@10.0.0.5", "ubuntu", "10.0.0.5", 500))
    }

    fn new(label: &str, user: &str, address: &str, first_pid: u32) -> Self {
        Self {
            label: label.to_string(),
            user: user.to_string(),
            address: address.to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(first_pid),
        }
    }

    /// `run` exits non-zero for commands containing `needle`.
    pub fn fail_runs_containing(&self, needle: &str) {
        self.failures.lock().push((needle.to_string(), Failure::Exit));
    }

    /// `run` loses the session for commands containing `needle`.
    pub fn drop_session_on(&self, needle: &str) {
        self.failures
            .lock()
            .push((needle.to_string(), Failure::Session));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn runs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Run(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn spawns(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Spawn { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Kill(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn terminated(&self) -> Vec<ProcessId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Terminate(pid) => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Node for RecordingNode {
    fn label(&self) -> &str {
        &self.label
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn run(&self, cmd: &NodeCommand) -> Result<()> {
        let line = cmd.to_string();
        self.record(Call::Run(line.clone()));
        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, f)| *f);
        match failure {
            None => Ok(()),
            Some(Failure::Exit) => Err(HarnessError::ProcessExecution {
                command: line,
                status: Some(1),
                stderr: "simulated failure".into(),
            }),
            Some(Failure::Session) => Err(HarnessError::Session("connection reset".into())),
        }
    }

    async fn spawn(&self, cmd: &NodeCommand, log_path: &Path) -> Result<ProcessId> {
        self.record(Call::Spawn {
            command: cmd.to_string(),
            log: log_path.to_path_buf(),
        });
        Ok(ProcessId(self.next_pid.fetch_add(1, Ordering::SeqCst)))
    }

    async fn kill(&self, pattern: &str) {
        self.record(Call::Kill(pattern.to_string()));
    }

    async fn terminate(&self, pid: ProcessId) {
        self.record(Call::Terminate(pid));
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        self.record(Call::Copy {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
        Ok(())
    }

    async fn copy_from_remote(&self, src: &Path, dst: &Path) -> Result<()> {
        self.record(Call::CopyFromRemote {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Configuration with no warmups, writing router configs into `config_dir`.
pub fn test_config(config_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        config_dir: config_dir.to_path_buf(),
        warmups: Warmups::none(),
        ..HarnessConfig::default()
    }
}

pub fn context(
    local: &Arc<RecordingNode>,
    remote: Option<&Arc<RecordingNode>>,
    config: HarnessConfig,
) -> RunContext {
    let local: Arc<dyn Node> = local.clone();
    let remote: Option<Arc<dyn Node>> = remote.map(|r| {
        let r: Arc<dyn Node> = r.clone();
        r
    });
    RunContext::new(local, remote, config)
}
