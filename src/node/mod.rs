//! Execution nodes.
//!
//! A [`Node`] is the uniform capability set every scenario is written
//! against: run a command to completion, spawn a detached daemon, kill
//! processes, move files, and report the identity commands execute under.
//! [`LocalNode`] executes in the harness's own environment; [`RemoteNode`]
//! executes over one persistent SSH session and its SFTP channel.
//!
//! Scenario code never branches on which implementation it holds.

mod command;
mod local;
mod remote;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use command::NodeCommand;
pub use local::LocalNode;
pub use remote::{RemoteNode, RemoteTarget, SshAuth, DEFAULT_SSH_PORT};

/// Address the harness uses to reach services on the local node.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Identifier of a process started with [`Node::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability set shared by local and remote execution contexts.
#[async_trait]
pub trait Node: Send + Sync {
    /// Short label used in logs (`local`, `user@host`).
    fn label(&self) -> &str;

    /// Identity commands execute under.
    fn user(&self) -> &str;

    /// Host the harness uses to reach listeners on this node.
    fn address(&self) -> &str;

    /// Run `cmd` to completion. A non-zero exit status is an error.
    async fn run(&self, cmd: &NodeCommand) -> Result<()>;

    /// Start `cmd` detached from the harness, writing combined output to
    /// `log_path`. Returns as soon as the launch was issued; start-up
    /// failures only show up in the log.
    async fn spawn(&self, cmd: &NodeCommand, log_path: &Path) -> Result<ProcessId>;

    /// Kill every process whose command line matches `pattern`.
    /// Best effort, never fails.
    async fn kill(&self, pattern: &str);

    /// Kill a process previously returned by [`Node::spawn`].
    /// Best effort, never fails.
    async fn terminate(&self, pid: ProcessId);

    /// Place the local file `src` at `dst` on this node.
    async fn copy(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Fetch `src` from this node into the local file `dst`.
    async fn copy_from_remote(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Release session resources. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Escape a pattern for `pkill -f` inside a shell command line.
pub(crate) fn quote_arg(arg: &str) -> String {
    shell_escape::escape(arg.into()).into_owned()
}
