//! Structured command lines.
//!
//! Commands are built as program + arguments so the local node can execute
//! them without a shell while the remote node gets a correctly quoted shell
//! string. Elevation is requested per command.

use std::fmt;
use std::path::Path;

use super::quote_arg;

const ELEVATE: &str = "sudo";

/// A command line to execute on a [`Node`](super::Node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCommand {
    program: String,
    args: Vec<String>,
    elevated: bool,
}

impl NodeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevated: false,
        }
    }

    /// Command for an executable located by path.
    pub fn path(program: &Path) -> Self {
        Self::new(program.display().to_string())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command with elevated privileges.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector, including the elevation prefix.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if self.elevated {
            argv.push(ELEVATE.to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Shell-quoted command line for execution through a remote shell.
    pub fn to_shell(&self) -> String {
        self.argv()
            .iter()
            .map(|a| quote_arg(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for NodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_command_argv() {
        let cmd = NodeCommand::new("/opt/router").arg("--config").arg("cfg.json");
        assert_eq!(cmd.argv(), vec!["/opt/router", "--config", "cfg.json"]);
        assert!(!cmd.is_elevated());
    }

    #[test]
    fn test_elevated_prefixes_sudo() {
        let cmd = NodeCommand::new("pkill").args(["-9", "-f", "router"]).elevated();
        assert_eq!(cmd.argv()[0], "sudo");
        assert_eq!(cmd.to_string(), "sudo pkill -9 -f router");
    }

    #[test]
    fn test_shell_rendering_quotes_metacharacters() {
        let cmd = NodeCommand::new("pkill").arg("router|http-echo.py");
        assert_eq!(cmd.to_shell(), "pkill 'router|http-echo.py'");
    }

    #[test]
    fn test_shell_rendering_leaves_simple_words() {
        let cmd = NodeCommand::new("/tmp/seal-client").args(["--port", "54321"]);
        assert_eq!(cmd.to_shell(), "/tmp/seal-client --port 54321");
    }
}
