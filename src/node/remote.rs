//! Remote execution node over SSH.
//!
//! One session and one SFTP channel are opened at construction and reused
//! for every call until [`Node::close`]. libssh2 is blocking, so each call
//! runs on the tokio blocking pool while holding the session lock; the
//! session is never used by two calls at once.
//!
//! Host keys are accepted without verification, matching how throwaway
//! test machines are provisioned.

use std::fmt;
use std::io::{self, Read};
use std::net::TcpStream;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use ssh2::{Channel, FileStat, Session, Sftp};
use tracing::{debug, info, warn};

use super::{quote_arg, Node, NodeCommand, ProcessId};
use crate::error::{HarnessError, Result};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Mode applied to every uploaded file.
const UPLOAD_MODE: u32 = 0o755;

/// Back-off while a remote command is quiet.
const DRAIN_IDLE: Duration = Duration::from_millis(10);

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^@\s]+)@([^@\s]+)$").expect("static regex is valid")
});

/// A `USER@HOST` remote target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
}

impl FromStr for RemoteTarget {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = TARGET_RE
            .captures(s.trim())
            .ok_or_else(|| HarnessError::Config(format!("expected USER@HOST, got `{s}`")))?;
        Ok(Self {
            user: caps[1].to_string(),
            host: caps[2].to_string(),
        })
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// How the session authenticates.
#[derive(Clone)]
pub enum SshAuth {
    Password(String),
    /// Keys offered by the running ssh-agent.
    Agent,
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Agent => f.write_str("Agent"),
        }
    }
}

struct SshChannels {
    session: Session,
    sftp: Sftp,
}

struct ExecOutput {
    status: i32,
    stdout: String,
    stderr: String,
}

/// Node executing over a persistent SSH session.
pub struct RemoteNode {
    target: RemoteTarget,
    port: u16,
    label: String,
    channels: Arc<Mutex<Option<SshChannels>>>,
}

impl RemoteNode {
    /// Open the session and its SFTP channel.
    pub async fn connect(target: RemoteTarget, port: u16, auth: SshAuth) -> Result<Self> {
        info!(remote = %target, port, "opening ssh session");
        let host = target.host.clone();
        let user = target.user.clone();
        let channels = tokio::task::spawn_blocking(move || open_channels(&host, port, &user, &auth))
            .await
            .map_err(|e| HarnessError::Session(format!("session task failed: {e}")))??;

        Ok(Self {
            label: target.to_string(),
            target,
            port,
            channels: Arc::new(Mutex::new(Some(channels))),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run `f` against the open channels on the blocking pool.
    async fn with_channels<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SshChannels) -> Result<T> + Send + 'static,
    {
        let channels = Arc::clone(&self.channels);
        tokio::task::spawn_blocking(move || {
            let guard = channels.lock();
            match guard.as_ref() {
                Some(open) => f(open),
                None => Err(HarnessError::Session("session already closed".into())),
            }
        })
        .await
        .map_err(|e| HarnessError::Session(format!("ssh task failed: {e}")))?
    }

    async fn exec(&self, command: String) -> Result<ExecOutput> {
        self.with_channels(move |open| exec_blocking(&open.session, &command))
            .await
    }
}

fn open_channels(host: &str, port: u16, user: &str, auth: &SshAuth) -> Result<SshChannels> {
    let tcp = TcpStream::connect((host, port))
        .map_err(|e| HarnessError::Session(format!("connect to {host}:{port}: {e}")))?;
    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    match auth {
        SshAuth::Password(password) => session.userauth_password(user, password)?,
        SshAuth::Agent => session.userauth_agent(user)?,
    }
    if !session.authenticated() {
        return Err(HarnessError::Session(format!(
            "authentication as {user} on {host} was rejected"
        )));
    }

    let sftp = session.sftp()?;
    Ok(SshChannels { session, sftp })
}

fn exec_blocking(session: &Session, command: &str) -> Result<ExecOutput> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;
    // Both streams share the channel window; reading one to EOF first can
    // stall the remote on a full buffer of the other.
    session.set_blocking(false);
    let drained = drain_streams(&mut channel);
    session.set_blocking(true);
    let (stdout, stderr) = drained?;
    channel.wait_close()?;
    Ok(ExecOutput {
        status: channel.exit_status()?,
        stdout,
        stderr,
    })
}

/// The two output streams of a running remote command.
trait CommandStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn finished(&self) -> bool;
}

impl CommandStreams for Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }

    fn finished(&self) -> bool {
        self.eof()
    }
}

/// Read chunk `read` into `sink`; `Ok(true)` when bytes arrived.
fn pull(read: io::Result<usize>, buf: &[u8], sink: &mut Vec<u8>) -> io::Result<bool> {
    match read {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// Interleave reads of both streams until the command has closed them.
fn drain_streams<S: CommandStreams>(streams: &mut S) -> Result<(String, String)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = streams.read_stdout(&mut buf);
        let mut progressed = pull(read, &buf, &mut stdout)?;
        let read = streams.read_stderr(&mut buf);
        progressed |= pull(read, &buf, &mut stderr)?;
        if progressed {
            continue;
        }
        if streams.finished() {
            break;
        }
        std::thread::sleep(DRAIN_IDLE);
    }
    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

/// Shell line that backgrounds `cmd` and reports its pid.
fn background_launch(cmd: &NodeCommand, log_path: &Path) -> String {
    format!(
        "nohup {} > {} 2>&1 < /dev/null & echo $!",
        cmd.to_shell(),
        quote_arg(&log_path.display().to_string())
    )
}

fn parse_pid(stdout: &str) -> Result<ProcessId> {
    stdout
        .trim()
        .parse::<u32>()
        .map(ProcessId)
        .map_err(|_| HarnessError::Session(format!("remote shell reported no pid: `{}`", stdout.trim())))
}

#[async_trait]
impl Node for RemoteNode {
    fn label(&self) -> &str {
        &self.label
    }

    fn user(&self) -> &str {
        &self.target.user
    }

    fn address(&self) -> &str {
        &self.target.host
    }

    async fn run(&self, cmd: &NodeCommand) -> Result<()> {
        info!(node = %self.label, command = %cmd, "run");
        let output = self.exec(cmd.to_shell()).await?;
        if !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        if output.status == 0 {
            Ok(())
        } else {
            Err(HarnessError::ProcessExecution {
                command: cmd.to_string(),
                status: Some(output.status),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    async fn spawn(&self, cmd: &NodeCommand, log_path: &Path) -> Result<ProcessId> {
        info!(node = %self.label, command = %cmd, log = %log_path.display(), "spawn");
        let output = self.exec(background_launch(cmd, log_path)).await?;
        parse_pid(&output.stdout)
    }

    async fn kill(&self, pattern: &str) {
        debug!(node = %self.label, pattern, "kill by pattern");
        let line = format!("sudo pkill -9 -f {}", quote_arg(pattern));
        if let Err(e) = self.exec(line).await {
            warn!(node = %self.label, error = %e, "kill by pattern failed");
        }
    }

    async fn terminate(&self, pid: ProcessId) {
        debug!(node = %self.label, %pid, "terminate process");
        // nohup'd elevated launches are a sudo wrapper; take its children first.
        let line = format!("sudo pkill -9 -P {pid}; sudo kill -9 {pid}");
        if let Err(e) = self.exec(line).await {
            warn!(node = %self.label, error = %e, "terminate failed");
        }
    }

    async fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        info!(node = %self.label, src = %src.display(), dst = %dst.display(), "upload");
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        self.with_channels(move |open| upload(&open.sftp, &src, &dst))
            .await
    }

    async fn copy_from_remote(&self, src: &Path, dst: &Path) -> Result<()> {
        info!(node = %self.label, src = %src.display(), dst = %dst.display(), "download");
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        self.with_channels(move |open| download(&open.sftp, &src, &dst))
            .await
    }

    async fn close(&self) -> Result<()> {
        let channels = Arc::clone(&self.channels);
        let label = self.label.clone();
        tokio::task::spawn_blocking(move || {
            let Some(open) = channels.lock().take() else {
                return Ok(());
            };
            info!(node = %label, "closing ssh session");
            let SshChannels { session, sftp } = open;
            drop(sftp);
            session.disconnect(None, "harness finished", None)?;
            Ok(())
        })
        .await
        .map_err(|e| HarnessError::Session(format!("close task failed: {e}")))?
    }
}

fn upload(sftp: &Sftp, src: &Path, dst: &Path) -> Result<()> {
    let mut local = std::fs::File::open(src).map_err(|e| HarnessError::transfer(src, e))?;
    let mut remote = sftp.create(dst).map_err(|e| HarnessError::transfer(dst, e))?;
    std::io::copy(&mut local, &mut remote).map_err(|e| HarnessError::transfer(dst, e))?;
    drop(remote);
    let mode = FileStat {
        size: None,
        uid: None,
        gid: None,
        perm: Some(UPLOAD_MODE),
        atime: None,
        mtime: None,
    };
    sftp.setstat(dst, mode)
        .map_err(|e| HarnessError::transfer(dst, e))
}

fn download(sftp: &Sftp, src: &Path, dst: &Path) -> Result<()> {
    let mut remote = sftp.open(src).map_err(|e| HarnessError::transfer(src, e))?;
    let mut local = std::fs::File::create(dst).map_err(|e| HarnessError::transfer(dst, e))?;
    std::io::copy(&mut remote, &mut local).map_err(|e| HarnessError::transfer(src, e))?;
    Ok(())
}
