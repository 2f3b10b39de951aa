//! Instance processes: OS children with comm pipes, and in-process tasks.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;

use contracts::protocol::{
    COMM_RX_FD, COMM_TX_FD, ENV_COMM_RX_FD, ENV_COMM_TX_FD, ENV_NODES, ENV_NODE_ID,
};
use contracts::{InstanceExit, InstanceId, InstanceProcess};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Descriptors at or above this are free to use as scratch space in the
/// child before remapping to the comm descriptors.
const SCRATCH_FD_BASE: RawFd = 10;

/// OS child process
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl InstanceProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<InstanceExit> {
        let status = self.child.wait().await?;
        Ok(match (status.code(), status.signal()) {
            (Some(code), _) => InstanceExit::Code(code),
            (None, Some(signal)) => InstanceExit::Signal(signal),
            (None, None) => InstanceExit::Code(-1),
        })
    }

    fn start_kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            // Already reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

/// In-process instance backed by a task; the task's output is its exit code
#[derive(Debug)]
pub struct TaskProcess {
    handle: JoinHandle<i32>,
}

impl TaskProcess {
    pub fn new(handle: JoinHandle<i32>) -> Self {
        Self { handle }
    }
}

impl InstanceProcess for TaskProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn wait(&mut self) -> io::Result<InstanceExit> {
        match (&mut self.handle).await {
            Ok(code) => Ok(InstanceExit::Code(code)),
            Err(e) if e.is_cancelled() => Ok(InstanceExit::Signal(libc::SIGKILL)),
            Err(_) => Ok(InstanceExit::Signal(libc::SIGABRT)),
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.handle.abort();
        Ok(())
    }
}

/// Router-side ends of one instance's comm channel
pub struct CommEndpoint {
    /// Router writes deliveries here; the instance reads them on fd 3
    pub inbound: Box<dyn AsyncWrite + Send + Unpin>,
    /// Router decodes frames from here; the instance writes them on fd 4
    pub outbound: Box<dyn AsyncRead + Send + Unpin>,
}

impl CommEndpoint {
    pub fn new<W, R>(inbound: W, outbound: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inbound: Box::new(inbound),
            outbound: Box::new(outbound),
        }
    }
}

impl std::fmt::Debug for CommEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommEndpoint").finish_non_exhaustive()
    }
}

/// The two OS pipes of one instance before spawn
#[derive(Debug)]
pub(crate) struct CommPipes {
    child_rx: io::PipeReader,
    parent_tx: io::PipeWriter,
    parent_rx: io::PipeReader,
    child_tx: io::PipeWriter,
}

impl CommPipes {
    /// Both pipes are created close-on-exec; only the remapped copies
    /// survive into the child.
    pub(crate) fn new() -> io::Result<Self> {
        let (child_rx, parent_tx) = io::pipe()?;
        let (parent_rx, child_tx) = io::pipe()?;
        Ok(Self {
            child_rx,
            parent_tx,
            parent_rx,
            child_tx,
        })
    }

    /// Export the instance identity and remap the child ends to fds 3 and 4
    pub(crate) fn configure(&self, command: &mut Command, id: InstanceId, instances: usize) {
        command
            .env(ENV_NODE_ID, id.to_string())
            .env(ENV_NODES, instances.to_string())
            .env(ENV_COMM_RX_FD, COMM_RX_FD.to_string())
            .env(ENV_COMM_TX_FD, COMM_TX_FD.to_string())
            .kill_on_drop(true);

        let rx = self.child_rx.as_raw_fd();
        let tx = self.child_tx.as_raw_fd();
        // SAFETY: the closure only calls fcntl/dup2, which are
        // async-signal-safe, and touches no memory shared with the parent.
        unsafe {
            command.pre_exec(move || install_comm_fds(rx, tx));
        }
    }

    /// Drop the child ends and register the parent ends with the reactor
    pub(crate) fn into_endpoint(self) -> io::Result<CommEndpoint> {
        drop(self.child_rx);
        drop(self.child_tx);
        let inbound = pipe::Sender::from_owned_fd(OwnedFd::from(self.parent_tx))?;
        let outbound = pipe::Receiver::from_owned_fd(OwnedFd::from(self.parent_rx))?;
        Ok(CommEndpoint::new(inbound, outbound))
    }
}

/// Runs in the forked child between fork and exec
fn install_comm_fds(rx: RawFd, tx: RawFd) -> io::Result<()> {
    // Move both out of the way first so neither is clobbered by the other's dup2
    let rx = dup_scratch(rx)?;
    let tx = dup_scratch(tx)?;
    dup_onto(rx, COMM_RX_FD)?;
    dup_onto(tx, COMM_TX_FD)?;
    Ok(())
}

fn dup_scratch(fd: RawFd) -> io::Result<RawFd> {
    let new = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, SCRATCH_FD_BASE) };
    if new < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(new)
}

/// dup2 onto `target`; the copy is not close-on-exec
fn dup_onto(fd: RawFd, target: RawFd) -> io::Result<()> {
    if unsafe { libc::dup2(fd, target) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Handles returned to the caller of [`crate::InstanceRouter::launch`]
#[derive(Debug)]
pub struct SpawnedInstance {
    pub id: InstanceId,
    pub pid: Option<u32>,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}
