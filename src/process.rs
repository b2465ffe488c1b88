use anyhow::{Context, Result};
use std::{os::fd::OwnedFd, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    net::unix::pipe,
    process::{Child, Command},
    sync::{mpsc, watch, Notify},
};

pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Handle to one supervised child process.
///
/// A reaper task owns the `Child` and publishes its exit code, so any number of
/// clones can wait on or terminate the same process without contending for it.
/// Signals are delivered by the reaper too, which never targets a pid it has
/// already reaped.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    label: Arc<str>,
    status: Arc<watch::Sender<Option<i32>>>,
    stop: Arc<Notify>,
    kill: Arc<Notify>,
}

/// Combined stdout and stderr of a child, line by line in the order written.
#[derive(Debug)]
pub struct OutputLines {
    rx: mpsc::UnboundedReceiver<String>,
}

impl OutputLines {
    /// Next line without its trailing line break, `None` once the output closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Spawns `command` with stdout and stderr sharing one pipe.
pub fn start(label: &str, mut command: Command) -> Result<(ProcessHandle, OutputLines)> {
    let (reader, writer) = std::io::pipe().context("failed to create output pipe")?;
    let stderr = writer.try_clone().context("failed to share output pipe")?;
    command
        .stdin(std::process::Stdio::null())
        .stdout(writer)
        .stderr(stderr)
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("failed to start {label}: {:?}", command.as_std()))?;
    // the command still holds the parent's copies of the write end
    drop(command);

    let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
        .with_context(|| format!("failed to read output of {label}"))?;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_lines(output, tx));

    let handle = ProcessHandle {
        label: Arc::from(label),
        status: Arc::new(watch::Sender::new(None)),
        stop: Arc::new(Notify::new()),
        kill: Arc::new(Notify::new()),
    };
    log::debug!("started {label} (pid {:?})", child.id());
    tokio::spawn(reap(handle.clone(), child));

    Ok((handle, OutputLines { rx }))
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(err) => {
                log::debug!("output stream closed with error: {err}");
                break;
            }
        }
    }
}

async fn reap(handle: ProcessHandle, mut child: Child) {
    let label = &handle.label;
    let result = loop {
        tokio::select! {
            result = child.wait() => break result,
            _ = handle.stop.notified() => send_sigterm(label, &child),
            _ = handle.kill.notified() => {
                if let Err(err) = child.start_kill() {
                    log::debug!("kill {label}: {err}");
                }
                break child.wait().await;
            }
        }
    };

    let code = match result {
        Ok(exit) => exit_code(exit),
        Err(err) => {
            log::warn!("failed to wait for {label}: {err}");
            -1
        }
    };
    log::debug!("{label} exited with code {code}");
    handle.status.send_replace(Some(code));
}

fn send_sigterm(label: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id` is `None` once the child has been reaped
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => log::debug!("SIGTERM to {label} failed: {err}"),
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

impl ProcessHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Exit code once the process has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        *self.status.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Blocks until the process has exited and been reaped.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.status.subscribe();
        // the sender lives in `self`, so the channel cannot close under us
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(-1),
            Err(_) => -1,
        };
        code
    }

    /// SIGTERM, then SIGKILL if the process is still alive after `grace`.
    /// Returns only after the process has been reaped.
    pub async fn terminate(&self, grace: Duration) {
        if self.has_exited() {
            return;
        }

        self.stop.notify_one();
        if tokio::time::timeout(grace, self.wait()).await.is_ok() {
            return;
        }

        log::warn!("{} did not exit within {grace:?}, killing it", self.label);
        self.kill.notify_one();
        self.wait().await;
    }
}

/// Terminates `handle` if one was ever started.
pub async fn terminate_process(handle: Option<&ProcessHandle>, grace: Duration) {
    if let Some(handle) = handle {
        log::debug!("terminating {}", handle.label());
        handle.terminate(grace).await;
    }
}
