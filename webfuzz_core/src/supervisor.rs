use crate::error::{FuzzError, LaunchStage};
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Duration;

/// Upper bound for a single health probe, so a target that accepts but never
/// answers cannot stall the readiness loop.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PIPE_READ_CHUNK: usize = 4096;

/// Everything needed to (re)launch the target.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// `argv[0]` is the executable.
    pub argv: Vec<String>,
    pub working_dir: PathBuf,
    pub health_check_url: String,
    /// Number of health probes before giving up.
    pub timeout_iterations: u32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Starting,
    Ready,
    Crashed,
    Restarting,
    Killed,
}

/// The executor's view of the process under test.
pub trait Target {
    /// Everything written to stdout since the last call. Never blocks.
    fn drain_stdout(&mut self) -> Result<String, FuzzError>;
    /// Everything written to stderr since the last call. Never blocks.
    fn drain_stderr(&mut self) -> Result<String, FuzzError>;
    /// `Some(description)` once the process has exited.
    fn exit_status(&mut self) -> Result<Option<String>, FuzzError>;
    /// Kills the current instance and brings up a fresh, ready one.
    fn restart(&mut self) -> Result<(), FuzzError>;
    fn kill(&mut self);
}

struct RunningChild {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

/// A supervised target process with non-blocking output pipes.
pub struct TargetProcess {
    launch: LaunchSpec,
    running: Option<RunningChild>,
    state: TargetState,
    probe: ureq::Agent,
    restarts: usize,
}

impl TargetProcess {
    /// Spawns the target and waits until its health-check URL answers.
    ///
    /// Any HTTP response counts as ready, error statuses included. On timeout
    /// the process is killed and `HealthCheckTimeout` returned.
    pub fn start(launch: LaunchSpec) -> Result<Self, FuzzError> {
        let probe = ureq::AgentBuilder::new()
            .timeout(HEALTH_PROBE_TIMEOUT)
            .redirects(0)
            .build();
        let mut process = Self {
            launch,
            running: None,
            state: TargetState::Starting,
            probe,
            restarts: 0,
        };
        process.bring_up(LaunchStage::Start)?;
        Ok(process)
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.child.id())
    }

    fn bring_up(&mut self, stage: LaunchStage) -> Result<(), FuzzError> {
        let argv = &self.launch.argv;
        let program = argv.first().cloned().unwrap_or_default();
        let mut child = Command::new(&program)
            .args(argv.iter().skip(1))
            .current_dir(&self.launch.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FuzzError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            reap(&mut child);
            return Err(FuzzError::Io(std::io::Error::other(
                "child output pipes were not captured",
            )));
        };
        if let Err(e) = set_nonblocking(&stdout).and_then(|_| set_nonblocking(&stderr)) {
            reap(&mut child);
            return Err(FuzzError::Io(e));
        }

        log::info!(
            "Spawned target {:?} (pid {}), waiting for {}",
            argv,
            child.id(),
            self.launch.health_check_url
        );
        self.running = Some(RunningChild {
            child,
            stdout,
            stderr,
        });

        if let Err(e) = self.wait_until_ready(stage) {
            self.kill();
            return Err(e);
        }

        // Startup chatter is not attributed to any test case.
        let banner_out = self.drain_stdout()?;
        let banner_err = self.drain_stderr()?;
        if !banner_out.is_empty() || !banner_err.is_empty() {
            log::debug!(
                "Discarded target startup output: stdout={banner_out:?} stderr={banner_err:?}"
            );
        }
        self.state = TargetState::Ready;
        Ok(())
    }

    /// Kills and reaps the current child, dropping its pipes.
    fn stop_child(&mut self) {
        if let Some(mut running) = self.running.take() {
            log::debug!("Killing target pid {}", running.child.id());
            reap(&mut running.child);
        }
    }

    fn wait_until_ready(&mut self, stage: LaunchStage) -> Result<(), FuzzError> {
        let url = self.launch.health_check_url.clone();
        for attempt in 1..=self.launch.timeout_iterations {
            if let Some(status) = self.exit_status()? {
                return Err(FuzzError::TargetExited { stage, status });
            }
            match self.probe.get(&url).call() {
                Ok(_) | Err(ureq::Error::Status(..)) => {
                    log::info!("Target ready at {url} after {attempt} probe(s)");
                    return Ok(());
                }
                Err(ureq::Error::Transport(t)) => {
                    log::debug!("Health probe {attempt} failed: {t}");
                    std::thread::sleep(self.launch.poll_interval);
                }
            }
        }
        Err(FuzzError::HealthCheckTimeout {
            url,
            attempts: self.launch.timeout_iterations,
            stage,
        })
    }
}

impl Target for TargetProcess {
    fn drain_stdout(&mut self) -> Result<String, FuzzError> {
        match self.running.as_mut() {
            Some(running) => Ok(drain(&mut running.stdout)?),
            None => Ok(String::new()),
        }
    }

    fn drain_stderr(&mut self) -> Result<String, FuzzError> {
        match self.running.as_mut() {
            Some(running) => Ok(drain(&mut running.stderr)?),
            None => Ok(String::new()),
        }
    }

    fn exit_status(&mut self) -> Result<Option<String>, FuzzError> {
        match self.running.as_mut() {
            Some(running) => Ok(running.child.try_wait()?.map(describe_exit)),
            None => Ok(None),
        }
    }

    fn restart(&mut self) -> Result<(), FuzzError> {
        self.state = TargetState::Crashed;
        self.stop_child();
        self.state = TargetState::Restarting;
        self.restarts += 1;
        log::warn!("Restarting target (restart #{})", self.restarts);
        self.bring_up(LaunchStage::Restart)
    }

    fn kill(&mut self) {
        self.stop_child();
        self.state = TargetState::Killed;
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("Failed to kill target: {e}");
    }
    if let Err(e) = child.wait() {
        log::warn!("Failed to reap target: {e}");
    }
}

/// Reads whatever is buffered on a non-blocking pipe.
fn drain(pipe: &mut impl Read) -> std::io::Result<String> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; PIPE_READ_CHUNK];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "exited abnormally".to_string()
}

#[cfg(unix)]
fn set_nonblocking(pipe: &impl std::os::fd::AsRawFd) -> std::io::Result<()> {
    let fd = pipe.as_raw_fd();
    // SAFETY: `fd` belongs to a pipe handle that outlives both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_nonblocking<T>(_pipe: &T) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "non-blocking target pipes are only supported on Unix",
    ))
}
