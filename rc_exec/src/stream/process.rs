//! Stream process capability.
//!
//! The supervisor only needs to start a process for a target, ask it to stop, and wait for it to
//! exit. [`Launcher`] and [`ChildHandle`] capture exactly that, so the supervisor can be driven by
//! something other than real processes.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::{
    fmt,
    io::{BufRead, BufReader},
    net::SocketAddr,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant}
};

use log::{debug, warn};

use super::{StreamError, StreamParams};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Interval between exit checks while waiting for a process to stop.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Starts stream processes.
pub trait Launcher: Send + Sync {
    type Child: ChildHandle;

    /// Start a process streaming to `target`.
    fn start(&self, target: SocketAddr) -> Result<Self::Child, StreamError>;
}

/// A running (or exited but not yet forgotten) stream process.
pub trait ChildHandle: Send {
    /// OS identifier of the process.
    fn id(&self) -> u32;

    /// Ask the process to stop. Does not wait for it.
    fn terminate(&mut self) -> Result<(), StreamError>;

    /// Check whether the process has exited, reaping it if so.
    fn try_wait(&mut self) -> Result<Option<ChildExit>, StreamError>;

    /// Block until the process has exited and been reaped.
    fn wait(&mut self) -> Result<ChildExit, StreamError>;
}

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Launches the configured streaming program with `std::process::Command`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    source: String,
    video_port: Option<u16>,
    stop_grace: Duration,
}

/// A stream process started by [`CommandLauncher`].
#[derive(Debug)]
pub struct ProcessChild {
    child: Child,
    stop_grace: Duration,
    exit: Option<ChildExit>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exited with a status code
    Code(i32),

    /// Terminated by a signal
    Signalled,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl CommandLauncher {
    pub fn new(params: &StreamParams) -> Self {
        Self {
            program: params.program.clone(),
            args: params.args.clone(),
            source: params.source.clone(),
            video_port: params.video_port,
            stop_grace: Duration::from_millis(params.stop_grace_ms),
        }
    }

    /// Arguments for a stream to `target`, with all placeholders substituted.
    pub fn build_args(&self, target: SocketAddr) -> Vec<String> {
        // IPv6 hosts are bracketed so a following `:{port}` stays unambiguous
        let host = match target {
            SocketAddr::V4(a) => a.ip().to_string(),
            SocketAddr::V6(a) => format!("[{}]", a.ip()),
        };
        let port = self.video_port.unwrap_or_else(|| target.port()).to_string();

        self.args
            .iter()
            .map(|a| {
                a.replace("{host}", &host)
                    .replace("{port}", &port)
                    .replace("{source}", &self.source)
            })
            .collect()
    }
}

impl Launcher for CommandLauncher {
    type Child = ProcessChild;

    fn start(&self, target: SocketAddr) -> Result<Self::Child, StreamError> {
        let args = self.build_args(target);

        debug!("Stream command: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StreamError::SpawnError {
                program: self.program.clone(),
                source
            })?;

        // Forward the program's diagnostics into our log. The thread ends when the pipe closes,
        // i.e. when the process exits.
        if let Some(stderr) = child.stderr.take() {
            let id = child.id();
            let spawned = thread::Builder::new()
                .name(format!("stream-{}-stderr", id))
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(l) => debug!("[stream {}] {}", id, l),
                            Err(_) => break
                        }
                    }
                });

            if let Err(e) = spawned {
                warn!("Could not start stderr reader for stream process {}: {}", id, e);
            }
        }

        Ok(ProcessChild {
            child,
            stop_grace: self.stop_grace,
            exit: None,
        })
    }
}

impl ProcessChild {
    fn record(&mut self, status: ExitStatus) -> ChildExit {
        let exit = ChildExit::from(status);
        self.exit = Some(exit);
        exit
    }
}

impl ChildHandle for ProcessChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn terminate(&mut self) -> Result<(), StreamError> {
        // Once reaped the pid may belong to another process
        if self.exit.is_some() {
            return Ok(())
        }

        #[cfg(unix)]
        {
            let pid = self.child.id() as libc::pid_t;

            // SAFETY: kill has no memory safety requirements, and the pid is still owned by our
            // unreaped child so it cannot have been reused.
            let ret = unsafe { libc::kill(pid, libc::SIGTERM) };

            if ret != 0 {
                return Err(StreamError::SignalError(
                    self.child.id(),
                    std::io::Error::last_os_error()
                ))
            }

            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.child.kill().map_err(|e| StreamError::SignalError(self.child.id(), e))
        }
    }

    fn try_wait(&mut self) -> Result<Option<ChildExit>, StreamError> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit))
        }

        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(self.record(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(StreamError::WaitError(self.child.id(), e))
        }
    }

    fn wait(&mut self) -> Result<ChildExit, StreamError> {
        let deadline = Instant::now() + self.stop_grace;

        loop {
            if let Some(exit) = self.try_wait()? {
                return Ok(exit)
            }

            if Instant::now() >= deadline {
                break
            }

            thread::sleep(WAIT_POLL_INTERVAL);
        }

        warn!(
            "Stream process {} did not exit within {:?}, killing it",
            self.child.id(),
            self.stop_grace
        );

        // An error here means the process exited in the meantime, the wait below reaps it either
        // way.
        if let Err(e) = self.child.kill() {
            debug!("Kill of stream process {} failed: {}", self.child.id(), e);
        }

        match self.child.wait() {
            Ok(status) => Ok(self.record(status)),
            Err(e) => Err(StreamError::WaitError(self.child.id(), e))
        }
    }
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(c) => ChildExit::Code(c),
            None => ChildExit::Signalled
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Code(c) => write!(f, "exit code {}", c),
            ChildExit::Signalled => write!(f, "terminated by signal"),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_args() {
        let launcher = CommandLauncher::new(&StreamParams::default());
        let target: SocketAddr = "192.168.1.25:40000".parse().unwrap();

        assert_eq!(
            launcher.build_args(target),
            vec!["-t", "0", "--inline", "-o", "udp://192.168.1.25:40000"]
        );

        let launcher = CommandLauncher::new(&StreamParams {
            args: vec!["--camera".into(), "{source}".into(), "udp://{host}:{port}".into()],
            source: "1".into(),
            video_port: Some(1234),
            ..Default::default()
        });

        assert_eq!(
            launcher.build_args(target),
            vec!["--camera", "1", "udp://192.168.1.25:1234"]
        );
    }

    #[test]
    fn test_build_args_ipv6() {
        let launcher = CommandLauncher::new(&StreamParams::default());

        assert_eq!(
            launcher.build_args("[::1]:5000".parse().unwrap()).last().unwrap(),
            "udp://[::1]:5000"
        );
        assert_eq!(
            launcher.build_args("[fe80::2]:40000".parse().unwrap()).last().unwrap(),
            "udp://[fe80::2]:40000"
        );
    }

    #[test]
    fn test_spawn_failure() {
        let launcher = CommandLauncher::new(&StreamParams {
            program: "/nonexistent/stream/program".into(),
            ..Default::default()
        });

        assert!(matches!(
            launcher.start("127.0.0.1:5000".parse().unwrap()),
            Err(StreamError::SpawnError { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_and_wait() {
        let launcher = CommandLauncher::new(&StreamParams {
            program: "sleep".into(),
            args: vec!["30".into()],
            ..Default::default()
        });

        let mut child = launcher.start("127.0.0.1:5000".parse().unwrap()).unwrap();
        assert_eq!(child.try_wait().unwrap(), None);

        child.terminate().unwrap();
        assert_eq!(child.wait().unwrap(), ChildExit::Signalled);

        // Reaped, so further calls are answered from the recorded exit
        assert!(child.terminate().is_ok());
        assert_eq!(child.try_wait().unwrap(), Some(ChildExit::Signalled));
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_kills_after_grace() {
        // The shell ignores SIGTERM and the ignore survives the exec
        let launcher = CommandLauncher::new(&StreamParams {
            program: "sh".into(),
            args: vec!["-c".into(), "trap '' TERM; exec sleep 30".into()],
            stop_grace_ms: 200,
            ..Default::default()
        });

        let mut child = launcher.start("127.0.0.1:5000".parse().unwrap()).unwrap();

        // Give the shell time to install the trap
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        child.terminate().unwrap();
        assert_eq!(child.wait().unwrap(), ChildExit::Signalled);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));

        // Bounded by the grace period, not by the child
        assert!(elapsed < Duration::from_secs(5));
    }
}
