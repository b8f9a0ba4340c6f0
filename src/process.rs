// Subprocess handles
//
// Every external tool is reached through a Launcher so the capture and
// archival logic can be driven by scripted fakes in tests. The real launcher
// drains stdout/stderr on helper threads while the child runs so a chatty
// process never stalls on a full pipe.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use crate::error::{CollectorError, Result};

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program file stem, e.g. `ffmpeg` for `/usr/bin/ffmpeg`.
    pub fn program_name(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Exit status plus everything the process wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// A running process.
pub trait ProcessHandle: Send {
    /// Ask the process to wind down (SIGINT on Unix).
    fn request_graceful_stop(&mut self) -> Result<()>;

    /// Block until exit and collect the output.
    fn wait_with_output(self: Box<Self>) -> Result<ProcessOutput>;
}

/// Starts processes.
pub trait Launcher: Send + Sync {
    fn start(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>>;

    /// Run to completion.
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.start(spec)?.wait_with_output()
    }
}

/// Launches real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

fn spawn_error(spec: &CommandSpec, e: std::io::Error) -> CollectorError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CollectorError::ToolNotFound(spec.program.display().to_string())
    } else {
        CollectorError::Io(e)
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl Launcher for SystemLauncher {
    fn start(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        let mut child = spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(spec, e))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        Ok(Box::new(ChildHandle { child, stdout, stderr }))
    }

    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let output = spec
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(spec, e))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

struct ChildHandle {
    child: Child,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl ProcessHandle for ChildHandle {
    #[cfg(unix)]
    fn request_graceful_stop(&mut self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(self.child.id() as i32), Signal::SIGINT) {
            Ok(()) => Ok(()),
            // Already gone
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(CollectorError::Io(std::io::Error::from(e))),
        }
    }

    #[cfg(not(unix))]
    fn request_graceful_stop(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(CollectorError::Io(e)),
        }
    }

    fn wait_with_output(self: Box<Self>) -> Result<ProcessOutput> {
        let ChildHandle { mut child, stdout, stderr } = *self;
        let status = child.wait()?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        })
    }
}
