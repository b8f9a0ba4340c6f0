// Test doubles for processes and the notification transport

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{CollectorError, Result};
use crate::notify::MessageTransport;
use crate::process::{CommandSpec, Launcher, ProcessHandle, ProcessOutput};

type Script = Box<dyn Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync>;

/// Launcher that answers each program name with a scripted closure.
pub struct FakeLauncher {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<CommandSpec>>,
    stops: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn on<F>(mut self, program: &str, script: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<ProcessOutput> + Send + Sync + 'static,
    {
        self.scripts.insert(program.to_string(), Box::new(script));
        self
    }

    pub fn exited(code: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program_name() == program).count()
    }

    pub fn stop_requests(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn invoke(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        match self.scripts.get(&spec.program_name()) {
            Some(script) => script(spec),
            None => Err(CollectorError::ToolNotFound(spec.program.display().to_string())),
        }
    }
}

impl Launcher for FakeLauncher {
    fn start(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        let output = self.invoke(spec)?;
        Ok(Box::new(FakeHandle { output, stops: Arc::clone(&self.stops) }))
    }

    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.invoke(spec)
    }
}

struct FakeHandle {
    output: ProcessOutput,
    stops: Arc<AtomicUsize>,
}

impl ProcessHandle for FakeHandle {
    fn request_graceful_stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_with_output(self: Box<Self>) -> Result<ProcessOutput> {
        Ok(self.output)
    }
}

/// Transport that records what would have been posted.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessageTransport for RecordingTransport {
    fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
        if self.fail {
            return Err(CollectorError::Notification("channel_not_found".to_string()));
        }
        Ok(())
    }
}

impl MessageTransport for Arc<RecordingTransport> {
    fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.as_ref().post_message(channel, text)
    }
}
