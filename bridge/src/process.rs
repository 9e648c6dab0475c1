use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::config::KernelSpec;
use crate::transport::{ExecOptions, Response, ResponseKind, Transport, TransportError};

/// Jupyter kernel name the adapter should start, e.g. `xeus-cling-cpp17`.
pub const KERNEL_ENV: &str = "CLING_BRIDGE_KERNEL";
/// Language name of that kernel, e.g. `C++17`.
pub const LANGUAGE_ENV: &str = "CLING_BRIDGE_LANGUAGE";

/// How to start an engine adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    /// Whitespace-separated command line such as `python3 adapter.py --verbose`.
    pub fn parse(command: &str) -> Result<Self, TransportError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| TransportError::Spawn("empty engine command".to_string()))?;
        Ok(Self::new(program, parts.map(str::to_string).collect()))
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Tell the adapter which kernel to start through [`KERNEL_ENV`] and [`LANGUAGE_ENV`].
    pub fn kernel(mut self, spec: &KernelSpec) -> Self {
        self.env.push((KERNEL_ENV.to_string(), spec.kernel.clone()));
        self.env.push((LANGUAGE_ENV.to_string(), spec.language.clone()));
        self
    }
}

// --- Host → engine (stdin) ---

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostMessage<'a> {
    Execute {
        id: String,
        code: &'a str,
        is_declaration: bool,
        silent: bool,
        on_error: &'a str,
    },
    Request {
        id: String,
        code: &'a str,
        kinds: &'a [ResponseKind],
    },
}

// --- Engine → host (stdout) ---

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineMessage {
    Response { id: String, messages: Vec<Response> },
    Ack { id: String },
    Error { id: String, message: String },
}

impl EngineMessage {
    fn id(&self) -> &str {
        match self {
            EngineMessage::Response { id, .. }
            | EngineMessage::Ack { id }
            | EngineMessage::Error { id, .. } => id,
        }
    }
}

/// Engine adapter running as a child process, one JSON message per line.
pub struct ProcessTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessTransport {
    /// Start the adapter. Stderr is inherited.
    pub fn spawn(command: &EngineCommand) -> Result<Self, TransportError> {
        let program = &command.program;
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &command.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Spawn(format!("{program}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("missing stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("missing stdout".to_string()))?;

        tracing::debug!(program, args = ?command.args, "engine spawned");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn check_alive(&mut self) -> Result<(), TransportError> {
        match self.child.try_wait() {
            Ok(Some(_status)) => Err(TransportError::EngineExited),
            Ok(None) => Ok(()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    async fn send(&mut self, msg: &HostMessage<'_>) -> Result<(), TransportError> {
        self.check_alive()?;
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<EngineMessage, TransportError> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line).await?;
        if n == 0 {
            return Err(TransportError::EngineExited);
        }
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Next message answering `id`. Anything addressed to an earlier
    /// statement is dropped.
    async fn recv_for(&mut self, id: &str) -> Result<EngineMessage, TransportError> {
        loop {
            let msg = self.recv().await?;
            if msg.id() == id {
                return Ok(msg);
            }
            tracing::debug!(expected = id, got = msg.id(), "discarding stale engine message");
        }
    }
}

#[async_trait::async_trait]
impl Transport for ProcessTransport {
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecOptions,
    ) -> Result<(), TransportError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.send(&HostMessage::Execute {
            id: id.clone(),
            code: statement,
            is_declaration: options.is_declaration,
            silent: options.silent,
            on_error: &options.on_error,
        })
        .await?;

        match self.recv_for(&id).await? {
            EngineMessage::Ack { .. } => Ok(()),
            EngineMessage::Error { message, .. } => Err(TransportError::Engine(message)),
            EngineMessage::Response { .. } => Err(TransportError::Protocol(
                "expected ack for execute, got response".to_string(),
            )),
        }
    }

    async fn request(
        &mut self,
        statement: &str,
        kinds: &[ResponseKind],
    ) -> Result<Vec<Response>, TransportError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.send(&HostMessage::Request {
            id: id.clone(),
            code: statement,
            kinds,
        })
        .await?;

        match self.recv_for(&id).await? {
            EngineMessage::Response { messages, .. } => Ok(messages),
            // Acknowledged without output: nothing yet.
            EngineMessage::Ack { .. } => Ok(Vec::new()),
            EngineMessage::Error { message, .. } => Err(TransportError::Engine(message)),
        }
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}
