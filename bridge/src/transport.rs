use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kinds of output the engine can answer a request with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Raw text written to stdout.
    Stream,
    /// Value of the cell's trailing expression.
    ExecuteResult,
}

/// Key holding the plain-text rendering inside an execute result.
pub const PLAIN_TEXT: &str = "text/plain";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Stream {
        text: String,
    },
    ExecuteResult {
        data: serde_json::Map<String, serde_json::Value>,
    },
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Stream { .. } => ResponseKind::Stream,
            Response::ExecuteResult { .. } => ResponseKind::ExecuteResult,
        }
    }

    pub fn stream(text: impl Into<String>) -> Self {
        Response::Stream { text: text.into() }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(PLAIN_TEXT.into(), serde_json::Value::String(text.into()));
        Response::ExecuteResult { data }
    }
}

/// How a declaration is run in the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecOptions {
    pub is_declaration: bool,
    pub silent: bool,
    /// Message the engine side reports if the statement fails.
    pub on_error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine process exited unexpectedly")]
    EngineExited,
    #[error("spawn error: {0}")]
    Spawn(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("no response after {attempts} attempts")]
    Stalled { attempts: u32 },
    #[error("execute result has no text/plain rendering")]
    MissingPlainText,
}

/// Request/response channel to a live engine.
///
/// Calls are awaited one at a time; an implementation may sit on top of an
/// asynchronous channel but must hand back only the responses that belong to
/// the statement it was given. An empty `Vec` means "nothing yet".
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Run a statement for its side effect (binding a variable).
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecOptions,
    ) -> Result<(), TransportError>;

    /// Run a statement and collect whatever output it produced so far.
    async fn request(
        &mut self,
        statement: &str,
        kinds: &[ResponseKind],
    ) -> Result<Vec<Response>, TransportError>;
}

/// Retry behaviour for requests that come back empty.
///
/// The default retries forever with no delay: a stalled engine blocks the
/// caller indefinitely. Set `max_attempts` to turn a stall into
/// [`TransportError::Stalled`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Send `statement` until the engine answers with output of `kind`, and
/// return that output as plain text.
pub async fn request_text<T: Transport + ?Sized>(
    transport: &mut T,
    statement: &str,
    kind: ResponseKind,
    retry: &RetryPolicy,
) -> Result<String, TransportError> {
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        let responses = transport.request(statement, &[kind]).await?;
        let matching: Vec<&Response> = responses.iter().filter(|r| r.kind() == kind).collect();
        if !matching.is_empty() {
            return plain_text(&matching);
        }

        tracing::debug!(attempts, statement, "empty response, retrying");
        if let Some(max) = retry.max_attempts
            && attempts >= max
        {
            return Err(TransportError::Stalled { attempts });
        }
        if retry.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(retry.delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// Stream chunks are concatenated; an execute result contributes its
/// plain-text rendering (the first one wins).
fn plain_text(responses: &[&Response]) -> Result<String, TransportError> {
    let mut text = String::new();
    for response in responses {
        match response {
            Response::Stream { text: chunk } => text.push_str(chunk),
            Response::ExecuteResult { data } => {
                return data
                    .get(PLAIN_TEXT)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or(TransportError::MissingPlainText);
            }
        }
    }
    Ok(text)
}
