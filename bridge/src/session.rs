use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::BridgeConfig;
use crate::decoder::{DecodeError, Decoder};
use crate::encoder::{Encoded, encode};
use crate::protocol;
use crate::transport::{ExecOptions, Transport, TransportError};
use crate::value::HostValue;

/// A name that was not transferred, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PushReport {
    pub pushed: Vec<String>,
    pub skipped: Vec<Skipped>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PullReport {
    pub values: BTreeMap<String, HostValue>,
    pub skipped: Vec<Skipped>,
}

/// Moves variables between a host environment and one engine.
///
/// Per-name failures never abort a batch: they are logged with
/// `tracing::warn!` and listed in the report.
pub struct Session<T: Transport> {
    transport: T,
    config: BridgeConfig,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: BridgeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send the helper header and the configured init statements.
    pub async fn initialize(&mut self) -> Result<(), TransportError> {
        let options = ExecOptions {
            is_declaration: false,
            silent: true,
            on_error: "Failed to initialize C++ session".to_string(),
        };
        for statement in self.config.startup_statements() {
            self.transport.execute(statement, &options).await?;
        }
        tracing::info!(
            statements = self.config.init_statements.len() + 1,
            "session initialized"
        );
        Ok(())
    }

    /// Change the engine's working directory.
    pub async fn change_dir(&mut self, dir: &str) -> Result<(), TransportError> {
        let statement = protocol::change_dir(&self.config.cd_command, dir);
        let options = ExecOptions {
            is_declaration: false,
            silent: true,
            on_error: format!("Failed to change directory to {dir}"),
        };
        self.transport.execute(&statement, &options).await
    }

    /// Bind each named host value in the engine.
    pub async fn push<S: AsRef<str>>(
        &mut self,
        names: &[S],
        env: &BTreeMap<String, HostValue>,
    ) -> PushReport {
        let mut report = PushReport::default();
        for name in names {
            let name = name.as_ref();
            match self.push_one(name, env).await {
                Ok(()) => {
                    tracing::info!(name, "pushed");
                    report.pushed.push(name.to_string());
                }
                Err(reason) => {
                    tracing::warn!(name, %reason, "not pushed");
                    report.skipped.push(Skipped {
                        name: name.to_string(),
                        reason,
                    });
                }
            }
        }
        report
    }

    async fn push_one(
        &mut self,
        name: &str,
        env: &BTreeMap<String, HostValue>,
    ) -> Result<(), String> {
        let value = env
            .get(name)
            .ok_or_else(|| "not defined in host environment".to_string())?;
        let statement = match encode(name, value).map_err(|e| e.to_string())? {
            Encoded::Statement(statement) => statement,
            Encoded::Skip(reason) => return Err(reason.to_string()),
        };
        tracing::debug!(name, source = %statement.source, "declaring");
        let options = ExecOptions {
            is_declaration: true,
            silent: true,
            on_error: format!("Failed to put variable {name} to C++"),
        };
        self.transport
            .execute(&statement.source, &options)
            .await
            .map_err(|e| e.to_string())
    }

    /// Read each named engine variable back into host values.
    pub async fn pull<S: AsRef<str>>(&mut self, names: &[S]) -> PullReport {
        let mut report = PullReport::default();
        let mut decoder = Decoder::new(&mut self.transport, &self.config.retry);
        for name in names {
            let name = name.as_ref();
            match decoder.decode(name).await {
                Ok(value) => {
                    tracing::info!(name, shape = value.shape_name(), "pulled");
                    report.values.insert(name.to_string(), value);
                }
                Err(e) => {
                    if let DecodeError::UnsupportedType(tag) = &e {
                        tracing::warn!(name, tag = %tag, "type is not supported");
                    } else {
                        tracing::warn!(name, error = %e, "not pulled");
                    }
                    report.skipped.push(Skipped {
                        name: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
